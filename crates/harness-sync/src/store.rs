//! Remote store seam and the subprocess-backed implementation.

use crate::error::{Result, UploadError};
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Opaque remote-storage credentials.
///
/// Captured once at startup and held internally by the store, so the
/// environment scrub performed before the test engine starts does not
/// affect sync operations.
#[derive(Clone)]
pub struct StorageCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// A remote object store that can mirror a local directory.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Mirror `local_dir` to `destination`. Must tolerate files being
    /// written while the sync runs; the final flush is the authority
    /// for completeness.
    async fn sync(&self, local_dir: &Path, destination: &str) -> Result<()>;
}

/// Remote store backed by an external sync command.
///
/// Invoked as `<command...> <local_dir> <destination>`, with the
/// captured credentials injected into that child's environment only.
#[derive(Debug)]
pub struct CommandStore {
    command: Vec<String>,
    credentials: Option<StorageCredentials>,
}

impl CommandStore {
    pub fn new(command: Vec<String>, credentials: Option<StorageCredentials>) -> Result<Self> {
        if command.is_empty() {
            return Err(UploadError::EmptyCommand);
        }
        Ok(Self {
            command,
            credentials,
        })
    }
}

#[async_trait]
impl RemoteStore for CommandStore {
    async fn sync(&self, local_dir: &Path, destination: &str) -> Result<()> {
        let exe = &self.command[0];
        let args = &self.command[1..];

        let mut cmd = Command::new(exe);
        cmd.args(args)
            .arg(local_dir)
            .arg(destination)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(creds) = &self.credentials {
            cmd.env("STORAGE_ACCESS_KEY", &creds.access_key)
                .env("STORAGE_SECRET_KEY", &creds.secret_key);
        }

        debug!(command = %exe, local = %local_dir.display(), destination, "running sync");

        let output = cmd.output().await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(UploadError::SyncFailed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_empty_command_rejected() {
        let err = CommandStore::new(vec![], None).unwrap_err();
        assert!(matches!(err, UploadError::EmptyCommand));
    }

    #[test]
    fn test_credentials_debug_redacted() {
        let creds = StorageCredentials {
            access_key: "AKIA123".to_string(),
            secret_key: "hunter2".to_string(),
        };
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("AKIA123"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_sync_success() {
        let store = CommandStore::new(vec!["true".to_string()], None).unwrap();
        store
            .sync(&PathBuf::from("/tmp"), "mock://bucket/run")
            .await
            .expect("sync should succeed");
    }

    #[tokio::test]
    async fn test_sync_failure_carries_exit_code() {
        let store = CommandStore::new(vec!["false".to_string()], None).unwrap();
        let err = store
            .sync(&PathBuf::from("/tmp"), "mock://bucket/run")
            .await
            .unwrap_err();
        match err {
            UploadError::SyncFailed { code, .. } => assert_ne!(code, 0),
            other => panic!("unexpected error: {other}"),
        }
    }
}
