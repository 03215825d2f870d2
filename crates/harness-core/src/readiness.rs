//! Readiness gate: bounded-time precondition check before tests run.
//!
//! The only fatal state in the pipeline. A check that fails or does
//! not come back ready within the timeout aborts the run before any
//! test executes.

use crate::config::ReadinessConfig;
use crate::error::GateError;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::info;

/// Run the configured readiness check under its timeout.
///
/// Exit code 0 means ready; anything else, or exceeding the timeout,
/// is a gate failure.
pub async fn check(config: &ReadinessConfig) -> Result<(), GateError> {
    let (exe, args) = config
        .command
        .split_first()
        .ok_or(GateError::EmptyCommand)?;

    info!(command = %exe, timeout_secs = config.timeout.as_secs(), "waiting for environment readiness");

    let mut child = Command::new(exe)
        .args(args)
        .arg(config.timeout.as_secs().to_string())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()?;

    let status = match timeout(config.timeout, child.wait()).await {
        Ok(status) => status?,
        Err(_) => {
            child.start_kill().ok();
            return Err(GateError::TimedOut {
                timeout_secs: config.timeout.as_secs(),
            });
        }
    };

    if status.success() {
        info!("environment is ready");
        Ok(())
    } else {
        Err(GateError::NotReady {
            code: status.code().unwrap_or(-1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn gate(command: &[&str], timeout_secs: u64) -> ReadinessConfig {
        ReadinessConfig {
            command: command.iter().map(|s| s.to_string()).collect(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    #[tokio::test]
    async fn test_ready_check_passes() {
        check(&gate(&["true"], 60)).await.expect("gate should pass");
    }

    #[tokio::test]
    async fn test_not_ready_check_fails() {
        let err = check(&gate(&["false"], 60)).await.unwrap_err();
        assert!(matches!(err, GateError::NotReady { .. }));
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let err = check(&gate(&[], 60)).await.unwrap_err();
        assert!(matches!(err, GateError::EmptyCommand));
    }

    #[tokio::test]
    async fn test_check_times_out() {
        let err = check(&gate(&["sleep", "30"], 1)).await.unwrap_err();
        assert!(matches!(err, GateError::TimedOut { timeout_secs: 1 }));
    }
}
