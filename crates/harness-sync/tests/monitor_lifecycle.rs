//! Integration tests for the upload monitor against a real sync command.

use harness_sync::{
    clear_sensitive_vars, CommandStore, RemoteStore, SessionState, StorageCredentials,
    UploadMonitor,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Write an executable helper script into `dir` and return its path.
fn write_script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

/// Test: the mirror is complete after finalize, even though files kept
/// appearing while the session was syncing.
#[tokio::test]
async fn test_mirror_complete_after_finalize() {
    let workdir = tempfile::tempdir().expect("tempdir");
    let source = workdir.path().join("output");
    let mirror = workdir.path().join("mirror");
    fs::create_dir_all(&source).unwrap();
    fs::create_dir_all(&mirror).unwrap();

    let script = write_script(
        workdir.path(),
        "sync.sh",
        "#!/bin/sh\ncp -r \"$1\"/. \"$2\"\n",
    );

    let store = Arc::new(
        CommandStore::new(
            vec![script.to_string_lossy().to_string()],
            None,
        )
        .unwrap(),
    );
    let monitor = UploadMonitor::new(store, Duration::from_millis(20))
        .with_retry(3, Duration::from_millis(5));

    fs::write(source.join("early.log"), "started").unwrap();
    let mut session = monitor
        .start(&source, mirror.to_str().unwrap())
        .expect("start session");

    // Files written mid-run must land in the mirror by the final flush.
    tokio::time::sleep(Duration::from_millis(50)).await;
    fs::write(source.join("late.xml"), "<result/>").unwrap();

    monitor.finalize(&mut session).await.expect("finalize");
    assert_eq!(session.state(), SessionState::Finalized);

    assert_eq!(fs::read_to_string(mirror.join("early.log")).unwrap(), "started");
    assert_eq!(fs::read_to_string(mirror.join("late.xml")).unwrap(), "<result/>");
}

/// Test: children spawned after the scrub see no credentials, while the
/// store keeps using the copy it captured at startup.
#[tokio::test]
async fn test_scrubbed_child_env_and_retained_credentials() {
    let workdir = tempfile::tempdir().expect("tempdir");

    // Succeeds only when the credentials arrive via the store's own
    // environment injection, not via inheritance.
    let script = write_script(
        workdir.path(),
        "check_creds.sh",
        "#!/bin/sh\ntest \"$STORAGE_ACCESS_KEY\" = \"ak\" && test \"$STORAGE_SECRET_KEY\" = \"sk\"\n",
    );

    std::env::set_var("STORAGE_ACCESS_KEY", "ak");
    std::env::set_var("STORAGE_SECRET_KEY", "sk");
    let store = CommandStore::new(
        vec![script.to_string_lossy().to_string()],
        Some(StorageCredentials {
            access_key: "ak".to_string(),
            secret_key: "sk".to_string(),
        }),
    )
    .unwrap();

    clear_sensitive_vars();

    // A plain child process observes no credential variables.
    let probe = write_script(
        workdir.path(),
        "probe.sh",
        "#!/bin/sh\ntest -z \"$STORAGE_ACCESS_KEY\" && test -z \"$STORAGE_SECRET_KEY\" && test -z \"$AWS_ACCESS_KEY_ID\"\n",
    );
    let status = tokio::process::Command::new(&probe)
        .status()
        .await
        .expect("spawn probe");
    assert!(status.success(), "child environment still carries credentials");

    // The store still syncs with its captured credentials.
    store
        .sync(workdir.path(), "mock://bucket/run")
        .await
        .expect("sync with retained credentials");
}
