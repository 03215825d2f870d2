//! Background upload loop and finalize protocol.

use crate::error::{Result, UploadError};
use crate::store::RemoteStore;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Lifecycle of one upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, background loop not yet running.
    Idle,

    /// Background loop mirroring the output directory.
    Syncing,

    /// Terminal flush succeeded; the mirror is complete.
    Finalized,

    /// Unrecoverable sync error during finalize.
    Failed,
}

/// A running upload session, owned exclusively by the monitor.
///
/// The controller only observes the terminal state.
#[derive(Debug)]
pub struct UploadSession {
    state: SessionState,
    source_dir: PathBuf,
    destination: String,
    task: Option<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl UploadSession {
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }
}

/// Supervises a background sync of an output directory to remote
/// storage and guarantees a terminal flush once the run ends.
pub struct UploadMonitor {
    store: Arc<dyn RemoteStore>,
    interval: Duration,
    finalize_attempts: u32,
    backoff_start: Duration,
    started: AtomicBool,
}

impl UploadMonitor {
    /// Default number of finalize attempts before giving up.
    pub const DEFAULT_FINALIZE_ATTEMPTS: u32 = 3;

    pub fn new(store: Arc<dyn RemoteStore>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            finalize_attempts: Self::DEFAULT_FINALIZE_ATTEMPTS,
            backoff_start: Duration::from_secs(1),
            started: AtomicBool::new(false),
        }
    }

    /// Override retry tuning; used by tests to keep backoff short.
    pub fn with_retry(mut self, attempts: u32, backoff_start: Duration) -> Self {
        self.finalize_attempts = attempts.max(1);
        self.backoff_start = backoff_start;
        self
    }

    /// Begin the background mirror loop.
    ///
    /// One session per monitor per run; a second concurrent start is a
    /// usage error.
    pub fn start(&self, source_dir: &Path, destination: &str) -> Result<UploadSession> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(UploadError::AlreadySyncing);
        }

        let (tx, mut rx) = watch::channel(false);
        let store = self.store.clone();
        let interval = self.interval;
        let dir = source_dir.to_path_buf();
        let dest = destination.to_string();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; an early mirror is fine.
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // Transient mid-run failures are tolerated; the
                        // finalize flush is the completeness authority.
                        if let Err(e) = store.sync(&dir, &dest).await {
                            warn!(error = %e, "background sync failed, will retry on next tick");
                        }
                    }
                    _ = rx.changed() => break,
                }
            }
        });

        info!(source = %source_dir.display(), destination, "upload session started");

        Ok(UploadSession {
            state: SessionState::Syncing,
            source_dir: source_dir.to_path_buf(),
            destination: destination.to_string(),
            task: Some(task),
            shutdown: tx,
        })
    }

    /// Stop the background loop and perform the terminal flush.
    ///
    /// Unconditional cleanup: runs whether the test engine exited
    /// cleanly, non-zero, or was interrupted. The last sync is retried
    /// a bounded number of times with backoff before the session is
    /// marked `Failed`. Idempotent once a terminal state is reached.
    pub async fn finalize(&self, session: &mut UploadSession) -> Result<()> {
        match session.state {
            SessionState::Finalized => return Ok(()),
            SessionState::Failed => return Err(UploadError::SessionFailed),
            SessionState::Idle | SessionState::Syncing => {}
        }

        session.shutdown.send(true).ok();
        if let Some(task) = session.task.take() {
            task.await.ok();
        }

        let mut backoff = self.backoff_start;
        let mut last_err = None;
        for attempt in 1..=self.finalize_attempts {
            match self
                .store
                .sync(&session.source_dir, &session.destination)
                .await
            {
                Ok(()) => {
                    session.state = SessionState::Finalized;
                    info!(destination = %session.destination, "upload session finalized");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "finalize sync attempt failed");
                    last_err = Some(e);
                    if attempt < self.finalize_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        session.state = SessionState::Failed;
        Err(UploadError::FinalizeExhausted {
            attempts: self.finalize_attempts,
            source: Box::new(last_err.unwrap_or(UploadError::EmptyCommand)),
        })
    }
}
