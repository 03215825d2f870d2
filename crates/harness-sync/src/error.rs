//! Upload error taxonomy.

/// Errors produced by the upload monitor and remote store.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("sync command must not be empty")]
    EmptyCommand,

    #[error("upload session is already syncing")]
    AlreadySyncing,

    #[error("upload session already failed")]
    SessionFailed,

    #[error("failed to spawn sync process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("sync process exited with code {code}: {stderr}")]
    SyncFailed { code: i32, stderr: String },

    #[error("final sync failed after {attempts} attempts: {source}")]
    FinalizeExhausted {
        attempts: u32,
        #[source]
        source: Box<UploadError>,
    },
}

/// Result type for upload operations.
pub type Result<T> = std::result::Result<T, UploadError>;
