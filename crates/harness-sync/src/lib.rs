//! Harness Sync - continuous result mirroring
//!
//! Keeps a remote mirror of the test-output directory up to date while
//! the test engine runs:
//! - Spawns a supervised background sync loop over a [`RemoteStore`]
//! - Strips storage credentials from the environment before the test
//!   engine is spawned
//! - Performs an unconditional finalize flush with bounded retries

pub mod env;
pub mod error;
pub mod monitor;
pub mod store;

// Re-export key types
pub use env::{clear_sensitive_vars, SENSITIVE_VARS};
pub use error::UploadError;
pub use monitor::{SessionState, UploadMonitor, UploadSession};
pub use store::{CommandStore, RemoteStore, StorageCredentials};
