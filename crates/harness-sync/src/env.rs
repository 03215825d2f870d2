//! Credential scrubbing for the process environment.
//!
//! The test engine runs as a child of the harness and must never
//! observe remote-storage credentials. The upload monitor captures its
//! own copy of the credentials before this runs, so scrubbing only
//! affects subsequently spawned processes.

use tracing::debug;

/// Environment variables removed before the test engine is spawned.
///
/// Covers the harness's own credential variables plus the common AWS
/// spellings that storage tooling picks up implicitly.
pub const SENSITIVE_VARS: &[&str] = &[
    "STORAGE_ACCESS_KEY",
    "STORAGE_SECRET_KEY",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
];

/// Remove credential-bearing variables from the process environment.
///
/// Must be called exactly once per run, before the test engine process
/// is spawned; the environment is never mutated again afterward.
pub fn clear_sensitive_vars() {
    for name in SENSITIVE_VARS {
        if std::env::var_os(name).is_some() {
            debug!(var = name, "removing sensitive variable from environment");
            std::env::remove_var(name);
        }
    }
}
