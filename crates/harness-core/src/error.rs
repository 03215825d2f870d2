//! Error taxonomy for the harness core.
//!
//! Only the readiness gate is fatal to the run; every other failure is
//! logged and the pipeline proceeds on a safe default. Errors from
//! side-effecting collaborators (upload, status) never change the
//! process exit code, which is reserved for the test engine's verdict.

use std::path::PathBuf;

/// Errors produced while assembling the run configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid run mode: {value} (expected 'full' or 'tests-only')")]
    InvalidRunMode { value: String },

    #[error("invalid broken-provider policy: {value} (expected 'fail' or 'skip')")]
    InvalidProviderPolicy { value: String },

    #[error("invalid status resource path: {path} (expected group/version/namespace/plural/name)")]
    InvalidResourcePath { path: String },

    #[error("status addressing requires either a composite path or all five coordinates")]
    IncompleteStatusAddress,

    #[error("test engine command must not be empty")]
    MissingEngineCommand,

    #[error("upload sync command must not be empty when uploads are enabled")]
    MissingSyncCommand,

    #[error("upload destination must not be empty when uploads are enabled")]
    MissingUploadDestination,
}

/// Errors produced by tag-exclusion resolution.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("failed to scan test root {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read exclusion provider {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("exclusion provider {path} produced invalid output: {source}")]
    InvalidOutput {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("exclusion provider {path} exited with code {code}: {stderr}")]
    ProviderFailed {
        path: PathBuf,
        code: i32,
        stderr: String,
    },
}

/// Errors produced by the readiness gate.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("readiness check command must not be empty")]
    EmptyCommand,

    #[error("readiness check exited with code {code}")]
    NotReady { code: i32 },

    #[error("readiness check timed out after {timeout_secs}s")]
    TimedOut { timeout_secs: u64 },

    #[error("failed to run readiness check: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Errors produced while invoking the test engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("test engine command must not be empty")]
    EmptyCommand,

    #[error("failed to spawn test engine: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Errors produced by status reporting.
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("status request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("status resource returned {code} for {url}")]
    UnexpectedResponse { code: u16, url: String },
}
