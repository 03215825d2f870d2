//! Harness Core - containerized test-run orchestration
//!
//! Provides the control sequence for one integration-test run:
//! - Gates execution on external-service readiness
//! - Resolves distributed tag-exclusion rules into one exclusion set
//! - Runs the external test engine while mirroring its output
//! - Analyzes the result artifact into a short status summary
//! - Reports progress and outcome to a cluster-managed status resource

pub mod analysis;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod readiness;
pub mod status;
pub mod tags;
pub mod telemetry;

// Re-export key types
pub use analysis::{ResultSummary, RESULT_ARTIFACT, SUMMARY_FILE};
pub use config::{
    AnalysisConfig, BrokenProviderPolicy, ReadinessConfig, RunConfiguration, RunMode,
    StatusConfig, StatusCoordinates, TagsConfig, UploadConfig,
};
pub use controller::{Controller, Phase, READINESS_ABORT_CODE};
pub use engine::{EngineOutcome, ProcessEngine, TestEngine};
pub use error::{ConfigError, EngineError, GateError, ResolveError, StatusError};
pub use status::{HttpStatusSink, StatusKind, StatusRecord, StatusReporter, StatusSink};
pub use tags::{FileProvider, ProviderOutput, TagExclusions};
