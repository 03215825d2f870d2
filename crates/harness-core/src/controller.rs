//! Execution controller: the top-level run sequencer.
//!
//! One-directional state machine, no retry loop across states:
//! Init → ReadinessGate → TagResolution → UploadStart → Run →
//! UploadFinalize → Analyze → Report → Done. Only the readiness gate
//! is fatal; every later failure degrades and the pipeline proceeds.
//! The process exit code is reserved for the test engine's verdict.

use crate::analysis;
use crate::config::{RunConfiguration, RunMode};
use crate::engine::{EngineOutcome, TestEngine};
use crate::readiness;
use crate::status::{StatusKind, StatusReporter};
use crate::tags::{self, TagExclusions};
use harness_sync::{clear_sensitive_vars, RemoteStore, UploadMonitor};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Exit code for a readiness-gate abort, distinct from any engine
/// verdict the harness forwards.
pub const READINESS_ABORT_CODE: i32 = 69;

/// Pipeline states, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    ReadinessGate,
    TagResolution,
    UploadStart,
    Run,
    UploadFinalize,
    Analyze,
    Report,
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::ReadinessGate => "readiness_gate",
            Phase::TagResolution => "tag_resolution",
            Phase::UploadStart => "upload_start",
            Phase::Run => "run",
            Phase::UploadFinalize => "upload_finalize",
            Phase::Analyze => "analyze",
            Phase::Report => "report",
            Phase::Done => "done",
        }
    }
}

fn enter(phase: Phase) {
    debug!(phase = phase.as_str(), "entering phase");
}

/// Composes the readiness gate, tag resolver, upload monitor, test
/// engine and status reporter into one run.
pub struct Controller {
    config: RunConfiguration,
    engine: Arc<dyn TestEngine>,
    store: Option<Arc<dyn RemoteStore>>,
    reporter: Option<StatusReporter>,
}

impl Controller {
    pub fn new(
        config: RunConfiguration,
        engine: Arc<dyn TestEngine>,
        store: Option<Arc<dyn RemoteStore>>,
        reporter: Option<StatusReporter>,
    ) -> Self {
        Self {
            config,
            engine,
            store,
            reporter,
        }
    }

    /// Drive the run to completion and return the process exit code.
    pub async fn execute(&self) -> i32 {
        enter(Phase::Init);
        let run_id = Uuid::new_v4();
        info!(%run_id, mode = ?self.config.run_mode, "starting integration test run");

        if let Some(reporter) = &self.reporter {
            if let Err(e) = reporter.report_in_progress().await {
                warn!(error = %e, "failed to report in-progress status");
            }
        }

        enter(Phase::ReadinessGate);
        if let Some(readiness) = &self.config.readiness {
            if let Err(e) = readiness::check(readiness).await {
                error!(error = %e, "readiness gate failed, aborting before any test runs");
                return READINESS_ABORT_CODE;
            }
        }

        enter(Phase::TagResolution);
        let exclusions = match tags::resolve(&self.config).await {
            Ok(exclusions) => exclusions,
            Err(e) => {
                warn!(error = %e, "tag resolution failed, continuing with no exclusions");
                TagExclusions::empty()
            }
        };

        enter(Phase::UploadStart);
        let monitor = match (&self.store, &self.config.upload) {
            (Some(store), Some(upload)) => Some(
                UploadMonitor::new(store.clone(), upload.interval)
                    .with_retry(upload.finalize_attempts, upload.retry_backoff),
            ),
            _ => None,
        };
        let mut session = None;
        if let (Some(monitor), Some(upload)) = (&monitor, &self.config.upload) {
            match monitor.start(&self.config.output_dir, &upload.destination) {
                Ok(s) => session = Some(s),
                Err(e) => warn!(error = %e, "failed to start upload session"),
            }
        }
        // Security boundary, unconditional: the engine must never
        // observe storage credentials.
        clear_sensitive_vars();

        enter(Phase::Run);
        let outcome: Option<EngineOutcome> =
            match self.engine.run(&self.config, &exclusions).await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    warn!(error = %e, "test engine could not be run");
                    None
                }
            };
        let exit_code = outcome.map(|o| o.exit_code).unwrap_or(1);

        enter(Phase::UploadFinalize);
        if let (Some(monitor), Some(mut session)) = (monitor, session.take()) {
            if let Err(e) = monitor.finalize(&mut session).await {
                warn!(error = %e, "upload finalize failed; the test outcome is unaffected");
            }
        }

        enter(Phase::Analyze);
        let summary = analysis::analyze(&self.config, exit_code).await;
        info!(verdict = %summary.short_message, "run analyzed");

        enter(Phase::Report);
        if let Some(reporter) = &self.reporter {
            let kind = final_status_kind(self.config.run_mode, outcome);
            if let Err(e) = reporter.report_update(kind, &summary).await {
                warn!(error = %e, "failed to report final status");
            }
        }

        enter(Phase::Done);
        info!(exit_code, "integration test run complete");
        exit_code
    }
}

/// Final status type from the run mode and engine outcome.
fn final_status_kind(mode: RunMode, outcome: Option<EngineOutcome>) -> StatusKind {
    match outcome {
        Some(o) if o.passed() => match mode {
            RunMode::Full => StatusKind::Ready,
            RunMode::TestsOnly => StatusKind::Successful,
        },
        _ => StatusKind::Failed,
    }
}
