//! Test-execution engine seam.
//!
//! The engine itself is an external collaborator: it takes an
//! include/exclude tag expression and a test root, writes a structured
//! result artifact into the output directory, and reports a process
//! exit code. The harness never imposes its own timeout on this phase.

use crate::config::RunConfiguration;
use crate::error::EngineError;
use crate::tags::TagExclusions;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

/// Outcome of one engine invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOutcome {
    /// The engine's process exit code; becomes the harness exit code.
    pub exit_code: i32,

    /// The engine was killed or interrupted rather than exiting on its
    /// own. Degraded, not fatal: the pipeline still advances.
    pub interrupted: bool,
}

impl EngineOutcome {
    pub fn passed(&self) -> bool {
        !self.interrupted && self.exit_code == 0
    }
}

/// An external test-execution engine.
#[async_trait]
pub trait TestEngine: Send + Sync {
    async fn run(
        &self,
        config: &RunConfiguration,
        exclusions: &TagExclusions,
    ) -> Result<EngineOutcome, EngineError>;
}

/// Engine invoked as a foreground child process.
///
/// Appends `-i <include>` / `-e <exclude>` expressions and the test
/// root to the configured command. Stdout/stderr stream straight to
/// the harness's own console. On SIGINT/SIGTERM the child is killed
/// and the run continues to cleanup with an interrupted outcome.
pub struct ProcessEngine;

#[async_trait]
impl TestEngine for ProcessEngine {
    async fn run(
        &self,
        config: &RunConfiguration,
        exclusions: &TagExclusions,
    ) -> Result<EngineOutcome, EngineError> {
        if config.engine_command.is_empty() {
            return Err(EngineError::EmptyCommand);
        }

        let exe = &config.engine_command[0];
        let args = &config.engine_command[1..];

        let mut cmd = Command::new(exe);
        cmd.args(args);

        let include = config
            .included_tags
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join("OR");
        if !include.is_empty() {
            cmd.arg("-i").arg(include);
        }
        let exclude = exclusions.expression();
        if !exclude.is_empty() {
            cmd.arg("-e").arg(exclude);
        }
        cmd.arg(&config.test_root);

        info!(command = %exe, test_root = %config.test_root.display(), "starting test engine");

        let mut child = cmd.spawn()?;

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                let exit_code = status.code().unwrap_or(1);
                // No exit code means the engine was killed by a signal.
                let interrupted = status.code().is_none();
                info!(exit_code, interrupted, "test engine finished");
                Ok(EngineOutcome { exit_code, interrupted })
            }
            _ = termination_signal() => {
                warn!("termination signal received, stopping test engine");
                child.start_kill().ok();
                let status = child.wait().await?;
                Ok(EngineOutcome {
                    exit_code: status.code().unwrap_or(130),
                    interrupted: true,
                })
            }
        }
    }
}

/// Resolves on SIGINT or, on unix, SIGTERM.
async fn termination_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(_) => {
                // No SIGTERM stream; fall back to ctrl-c only.
                tokio::signal::ctrl_c().await.ok();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}
