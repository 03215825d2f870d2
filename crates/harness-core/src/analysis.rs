//! Result analysis: raw engine artifact to a short status summary.
//!
//! The analyzer is an external collaborator that reads the result
//! artifact and writes a plain-text summary file whose first line is
//! the short status message. Analyzer failure is degraded, never
//! fatal: the run falls back to a summary derived from the exit code.

use crate::config::RunConfiguration;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::warn;

/// Result artifact the test engine writes into the output directory.
pub const RESULT_ARTIFACT: &str = "output.xml";

/// Summary file the analyzer produces next to the artifact.
pub const SUMMARY_FILE: &str = "summary.txt";

/// Condensed verdict of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSummary {
    /// First line of the summary text.
    pub short_message: String,

    /// Full summary text.
    pub full_text: String,

    /// The engine's exit code.
    pub exit_code: i32,
}

impl ResultSummary {
    /// Default summary when analysis is disabled or failed.
    pub fn from_exit_code(exit_code: i32) -> Self {
        let text = if exit_code == 0 {
            "Integration tests passed".to_string()
        } else {
            format!("Integration tests failed with exit code {exit_code}")
        };
        Self {
            short_message: text.clone(),
            full_text: text,
            exit_code,
        }
    }

    /// Summary from analyzer-produced text; the first line is short.
    pub fn from_text(text: &str, exit_code: i32) -> Self {
        let short = text.lines().next().unwrap_or("").trim().to_string();
        Self {
            short_message: short,
            full_text: text.to_string(),
            exit_code,
        }
    }
}

fn artifact_path(config: &RunConfiguration) -> PathBuf {
    config.output_dir.join(RESULT_ARTIFACT)
}

fn summary_path(config: &RunConfiguration) -> PathBuf {
    config.output_dir.join(SUMMARY_FILE)
}

/// Make sure the artifact exists so downstream consumers (analyzer,
/// upload mirror) see a file even when the engine never produced one.
async fn ensure_artifact(path: &Path) {
    if !path.exists() {
        warn!(artifact = %path.display(), "engine produced no result artifact, creating empty placeholder");
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        tokio::fs::write(path, b"").await.ok();
    }
}

/// Analyze the run's artifact into a [`ResultSummary`].
///
/// Never fails: any analyzer problem degrades to the exit-code
/// summary. The chosen summary text is also written to the summary
/// file so the remote mirror carries it.
pub async fn analyze(config: &RunConfiguration, exit_code: i32) -> ResultSummary {
    if !config.analysis.enabled {
        return ResultSummary::from_exit_code(exit_code);
    }

    let artifact = artifact_path(config);
    let summary_file = summary_path(config);
    ensure_artifact(&artifact).await;

    let Some(command) = &config.analysis.analyzer_command else {
        let summary = ResultSummary::from_exit_code(exit_code);
        tokio::fs::write(&summary_file, &summary.full_text).await.ok();
        return summary;
    };

    match run_analyzer(command, &artifact, &summary_file).await {
        Ok(()) => match tokio::fs::read_to_string(&summary_file).await {
            Ok(text) if !text.trim().is_empty() => ResultSummary::from_text(&text, exit_code),
            Ok(_) => {
                warn!("analyzer wrote an empty summary, falling back to exit-code summary");
                ResultSummary::from_exit_code(exit_code)
            }
            Err(e) => {
                warn!(error = %e, "failed to read analyzer summary, falling back to exit-code summary");
                ResultSummary::from_exit_code(exit_code)
            }
        },
        Err(e) => {
            warn!(error = %e, "analyzer failed, falling back to exit-code summary");
            let summary = ResultSummary::from_exit_code(exit_code);
            tokio::fs::write(&summary_file, &summary.full_text).await.ok();
            summary
        }
    }
}

async fn run_analyzer(
    command: &[String],
    artifact: &Path,
    summary_file: &Path,
) -> std::io::Result<()> {
    let (exe, args) = command
        .split_first()
        .ok_or_else(|| std::io::Error::other("analyzer command must not be empty"))?;
    let output = Command::new(exe)
        .args(args)
        .arg(artifact)
        .arg(summary_file)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;
    if output.status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!(
            "analyzer exited with code {}: {}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr)
        )))
    }
}
