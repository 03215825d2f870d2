//! Tag-exclusion resolution.
//!
//! Exclusion rules are distributed across the test tree: any file named
//! after the configured provider file name is a provider. A provider is
//! either a declarative JSON document or, when marked executable, a
//! program run with the environment snapshot that prints the same JSON
//! to stdout. Either form yields a list of tags (no reasons) or a
//! mapping of tag to reason.
//!
//! Discovery is one deterministic recursive walk of the test root,
//! lexicographic by path, so the documented last-write-wins semantics
//! for duplicate reasons are stable across runs.

use crate::config::{BrokenProviderPolicy, RunConfiguration};
use crate::error::ResolveError;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

/// Separator the test engine expects between excluded tags.
const TAG_OR_SEPARATOR: &str = "OR";

/// What a single provider returned.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ProviderOutput {
    /// Tags with reasons attached.
    Reasons(BTreeMap<String, String>),

    /// Bare tags, no reasons.
    Tags(Vec<String>),
}

/// One discovered exclusion provider file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileProvider {
    path: PathBuf,
}

impl FileProvider {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_executable(&self) -> bool {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::metadata(&self.path)
                .map(|m| m.permissions().mode() & 0o111 != 0)
                .unwrap_or(false)
        }
        #[cfg(not(unix))]
        {
            false
        }
    }

    /// Evaluate the provider against the environment snapshot.
    pub async fn excluded_tags(
        &self,
        env: &BTreeMap<String, String>,
    ) -> Result<ProviderOutput, ResolveError> {
        let raw = if self.is_executable() {
            let output = Command::new(&self.path)
                .env_clear()
                .envs(env)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await
                .map_err(|source| ResolveError::Read {
                    path: self.path.clone(),
                    source,
                })?;
            if !output.status.success() {
                return Err(ResolveError::ProviderFailed {
                    path: self.path.clone(),
                    code: output.status.code().unwrap_or(-1),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                });
            }
            String::from_utf8_lossy(&output.stdout).to_string()
        } else {
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| ResolveError::Read {
                    path: self.path.clone(),
                    source,
                })?
        };

        serde_json::from_str(&raw).map_err(|source| ResolveError::InvalidOutput {
            path: self.path.clone(),
            source,
        })
    }
}

/// Aggregate exclusion set with its diagnostic reason report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagExclusions {
    /// Union of tags seen across all providers, duplicates collapsed.
    pub tags: BTreeSet<String>,

    /// Reasons from mapping-form providers; later providers overwrite
    /// earlier ones for the same tag (last-write-wins by scan order).
    pub reasons: BTreeMap<String, String>,
}

impl TagExclusions {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Exclusion expression for the test engine: tags joined by `OR`.
    pub fn expression(&self) -> String {
        self.tags.iter().cloned().collect::<Vec<_>>().join(TAG_OR_SEPARATOR)
    }

    /// Human-readable reason report for the run log.
    pub fn describe_reasons(&self) -> String {
        if self.reasons.is_empty() {
            return String::new();
        }
        let lines: Vec<String> = self
            .reasons
            .iter()
            .map(|(tag, reason)| format!("{tag}: {reason}"))
            .collect();
        format!(
            "The following tags will be excluded with provided reason\n{}",
            lines.join("\n")
        )
    }
}

/// Walk `test_root` collecting providers in deterministic order.
pub fn discover(test_root: &Path, provider_filename: &str) -> Result<Vec<FileProvider>, ResolveError> {
    let mut found = Vec::new();
    let mut pending = vec![test_root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|source| ResolveError::Scan {
            path: dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| ResolveError::Scan {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|source| ResolveError::Scan {
                path: path.clone(),
                source,
            })?;
            // Symlinked directories are not descended into; a link
            // cycle under the test root must not hang discovery.
            // Symlinks to regular files still count as providers.
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_symlink() && !path.is_file() {
                continue;
            } else if path.file_name().and_then(|n| n.to_str()) == Some(provider_filename)
                || executable_variant(&path, provider_filename)
            {
                found.push(FileProvider { path });
            }
        }
    }

    found.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(found)
}

/// `<provider_filename>.sh` next to the declarative form is also a provider.
fn executable_variant(path: &Path, provider_filename: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n == format!("{provider_filename}.sh"))
        .unwrap_or(false)
}

/// Resolve the aggregate exclusions for this run.
///
/// Provider failures follow the configured policy: `fail` surfaces the
/// error (the controller then falls back to an empty exclusion set),
/// `skip` logs a warning and continues with the remaining providers.
pub async fn resolve(config: &RunConfiguration) -> Result<TagExclusions, ResolveError> {
    if !config.tags.enabled {
        return Ok(TagExclusions::empty());
    }

    let providers = discover(&config.test_root, &config.tags.provider_filename)?;
    info!(count = providers.len(), "discovered exclusion providers");

    let mut exclusions = TagExclusions::empty();
    for provider in providers {
        match provider.excluded_tags(&config.env_snapshot).await {
            Ok(ProviderOutput::Tags(tags)) => {
                exclusions.tags.extend(tags);
            }
            Ok(ProviderOutput::Reasons(map)) => {
                exclusions.tags.extend(map.keys().cloned());
                exclusions.reasons.extend(map);
            }
            Err(e) => match config.tags.policy {
                BrokenProviderPolicy::Fail => return Err(e),
                BrokenProviderPolicy::Skip => {
                    warn!(provider = %provider.path().display(), error = %e, "skipping broken exclusion provider");
                }
            },
        }
    }

    if !exclusions.is_empty() {
        info!(expression = %exclusions.expression(), "resolved tag exclusions");
        let report = exclusions.describe_reasons();
        if !report.is_empty() {
            info!("{report}");
        }
    }
    Ok(exclusions)
}
