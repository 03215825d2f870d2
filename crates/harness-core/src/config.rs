//! Run configuration assembled once at startup.
//!
//! The process environment is the configuration channel of the
//! container, but it is read exactly once: the CLI snapshots it into a
//! [`RunConfiguration`] at `Init` and no component reads ambient
//! environment state after that point.

use crate::error::ConfigError;
use harness_sync::StorageCredentials;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

/// How the run's final positive status is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Full deployment run; a clean pass reports `Ready`.
    Full,

    /// Tests-only run against a pre-existing deployment; a clean pass
    /// reports `Successful`.
    TestsOnly,
}

impl RunMode {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "full" => Ok(RunMode::Full),
            "tests-only" => Ok(RunMode::TestsOnly),
            other => Err(ConfigError::InvalidRunMode {
                value: other.to_string(),
            }),
        }
    }
}

/// Policy for a provider that fails during tag resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokenProviderPolicy {
    /// Abort resolution; the controller falls back to no exclusions.
    Fail,

    /// Log a warning and continue with the remaining providers.
    Skip,
}

impl BrokenProviderPolicy {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "fail" => Ok(BrokenProviderPolicy::Fail),
            "skip" => Ok(BrokenProviderPolicy::Skip),
            other => Err(ConfigError::InvalidProviderPolicy {
                value: other.to_string(),
            }),
        }
    }
}

/// Readiness gate settings.
#[derive(Debug, Clone)]
pub struct ReadinessConfig {
    /// Check command; exit 0 means the environment is ready.
    pub command: Vec<String>,

    /// Bound on the whole check, default 300s.
    pub timeout: Duration,
}

/// Tag-exclusion resolver settings.
#[derive(Debug, Clone)]
pub struct TagsConfig {
    pub enabled: bool,

    /// File name that marks an exclusion provider under the test root.
    pub provider_filename: String,

    pub policy: BrokenProviderPolicy,
}

/// Result analysis settings.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub enabled: bool,

    /// Analyzer command, invoked with the artifact and summary paths.
    /// Unset means the default exit-code summary is used.
    pub analyzer_command: Option<Vec<String>>,
}

/// Upload monitoring settings.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Sync command, invoked with the local dir and destination URI.
    pub sync_command: Vec<String>,

    /// Remote destination URI the output directory is mirrored to.
    pub destination: String,

    /// Background sync period.
    pub interval: Duration,

    /// Bounded retries for the terminal flush.
    pub finalize_attempts: u32,

    /// Initial backoff between finalize attempts; doubles each retry.
    pub retry_backoff: Duration,

    pub credentials: Option<StorageCredentials>,
}

/// Status resource coordinates: group/version/namespace/plural/name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCoordinates {
    pub group: String,
    pub version: String,
    pub namespace: String,
    pub plural: String,
    pub name: String,
}

impl StatusCoordinates {
    /// Parse the composite `group/version/namespace/plural/name` form.
    /// Both addressing forms resolve to the same target.
    pub fn from_composite(path: &str) -> Result<Self, ConfigError> {
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        if parts.len() != 5 {
            return Err(ConfigError::InvalidResourcePath {
                path: path.to_string(),
            });
        }
        Ok(Self {
            group: parts[0].to_string(),
            version: parts[1].to_string(),
            namespace: parts[2].to_string(),
            plural: parts[3].to_string(),
            name: parts[4].to_string(),
        })
    }

    /// URL of the resource itself under an API base.
    pub fn resource_url(&self, base: &str) -> String {
        format!(
            "{}/apis/{}/{}/namespaces/{}/{}/{}",
            base.trim_end_matches('/'),
            self.group,
            self.version,
            self.namespace,
            self.plural,
            self.name
        )
    }

    /// URL of the status subresource.
    pub fn status_url(&self, base: &str) -> String {
        format!("{}/status", self.resource_url(base))
    }
}

/// Status reporting settings.
#[derive(Debug, Clone)]
pub struct StatusConfig {
    /// Base URL of the cluster API hosting the status resource.
    pub api_url: String,

    /// Bearer token for the API, when required.
    pub token: Option<String>,

    pub coordinates: StatusCoordinates,

    /// Encode status values as JSON booleans instead of the string
    /// forms `"True"`/`"False"`.
    pub boolean_values: bool,

    /// Report only the first line of the summary.
    pub short_message: bool,
}

/// Immutable configuration for one harness run.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    pub run_mode: RunMode,

    /// Root directory scanned for tests and exclusion providers.
    pub test_root: PathBuf,

    /// Directory the test engine writes its artifacts into.
    pub output_dir: PathBuf,

    /// Tags the run is restricted to; empty means all.
    pub included_tags: BTreeSet<String>,

    /// Test engine command; include/exclude expressions and the test
    /// root are appended at invocation time.
    pub engine_command: Vec<String>,

    pub readiness: Option<ReadinessConfig>,
    pub tags: TagsConfig,
    pub analysis: AnalysisConfig,
    pub upload: Option<UploadConfig>,
    pub status: Option<StatusConfig>,

    /// Environment snapshot taken before credential scrubbing; handed
    /// to exclusion providers.
    pub env_snapshot: BTreeMap<String, String>,
}

impl RunConfiguration {
    /// Validate cross-field constraints after assembly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine_command.is_empty() {
            return Err(ConfigError::MissingEngineCommand);
        }
        if let Some(upload) = &self.upload {
            if upload.sync_command.is_empty() {
                return Err(ConfigError::MissingSyncCommand);
            }
            if upload.destination.is_empty() {
                return Err(ConfigError::MissingUploadDestination);
            }
        }
        Ok(())
    }
}

/// Split a command string into argv form.
pub fn parse_command(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> RunConfiguration {
        RunConfiguration {
            run_mode: RunMode::Full,
            test_root: PathBuf::from("./tests"),
            output_dir: PathBuf::from("./output"),
            included_tags: BTreeSet::new(),
            engine_command: vec!["robot".to_string()],
            readiness: None,
            tags: TagsConfig {
                enabled: true,
                provider_filename: "tags_exclusion.json".to_string(),
                policy: BrokenProviderPolicy::Fail,
            },
            analysis: AnalysisConfig {
                enabled: true,
                analyzer_command: None,
            },
            upload: None,
            status: None,
            env_snapshot: BTreeMap::new(),
        }
    }

    #[test]
    fn test_run_mode_parse() {
        assert_eq!(RunMode::parse("full").unwrap(), RunMode::Full);
        assert_eq!(RunMode::parse("tests-only").unwrap(), RunMode::TestsOnly);
        assert!(RunMode::parse("bogus").is_err());
    }

    #[test]
    fn test_provider_policy_parse() {
        assert_eq!(
            BrokenProviderPolicy::parse("fail").unwrap(),
            BrokenProviderPolicy::Fail
        );
        assert_eq!(
            BrokenProviderPolicy::parse("skip").unwrap(),
            BrokenProviderPolicy::Skip
        );
        assert!(BrokenProviderPolicy::parse("maybe").is_err());
    }

    #[test]
    fn test_composite_path_parses_to_coordinates() {
        let coords =
            StatusCoordinates::from_composite("qubership.org/v1/prod/testruns/smoke").unwrap();
        assert_eq!(coords.group, "qubership.org");
        assert_eq!(coords.version, "v1");
        assert_eq!(coords.namespace, "prod");
        assert_eq!(coords.plural, "testruns");
        assert_eq!(coords.name, "smoke");
    }

    #[test]
    fn test_composite_path_rejects_wrong_arity() {
        assert!(StatusCoordinates::from_composite("a/b/c").is_err());
        assert!(StatusCoordinates::from_composite("a/b/c/d/e/f").is_err());
    }

    #[test]
    fn test_resource_url_layout() {
        let coords = StatusCoordinates::from_composite("g/v1/ns/kind/obj").unwrap();
        assert_eq!(
            coords.resource_url("https://api.local:6443/"),
            "https://api.local:6443/apis/g/v1/namespaces/ns/kind/obj"
        );
        assert!(coords.status_url("https://api.local:6443").ends_with("/obj/status"));
    }

    #[test]
    fn test_validate_requires_engine_command() {
        let mut config = minimal_config();
        config.engine_command.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingEngineCommand)
        ));
    }

    #[test]
    fn test_validate_requires_upload_fields() {
        let mut config = minimal_config();
        config.upload = Some(UploadConfig {
            sync_command: vec![],
            destination: "s3://bucket/run".to_string(),
            interval: Duration::from_secs(30),
            finalize_attempts: 3,
            retry_backoff: Duration::from_secs(1),
            credentials: None,
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingSyncCommand)
        ));
    }

    #[test]
    fn test_parse_command_splits_whitespace() {
        assert_eq!(
            parse_command("robot --outputdir out"),
            vec!["robot", "--outputdir", "out"]
        );
        assert!(parse_command("  ").is_empty());
    }
}
