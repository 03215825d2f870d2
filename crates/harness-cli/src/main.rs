//! Harness - containerized integration-test entrypoint
//!
//! Assembles the immutable run configuration from flags and the
//! container environment, wires the production collaborators, and
//! drives the execution controller. The process exit code is the test
//! engine's verdict; a readiness-gate abort uses its own code.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use harness_core::{
    config::parse_command, AnalysisConfig, BrokenProviderPolicy, Controller, HttpStatusSink,
    ProcessEngine, ReadinessConfig, RunConfiguration, RunMode, StatusConfig, StatusCoordinates,
    StatusReporter, TagsConfig, UploadConfig,
};
use harness_sync::{CommandStore, StorageCredentials};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// In-cluster service-account token, used when no explicit token is given.
const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

#[derive(Parser)]
#[command(name = "harness")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Integration test execution harness", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Run mode: 'full' or 'tests-only'
    #[arg(long, env = "RUN_MODE", default_value = "full")]
    run_mode: String,

    /// Root directory of the test suite
    #[arg(long, env = "TEST_ROOT", default_value = "./tests")]
    test_root: PathBuf,

    /// Directory the test engine writes artifacts into
    #[arg(long, env = "OUTPUT_DIR", default_value = "./output")]
    output_dir: PathBuf,

    /// Comma-separated tags the run is restricted to
    #[arg(long, env = "INCLUDED_TAGS", default_value = "")]
    included_tags: String,

    /// Test engine command line
    #[arg(long, env = "ENGINE_COMMAND")]
    engine_command: String,

    /// Readiness check command; unset skips the gate
    #[arg(long, env = "READINESS_CHECK_COMMAND")]
    readiness_check_command: Option<String>,

    /// Readiness check timeout in seconds
    #[arg(long, env = "READINESS_CHECK_TIMEOUT", default_value_t = 300)]
    readiness_check_timeout: u64,

    /// Resolve tag exclusions from the test tree
    #[arg(long, env = "TAGS_RESOLUTION_ENABLED", default_value_t = true, action = ArgAction::Set)]
    tags_resolution_enabled: bool,

    /// File name that marks an exclusion provider
    #[arg(long, env = "TAGS_PROVIDER_FILENAME", default_value = "tags_exclusion.json")]
    tags_provider_filename: String,

    /// Broken-provider policy: 'fail' or 'skip'
    #[arg(long, env = "TAGS_PROVIDER_POLICY", default_value = "fail")]
    tags_provider_policy: String,

    /// Analyze the result artifact into a summary
    #[arg(long, env = "ANALYSIS_ENABLED", default_value_t = true, action = ArgAction::Set)]
    analysis_enabled: bool,

    /// Analyzer command; unset uses the exit-code summary
    #[arg(long, env = "ANALYZER_COMMAND")]
    analyzer_command: Option<String>,

    /// Mirror the output directory to remote storage
    #[arg(long, env = "UPLOAD_ENABLED", default_value_t = false, action = ArgAction::Set)]
    upload_enabled: bool,

    /// Sync command invoked with the local dir and destination
    #[arg(long, env = "UPLOAD_SYNC_COMMAND")]
    upload_sync_command: Option<String>,

    /// Remote destination URI
    #[arg(long, env = "UPLOAD_DESTINATION")]
    upload_destination: Option<String>,

    /// Background sync period in seconds
    #[arg(long, env = "UPLOAD_INTERVAL", default_value_t = 30)]
    upload_interval: u64,

    /// Remote store access key
    #[arg(long, env = "STORAGE_ACCESS_KEY", hide_env_values = true)]
    storage_access_key: Option<String>,

    /// Remote store secret key
    #[arg(long, env = "STORAGE_SECRET_KEY", hide_env_values = true)]
    storage_secret_key: Option<String>,

    /// Report run status to the external status resource
    #[arg(long, env = "STATUS_WRITING_ENABLED", default_value_t = false, action = ArgAction::Set)]
    status_writing_enabled: bool,

    /// Base URL of the cluster API hosting the status resource
    #[arg(long, env = "STATUS_API_URL")]
    status_api_url: Option<String>,

    /// Bearer token for the status API
    #[arg(long, env = "STATUS_API_TOKEN", hide_env_values = true)]
    status_api_token: Option<String>,

    /// Composite resource path: group/version/namespace/plural/name
    #[arg(long, env = "STATUS_RESOURCE_PATH")]
    status_resource_path: Option<String>,

    /// Discrete resource coordinates, alternative to the composite path
    #[arg(long, env = "STATUS_RESOURCE_GROUP")]
    status_resource_group: Option<String>,

    #[arg(long, env = "STATUS_RESOURCE_VERSION")]
    status_resource_version: Option<String>,

    #[arg(long, env = "STATUS_RESOURCE_NAMESPACE")]
    status_resource_namespace: Option<String>,

    #[arg(long, env = "STATUS_RESOURCE_PLURAL")]
    status_resource_plural: Option<String>,

    #[arg(long, env = "STATUS_RESOURCE_NAME")]
    status_resource_name: Option<String>,

    /// Encode status values as booleans instead of "True"/"False"
    #[arg(long, env = "STATUS_BOOLEAN_VALUES", default_value_t = false, action = ArgAction::Set)]
    status_boolean_values: bool,

    /// Report only the first line of the summary
    #[arg(long, env = "STATUS_SHORT_MESSAGE", default_value_t = true, action = ArgAction::Set)]
    status_short_message: bool,
}

impl Cli {
    fn status_coordinates(&self) -> Result<StatusCoordinates> {
        if let Some(path) = &self.status_resource_path {
            return Ok(StatusCoordinates::from_composite(path)?);
        }
        match (
            &self.status_resource_group,
            &self.status_resource_version,
            &self.status_resource_namespace,
            &self.status_resource_plural,
            &self.status_resource_name,
        ) {
            (Some(group), Some(version), Some(namespace), Some(plural), Some(name)) => {
                Ok(StatusCoordinates {
                    group: group.clone(),
                    version: version.clone(),
                    namespace: namespace.clone(),
                    plural: plural.clone(),
                    name: name.clone(),
                })
            }
            _ => bail!(
                "status addressing requires either STATUS_RESOURCE_PATH or all five STATUS_RESOURCE_* coordinates"
            ),
        }
    }

    fn build_configuration(&self) -> Result<RunConfiguration> {
        // The one read of the ambient environment; providers get this
        // snapshot, nothing reads the environment afterwards.
        let env_snapshot: BTreeMap<String, String> = std::env::vars().collect();

        let included_tags: BTreeSet<String> = self
            .included_tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        let readiness = self
            .readiness_check_command
            .as_deref()
            .map(parse_command)
            .filter(|command| !command.is_empty())
            .map(|command| ReadinessConfig {
                command,
                timeout: Duration::from_secs(self.readiness_check_timeout),
            });

        let upload = if self.upload_enabled {
            let sync_command = self
                .upload_sync_command
                .as_deref()
                .map(parse_command)
                .unwrap_or_default();
            let destination = self.upload_destination.clone().unwrap_or_default();
            let credentials = match (&self.storage_access_key, &self.storage_secret_key) {
                (Some(access_key), Some(secret_key)) => Some(StorageCredentials {
                    access_key: access_key.clone(),
                    secret_key: secret_key.clone(),
                }),
                _ => None,
            };
            Some(UploadConfig {
                sync_command,
                destination,
                interval: Duration::from_secs(self.upload_interval),
                finalize_attempts: 3,
                retry_backoff: Duration::from_secs(1),
                credentials,
            })
        } else {
            None
        };

        let status = if self.status_writing_enabled {
            let api_url = self
                .status_api_url
                .clone()
                .context("STATUS_API_URL is required when status writing is enabled")?;
            let token = match &self.status_api_token {
                Some(token) => Some(token.clone()),
                None => std::fs::read_to_string(SERVICE_ACCOUNT_TOKEN)
                    .ok()
                    .map(|t| t.trim().to_string()),
            };
            Some(StatusConfig {
                api_url,
                token,
                coordinates: self.status_coordinates()?,
                boolean_values: self.status_boolean_values,
                short_message: self.status_short_message,
            })
        } else {
            None
        };

        let config = RunConfiguration {
            run_mode: RunMode::parse(&self.run_mode)?,
            test_root: self.test_root.clone(),
            output_dir: self.output_dir.clone(),
            included_tags,
            engine_command: parse_command(&self.engine_command),
            readiness,
            tags: TagsConfig {
                enabled: self.tags_resolution_enabled,
                provider_filename: self.tags_provider_filename.clone(),
                policy: BrokenProviderPolicy::parse(&self.tags_provider_policy)?,
            },
            analysis: AnalysisConfig {
                enabled: self.analysis_enabled,
                analyzer_command: self
                    .analyzer_command
                    .as_deref()
                    .map(parse_command)
                    .filter(|command| !command.is_empty()),
            },
            upload,
            status,
            env_snapshot,
        };
        config.validate()?;
        Ok(config)
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let config = cli.build_configuration()?;

    let store = match &config.upload {
        Some(upload) => Some(Arc::new(CommandStore::new(
            upload.sync_command.clone(),
            upload.credentials.clone(),
        )?) as Arc<dyn harness_sync::RemoteStore>),
        None => None,
    };

    let reporter = config.status.as_ref().map(|status| {
        StatusReporter::new(
            Arc::new(HttpStatusSink::new(status)),
            status.boolean_values,
            status.short_message,
        )
    });

    let controller = Controller::new(config, Arc::new(ProcessEngine), store, reporter);
    Ok(controller.execute().await)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    harness_core::telemetry::init_tracing(cli.json, cli.verbose);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("harness failed to start: {e:#}");
            2
        }
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(
            std::iter::once("harness").chain(args.iter().copied()),
        )
        .expect("cli parse")
    }

    #[test]
    fn test_minimal_invocation_builds_config() {
        let cli = parse(&["--engine-command", "robot --outputdir out"]);
        let config = cli.build_configuration().expect("build config");
        assert_eq!(config.engine_command[0], "robot");
        assert_eq!(config.run_mode, RunMode::Full);
        assert!(config.readiness.is_none());
        assert!(config.upload.is_none());
        assert!(config.status.is_none());
    }

    #[test]
    fn test_included_tags_split_and_trimmed() {
        let cli = parse(&[
            "--engine-command",
            "robot",
            "--included-tags",
            "smoke, regression,,",
        ]);
        let config = cli.build_configuration().unwrap();
        assert!(config.included_tags.contains("smoke"));
        assert!(config.included_tags.contains("regression"));
        assert_eq!(config.included_tags.len(), 2);
    }

    #[test]
    fn test_composite_and_discrete_addressing_agree() {
        let composite = parse(&[
            "--engine-command",
            "robot",
            "--status-resource-path",
            "g/v1/ns/testruns/run1",
        ]);
        let discrete = parse(&[
            "--engine-command",
            "robot",
            "--status-resource-group",
            "g",
            "--status-resource-version",
            "v1",
            "--status-resource-namespace",
            "ns",
            "--status-resource-plural",
            "testruns",
            "--status-resource-name",
            "run1",
        ]);
        assert_eq!(
            composite.status_coordinates().unwrap(),
            discrete.status_coordinates().unwrap()
        );
    }

    #[test]
    fn test_partial_discrete_addressing_rejected() {
        let cli = parse(&[
            "--engine-command",
            "robot",
            "--status-resource-group",
            "g",
        ]);
        assert!(cli.status_coordinates().is_err());
    }

    #[test]
    fn test_status_requires_api_url() {
        let cli = parse(&[
            "--engine-command",
            "robot",
            "--status-writing-enabled",
            "true",
            "--status-resource-path",
            "g/v1/ns/testruns/run1",
        ]);
        assert!(cli.build_configuration().is_err());
    }
}
