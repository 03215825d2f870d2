//! Status reporting to the external cluster-managed status resource.
//!
//! Two records are ever produced per run: an `InProgress` condition as
//! soon as the orchestrator is alive, and a final condition derived
//! from the test engine's verdict. Reporting failures are logged, never
//! fatal: the test outcome is unaffected by the inability to report it.

use crate::analysis::ResultSummary;
use crate::config::StatusConfig;
use crate::error::StatusError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Condition reason identifying harness-owned status records.
pub const STATUS_REASON: &str = "IntegrationTestsExecutionStatus";

/// Kind of a status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// The orchestrator started and tests are underway.
    InProgress,

    /// Full run passed; the deployment is ready.
    Ready,

    /// Tests-only run against a pre-existing deployment passed.
    Successful,

    /// The engine exited non-zero or was never reached.
    Failed,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::InProgress => "In progress",
            StatusKind::Ready => "Ready",
            StatusKind::Successful => "Successful",
            StatusKind::Failed => "Failed",
        }
    }

    /// Ready and Successful are true-valued; Failed and InProgress
    /// false-valued.
    pub fn is_positive(&self) -> bool {
        matches!(self, StatusKind::Ready | StatusKind::Successful)
    }

    /// Status value under the configured encoding: JSON boolean when
    /// `boolean_values` is on, `"True"`/`"False"` strings otherwise.
    pub fn status_value(&self, boolean_values: bool) -> Value {
        if boolean_values {
            Value::Bool(self.is_positive())
        } else if self.is_positive() {
            Value::String("True".to_string())
        } else {
            Value::String("False".to_string())
        }
    }
}

/// One status record pushed to the external resource.
#[derive(Debug, Clone)]
pub struct StatusRecord {
    pub kind: StatusKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub value: Value,
}

impl StatusRecord {
    pub fn new(kind: StatusKind, message: String, boolean_values: bool) -> Self {
        Self {
            kind,
            message,
            timestamp: Utc::now(),
            value: kind.status_value(boolean_values),
        }
    }

    /// Render as a status condition object.
    pub fn to_condition(&self) -> Value {
        json!({
            "type": self.kind.as_str(),
            "message": self.message,
            "reason": STATUS_REASON,
            "lastTransitionTime": self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            "status": self.value,
        })
    }
}

/// Destination for status records.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn publish(&self, record: &StatusRecord) -> Result<(), StatusError>;
}

/// Sink that patches the condition into a cluster custom resource.
///
/// Read-modify-write: fetch the resource, replace or append the
/// condition whose reason is [`STATUS_REASON`], then merge-patch the
/// status subresource.
pub struct HttpStatusSink {
    client: reqwest::Client,
    token: Option<String>,
    resource_url: String,
    status_url: String,
}

impl HttpStatusSink {
    pub fn new(config: &StatusConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: config.token.clone(),
            resource_url: config.coordinates.resource_url(&config.api_url),
            status_url: config.coordinates.status_url(&config.api_url),
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl StatusSink for HttpStatusSink {
    async fn publish(&self, record: &StatusRecord) -> Result<(), StatusError> {
        let response = self
            .authorized(self.client.get(&self.resource_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StatusError::UnexpectedResponse {
                code: response.status().as_u16(),
                url: self.resource_url.clone(),
            });
        }
        let body: Value = response.json().await?;

        let mut conditions = body
            .get("status")
            .and_then(|s| s.get("conditions"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let condition = record.to_condition();
        match conditions
            .iter_mut()
            .find(|c| c.get("reason").and_then(Value::as_str) == Some(STATUS_REASON))
        {
            Some(slot) => *slot = condition,
            None => conditions.push(condition),
        }

        let patch = json!({ "status": { "conditions": conditions } });
        let response = self
            .authorized(self.client.patch(&self.status_url))
            .header("Content-Type", "application/merge-patch+json")
            .json(&patch)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StatusError::UnexpectedResponse {
                code: response.status().as_u16(),
                url: self.status_url.clone(),
            });
        }
        Ok(())
    }
}

/// Builds the two per-run records and hands them to the sink.
pub struct StatusReporter {
    sink: Arc<dyn StatusSink>,
    boolean_values: bool,
    short_message: bool,
}

impl StatusReporter {
    pub fn new(sink: Arc<dyn StatusSink>, boolean_values: bool, short_message: bool) -> Self {
        Self {
            sink,
            boolean_values,
            short_message,
        }
    }

    /// Sent once, immediately after the run begins.
    pub async fn report_in_progress(&self) -> Result<(), StatusError> {
        let record = StatusRecord::new(
            StatusKind::InProgress,
            "Integration tests execution is in progress".to_string(),
            self.boolean_values,
        );
        info!(kind = record.kind.as_str(), "reporting status");
        self.sink.publish(&record).await
    }

    /// Sent once, after result analysis.
    pub async fn report_update(
        &self,
        kind: StatusKind,
        summary: &ResultSummary,
    ) -> Result<(), StatusError> {
        let message = if self.short_message {
            summary.short_message.clone()
        } else {
            summary.full_text.clone()
        };
        let record = StatusRecord::new(kind, message, self.boolean_values);
        info!(kind = record.kind.as_str(), "reporting status");
        self.sink.publish(&record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Sink that remembers every published record.
    pub(crate) struct RecordingSink {
        pub records: Mutex<Vec<StatusRecord>>,
    }

    impl RecordingSink {
        pub(crate) fn new() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl StatusSink for RecordingSink {
        async fn publish(&self, record: &StatusRecord) -> Result<(), StatusError> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    #[test]
    fn test_boolean_value_mapping() {
        assert_eq!(StatusKind::Ready.status_value(true), Value::Bool(true));
        assert_eq!(StatusKind::Successful.status_value(true), Value::Bool(true));
        assert_eq!(StatusKind::Failed.status_value(true), Value::Bool(false));
        assert_eq!(StatusKind::InProgress.status_value(true), Value::Bool(false));
    }

    #[test]
    fn test_string_value_mapping() {
        assert_eq!(
            StatusKind::Ready.status_value(false),
            Value::String("True".to_string())
        );
        assert_eq!(
            StatusKind::Successful.status_value(false),
            Value::String("True".to_string())
        );
        assert_eq!(
            StatusKind::Failed.status_value(false),
            Value::String("False".to_string())
        );
        assert_eq!(
            StatusKind::InProgress.status_value(false),
            Value::String("False".to_string())
        );
    }

    #[test]
    fn test_condition_shape() {
        let record = StatusRecord::new(StatusKind::Ready, "all good".to_string(), true);
        let condition = record.to_condition();
        assert_eq!(condition["type"], "Ready");
        assert_eq!(condition["reason"], STATUS_REASON);
        assert_eq!(condition["status"], Value::Bool(true));
        assert!(condition["lastTransitionTime"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_reporter_short_vs_full_message() {
        let summary = ResultSummary::from_text("1 failed\nfull details here", 1);

        let sink = Arc::new(RecordingSink::new());
        let reporter = StatusReporter::new(sink.clone(), false, true);
        reporter
            .report_update(StatusKind::Failed, &summary)
            .await
            .unwrap();
        assert_eq!(sink.records.lock().unwrap()[0].message, "1 failed");

        let sink = Arc::new(RecordingSink::new());
        let reporter = StatusReporter::new(sink.clone(), false, false);
        reporter
            .report_update(StatusKind::Failed, &summary)
            .await
            .unwrap();
        assert!(sink.records.lock().unwrap()[0]
            .message
            .contains("full details here"));
    }

    #[tokio::test]
    async fn test_in_progress_record() {
        let sink = Arc::new(RecordingSink::new());
        let reporter = StatusReporter::new(sink.clone(), true, true);
        reporter.report_in_progress().await.unwrap();

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, StatusKind::InProgress);
        assert_eq!(records[0].value, Value::Bool(false));
    }
}
