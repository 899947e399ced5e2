//! Request and response shapes for the customization service.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::config::TrainingConfig;
use crate::types::CustomizationJobId;

/// Message the service appends to a running job's log when it cannot
/// schedule the job onto hardware.
pub const NOT_ENOUGH_RESOURCES: &str = "NotEnoughResources";

/// Detail used when a failed job carries no diagnostic in its status logs.
pub const NO_ERROR_DETAILS: &str = "No error details available";

/// Everything needed to launch one customization job. Immutable once submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingJobSpec {
    pub name: String,
    /// Base model configuration to fine-tune.
    pub base_model: String,
    /// Output model name, without namespace; the client namespaces it.
    pub output_model_name: String,
    pub dataset_name: String,
    pub dataset_namespace: String,
    pub hyperparameters: TrainingConfig,
}

/// Handle returned by the service after a job was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StartedJob {
    #[serde(rename = "id")]
    pub job_id: CustomizationJobId,
    /// Fully qualified (namespaced) name of the model the job will produce.
    pub output_model: String,
}

/// Remote status tag of a customization job.
///
/// The service reports a free-form string; anything outside the known set
/// lands in `Unknown` and is treated as fatal by the poll loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RemoteJobStatus {
    Pending,
    Created,
    Running,
    Completed,
    Failed,
    Unknown(String),
}

impl RemoteJobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Created => "created",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<String> for RemoteJobStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "pending" => Self::Pending,
            "created" => Self::Created,
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<RemoteJobStatus> for String {
    fn from(status: RemoteJobStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for RemoteJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn missing_status() -> RemoteJobStatus {
    RemoteJobStatus::Unknown(String::new())
}

/// Treats an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One entry of a job's status log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusLog {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Status of a customization job as returned by one poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusSnapshot {
    #[serde(default = "missing_status")]
    pub status: RemoteJobStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub percentage_done: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub epochs_completed: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub steps_completed: u64,
    /// Oldest entry first.
    #[serde(default, deserialize_with = "null_as_default")]
    pub status_logs: Vec<StatusLog>,
}

impl JobStatusSnapshot {
    pub fn new(status: RemoteJobStatus) -> Self {
        Self {
            status,
            percentage_done: 0.0,
            epochs_completed: 0,
            steps_completed: 0,
            status_logs: Vec::new(),
        }
    }

    /// Most relevant failure diagnostic: the newest log entry with a
    /// non-empty detail, or [`NO_ERROR_DETAILS`].
    pub fn failure_detail(&self) -> &str {
        self.status_logs
            .iter()
            .rev()
            .find_map(|log| log.detail.as_deref().filter(|d| !d.is_empty()))
            .unwrap_or(NO_ERROR_DETAILS)
    }

    /// Message of the most recently appended log entry, if any.
    pub fn last_log_message(&self) -> Option<&str> {
        self.status_logs.last().and_then(|log| log.message.as_deref())
    }

    /// True when the newest log entry reports the job could not get resources.
    pub fn lacks_resources(&self) -> bool {
        self.last_log_message() == Some(NOT_ENOUGH_RESOURCES)
    }
}

/// Model metadata from the entity store. Only the identifying fields are
/// typed; the rest of the document is kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Body of `POST /v1/customization/jobs`.
#[derive(Debug, Serialize)]
pub(crate) struct StartJobBody<'a> {
    pub name: &'a str,
    pub output_model: String,
    pub config: &'a str,
    pub dataset: DatasetBody<'a>,
    pub hyperparameters: &'a TrainingConfig,
}

#[derive(Debug, Serialize)]
pub(crate) struct DatasetBody<'a> {
    pub name: &'a str,
    pub namespace: &'a str,
}

/// Body of the NIM `GET /v1/models` listing.
#[derive(Debug, Deserialize)]
pub(crate) struct DeployedModels {
    #[serde(default)]
    pub data: Vec<DeployedModel>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeployedModel {
    pub id: String,
}
