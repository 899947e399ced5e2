//! Request and response payloads of the orchestrator operations.

use serde::{Deserialize, Serialize};

use crate::config::TrainingConfig;
use crate::db::JobRecord;
use crate::types::JobId;

/// Training data a job customizes against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRef {
    pub name: String,
    /// Defaults to the configured namespace.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Records in the dataset, added to the job's count once training starts.
    #[serde(default)]
    pub num_records: u64,
}

/// Input of `create_job`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub workload_id: String,
    pub client_id: String,
    pub dataset: DatasetRef,
    /// Base models to customize, in order.
    pub models: Vec<String>,
    /// Overrides the configured training defaults.
    #[serde(default)]
    pub training: Option<TrainingConfig>,
}

impl JobRequest {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.workload_id.trim().is_empty() {
            return Err("workload_id must not be empty".to_string());
        }
        if self.client_id.trim().is_empty() {
            return Err("client_id must not be empty".to_string());
        }
        if self.dataset.name.trim().is_empty() {
            return Err("dataset.name must not be empty".to_string());
        }
        if self.models.is_empty() {
            return Err("at least one model is required".to_string());
        }
        if self.models.iter().any(|m| m.trim().is_empty()) {
            return Err("model names must not be empty".to_string());
        }
        if let Some(training) = &self.training {
            if training.epochs == 0 || training.batch_size == 0 {
                return Err("training.epochs and training.batch_size must be positive".to_string());
            }
            if training.learning_rate <= 0.0 {
                return Err("training.learning_rate must be positive".to_string());
            }
        }
        Ok(())
    }
}

/// Acknowledgement returned as soon as a job is queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobAccepted {
    pub id: JobId,
    pub status: String,
    pub message: String,
}

/// A job record plus derived state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub job: JobRecord,
    /// Mean progress over every model of the job.
    pub progress: f64,
    pub cancellation_requested: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCancelled {
    pub id: JobId,
    pub message: String,
}

/// Result of a delete. Remote cleanup failures do not fail the delete; they
/// are listed here instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDeleted {
    pub id: JobId,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote_cleanup_errors: Vec<String>,
}

impl JobDeleted {
    pub fn is_degraded(&self) -> bool {
        !self.remote_cleanup_errors.is_empty()
    }
}
