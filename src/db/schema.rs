use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{CustomizationJobId, JobId};

/// Lifecycle status of a job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Statuses from which a job may still move.
    pub const ACTIVE: [JobStatus; 2] = [JobStatus::Pending, JobStatus::Running];

    pub fn is_terminal(self) -> bool {
        !Self::ACTIVE.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one base model's customization within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NimRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    /// Never started because an earlier model of the same job failed.
    Skipped,
}

impl NimRunStatus {
    pub fn is_finished(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

/// Per-model sub-result embedded in a job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NimRun {
    /// Base model being customized.
    pub model_name: String,
    pub status: NimRunStatus,
    /// Handle of the remote customization job, once started.
    #[serde(default)]
    pub customization_job_id: Option<CustomizationJobId>,
    /// Fully qualified name of the produced model, once started.
    #[serde(default)]
    pub customized_model: Option<String>,
    /// Percentage done as last reported by the remote service.
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub epochs_completed: u64,
    #[serde(default)]
    pub steps_completed: u64,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl NimRun {
    pub fn pending(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            status: NimRunStatus::Pending,
            customization_job_id: None,
            customized_model: None,
            progress: 0.0,
            epochs_completed: 0,
            steps_completed: 0,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    /// Move to a finished status, stamping the finish time.
    pub fn finish(&mut self, status: NimRunStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.finished_at = Some(Utc::now());
    }
}

/// Persisted representation of one customization run (table: `job`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Stable identifier; also the record key.
    #[serde(rename = "job_id")]
    pub id: JobId,
    /// Workload the training data was collected from.
    pub workload_id: String,
    /// Client that owns the workload.
    pub client_id: String,
    pub status: JobStatus,
    /// When the job was submitted.
    pub started_at: DateTime<Utc>,
    /// When the job reached a terminal status.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Dataset records consumed so far.
    #[serde(default)]
    pub num_records: u64,
    /// One entry per base model, in execution order.
    #[serde(default)]
    pub nims: Vec<NimRun>,
    /// Failure message for FAILED jobs.
    #[serde(default)]
    pub error: Option<String>,
}

impl JobRecord {
    /// Mean progress over every model of the job.
    pub fn progress(&self) -> f64 {
        if self.nims.is_empty() {
            return 0.0;
        }
        self.nims.iter().map(|nim| nim.progress).sum::<f64>() / self.nims.len() as f64
    }

    /// Customized models this job produced (or started producing).
    pub fn customized_models(&self) -> impl Iterator<Item = &str> {
        self.nims
            .iter()
            .filter_map(|nim| nim.customized_model.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(nims: Vec<NimRun>) -> JobRecord {
        JobRecord {
            id: JobId::new("job-1"),
            workload_id: "w".to_string(),
            client_id: "c".to_string(),
            status: JobStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
            num_records: 0,
            nims,
            error: None,
        }
    }

    #[test]
    fn test_status_terminality() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&JobStatus::Cancelled).unwrap(), "\"cancelled\"");
        let status: NimRunStatus = serde_json::from_str("\"skipped\"").unwrap();
        assert_eq!(status, NimRunStatus::Skipped);
        assert!(status.is_finished());
    }

    #[test]
    fn test_progress_is_mean_over_models() {
        let mut a = NimRun::pending("a");
        a.progress = 100.0;
        let b = NimRun::pending("b");
        assert_eq!(record(vec![a, b]).progress(), 50.0);
        assert_eq!(record(Vec::new()).progress(), 0.0);
    }

    #[test]
    fn test_customized_models_skips_unstarted_runs() {
        let mut a = NimRun::pending("a");
        a.customized_model = Some("ns/customized-a".to_string());
        let job = record(vec![a, NimRun::pending("b")]);
        assert_eq!(job.customized_models().collect::<Vec<_>>(), vec!["ns/customized-a"]);
    }

    #[test]
    fn test_record_uses_job_id_field() {
        let json = serde_json::to_value(record(Vec::new())).unwrap();
        assert_eq!(json["job_id"], "job-1");
        assert!(json.get("id").is_none());
    }
}
