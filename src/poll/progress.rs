use async_trait::async_trait;
use serde::Serialize;

/// Progress payload emitted by the customization wait loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    /// Percentage done, 0 to 100.
    pub progress: f64,
    pub epochs_completed: u64,
    pub steps_completed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressUpdate {
    pub fn running(progress: f64, epochs_completed: u64, steps_completed: u64) -> Self {
        Self {
            progress,
            epochs_completed,
            steps_completed,
            error: None,
        }
    }

    pub fn completed(epochs_completed: u64, steps_completed: u64) -> Self {
        Self::running(100.0, epochs_completed, steps_completed)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            progress: 0.0,
            epochs_completed: 0,
            steps_completed: 0,
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Receives progress updates while a customization job is polled.
///
/// Reporting is best effort; implementations swallow (and log) their own
/// failures so a broken sink never fails the job.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, update: ProgressUpdate);
}

/// Reporter that drops every update.
pub struct NoProgress;

#[async_trait]
impl ProgressReporter for NoProgress {
    async fn report(&self, _update: ProgressUpdate) {}
}
