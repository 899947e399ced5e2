use std::fmt;
use std::time::Duration;

use crate::customizer::CustomizerError;
use crate::types::JobId;

/// Why a wait loop stopped without success.
#[derive(Debug, Clone)]
pub enum WaitError {
    /// Cancellation was requested. A normal termination, not a failure.
    Cancelled { run_id: JobId },

    /// The remote job reported `failed`.
    Failed { job_id: String, detail: String },

    /// The remote job is nominally running but could not get resources.
    ResourceExhausted { job_id: String },

    /// No forward progress within the configured window.
    StallTimeout {
        job_id: String,
        timeout: Duration,
        elapsed: Duration,
    },

    /// The remote job reported a status tag outside the known set.
    UnknownStatus { job_id: String, status: String },

    /// The customized model never appeared in the deployment registry.
    SyncTimeout { model: String, timeout: Duration },

    /// A remote call failed.
    Remote(CustomizerError),

    /// The cancellation store could not be read.
    Gate(String),
}

impl WaitError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled { run_id } => write!(f, "Job {} was cancelled", run_id),
            Self::Failed { job_id, detail } => write!(f, "Job {} failed: {}", job_id, detail),
            Self::ResourceExhausted { job_id } => {
                write!(f, "Job {} failed due to insufficient resources", job_id)
            }
            Self::StallTimeout {
                job_id,
                timeout,
                elapsed,
            } => write!(
                f,
                "Job {} stalled for more than {} seconds (no progress for {:.1}s)",
                job_id,
                timeout.as_secs(),
                elapsed.as_secs_f64()
            ),
            Self::UnknownStatus { job_id, status } => {
                write!(f, "Job {} reported unknown status '{}'", job_id, status)
            }
            Self::SyncTimeout { model, timeout } => write!(
                f,
                "Model {} did not sync within {} seconds",
                model,
                timeout.as_secs()
            ),
            Self::Remote(err) => write!(f, "{}", err),
            Self::Gate(msg) => write!(f, "Failed to read cancellation state: {}", msg),
        }
    }
}

impl std::error::Error for WaitError {}

impl From<CustomizerError> for WaitError {
    fn from(err: CustomizerError) -> Self {
        Self::Remote(err)
    }
}
