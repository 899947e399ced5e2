//! Errors returned by the job lifecycle operations.

use axum::http::StatusCode;
use std::fmt;

use crate::core::DispatchError;
use crate::types::JobId;

#[derive(Debug, Clone)]
pub enum JobError {
    /// No job with this id exists.
    NotFound(JobId),

    /// The job's current status does not allow the operation. Nothing was changed.
    Conflict(String),

    /// The request failed validation.
    InvalidRequest(String),

    /// The execution could not be handed to the dispatcher.
    Dispatch(String),

    /// Store or other infrastructure failure.
    Internal(String),
}

pub type JobResult<T> = Result<T, JobError>;

impl JobError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Dispatch(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "Job not found: {}", id),
            Self::Conflict(msg) => write!(f, "{}", msg),
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::Dispatch(msg) => write!(f, "Failed to dispatch job: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for JobError {}

impl From<anyhow::Error> for JobError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<DispatchError> for JobError {
    fn from(err: DispatchError) -> Self {
        Self::Dispatch(err.to_string())
    }
}
