//! Errors raised by the customization service client.

use std::fmt;

/// A failed call to the customization or NIM service.
///
/// None of these are retried; the caller's current step fails.
#[derive(Debug, Clone)]
pub enum CustomizerError {
    /// The service answered with a non-success status code.
    RemoteService {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The request never produced a response (connect, timeout, TLS).
    Transport {
        operation: &'static str,
        message: String,
    },

    /// The response body did not have the expected shape.
    Decode {
        operation: &'static str,
        message: String,
    },

    /// A model could not be verified before deleting it.
    ModelUnavailable {
        model: String,
        source: Box<CustomizerError>,
    },
}

impl CustomizerError {
    /// HTTP status of the failed response, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteService { status, .. } => Some(*status),
            Self::ModelUnavailable { source, .. } => source.status(),
            _ => None,
        }
    }
}

impl fmt::Display for CustomizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoteService {
                operation,
                status,
                body,
            } => write!(
                f,
                "Failed to {}. Status: {}, Response: {}",
                operation, status, body
            ),
            Self::Transport { operation, message } => {
                write!(f, "Failed to {}: {}", operation, message)
            }
            Self::Decode { operation, message } => {
                write!(f, "Unexpected response while trying to {}: {}", operation, message)
            }
            Self::ModelUnavailable { model, source } => {
                write!(f, "Model {} not found or cannot be accessed: {}", model, source)
            }
        }
    }
}

impl std::error::Error for CustomizerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_status_and_body() {
        let err = CustomizerError::RemoteService {
            operation: "get job status",
            status: 503,
            body: "upstream unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to get job status. Status: 503, Response: upstream unavailable"
        );
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn test_model_unavailable_wraps_source() {
        let err = CustomizerError::ModelUnavailable {
            model: "dfwbp/customized-a".to_string(),
            source: Box::new(CustomizerError::RemoteService {
                operation: "get model info",
                status: 404,
                body: "not found".to_string(),
            }),
        };
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().starts_with("Model dfwbp/customized-a not found"));
    }
}
