//! Error types for the grant console.

use thiserror::Error;

use crate::request::{RequestId, RequestStatus};

/// Result type alias using the console error type.
pub type Result<T> = std::result::Result<T, ConsoleError>;

/// Main error type for the grant console.
#[derive(Error, Debug)]
pub enum ConsoleError {
    /// Submitted credentials were missing or did not match the configured operator
    #[error("Authentication required")]
    Unauthorized,

    /// Request not found
    #[error("Request not found: {0}")]
    RequestNotFound(RequestId),

    /// The request has no generated file, or the file is gone from disk
    #[error("No generated file for request {0}")]
    FileMissing(RequestId),

    /// The requested status change is not allowed from the current status
    #[error("Invalid state transition: request {id} is '{from}', cannot move to '{to}'")]
    InvalidTransition {
        id: RequestId,
        from: RequestStatus,
        to: RequestStatus,
    },

    /// Another delivery of the same request is still sending
    #[error("Delivery of request {0} is already in progress")]
    DeliveryInProgress(RequestId),

    /// The report generator failed; persisted state is unchanged
    #[error("Report generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// The mailer failed; persisted state is unchanged
    #[error("Delivery failed: {0}")]
    Send(#[from] SendError),

    /// Validation error (e.g. missing recipient, malformed form input)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database unavailable or write failed
    #[cfg(feature = "postgres")]
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failure reported by a [`ReportGenerator`](crate::generator::ReportGenerator).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct GenerationError {
    pub message: String,
}

impl GenerationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        Self::new(format!("Grant-Forge request failed: {e}"))
    }
}

impl From<std::io::Error> for GenerationError {
    fn from(e: std::io::Error) -> Self {
        Self::new(format!("Failed to write report: {e}"))
    }
}

/// Failure reported by a [`Mailer`](crate::mailer::Mailer).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SendError {
    pub message: String,
}

impl SendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl ConsoleError {
    /// True for failures of the generator or mailer, which the operator can retry by hand.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(self, ConsoleError::Generation(_) | ConsoleError::Send(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message_names_both_states() {
        let id = RequestId::from(uuid::Uuid::nil());
        let err = ConsoleError::InvalidTransition {
            id,
            from: RequestStatus::Delivered,
            to: RequestStatus::Running,
        };
        let msg = err.to_string();
        assert!(msg.contains("'delivered'"));
        assert!(msg.contains("'running'"));
    }

    #[test]
    fn test_collaborator_failures() {
        assert!(ConsoleError::from(GenerationError::new("boom")).is_collaborator_failure());
        assert!(ConsoleError::from(SendError::new("smtp down")).is_collaborator_failure());
        assert!(!ConsoleError::Unauthorized.is_collaborator_failure());
    }
}
