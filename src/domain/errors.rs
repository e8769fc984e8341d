//! Domain errors for almsync.
//!
//! Every adapter failure is classified into one of these variants before it
//! reaches the contract boundary, where it is folded into an
//! [`OperationResult`](crate::domain::models::envelope::OperationResult).

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur while talking to an ALM backend.
#[derive(Debug, Error)]
pub enum AlmError {
    /// Missing or invalid adapter configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Credentials were rejected by the backend.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Network failure or timeout.
    #[error("Connection error: {0}")]
    Connection(String),

    /// No connection could be established, so the request was never sent.
    #[error("Connection error: could not connect: {0}")]
    Unreachable(String),

    /// The remote item or project does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller input is malformed (missing project, bad mapping, bad id).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The backend answered with an unexpected HTTP status.
    #[error("Remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    /// The backend answered with a payload we could not understand.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A batch finished but some records failed.
    #[error("{failed} of {total} records failed to sync")]
    PartialBatchFailure { failed: usize, total: usize },
}

/// Result alias used throughout the crate.
pub type AlmResult<T> = Result<T, AlmError>;

impl AlmError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: StatusCode, body: impl Into<String>) -> Self {
        let message = body.into();
        match status.as_u16() {
            401 | 403 => Self::Authentication(format!("{status}: {message}")),
            404 => Self::NotFound(message),
            400 | 422 => Self::Validation(message),
            code => Self::Remote {
                status: code,
                message,
            },
        }
    }

    /// Returns true if the failure is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Unreachable(_) => true,
            Self::Remote { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns true if the backend cannot have acted on the request.
    pub fn is_unsent(&self) -> bool {
        matches!(
            self,
            Self::Unreachable(_) | Self::Remote { status: 429, .. }
        )
    }
}

impl From<reqwest::Error> for AlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Protocol(err.to_string());
        }
        if let Some(status) = err.status() {
            return Self::from_status(status, err.to_string());
        }
        if err.is_builder() {
            return Self::Configuration(err.to_string());
        }
        if err.is_connect() {
            return Self::Unreachable(err.to_string());
        }
        Self::Connection(err.to_string())
    }
}

impl From<serde_json::Error> for AlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<quick_xml::Error> for AlmError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Protocol(format!("XML: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            AlmError::from_status(StatusCode::UNAUTHORIZED, "bad creds"),
            AlmError::Authentication(_)
        ));
        assert!(matches!(
            AlmError::from_status(StatusCode::FORBIDDEN, ""),
            AlmError::Authentication(_)
        ));
        assert!(matches!(
            AlmError::from_status(StatusCode::NOT_FOUND, "no such issue"),
            AlmError::NotFound(_)
        ));
        assert!(matches!(
            AlmError::from_status(StatusCode::BAD_REQUEST, "summary required"),
            AlmError::Validation(_)
        ));
        assert!(matches!(
            AlmError::from_status(StatusCode::BAD_GATEWAY, ""),
            AlmError::Remote { status: 502, .. }
        ));
    }

    #[test]
    fn test_transient_errors() {
        assert!(AlmError::Connection("reset".into()).is_transient());
        assert!(AlmError::Remote {
            status: 503,
            message: String::new()
        }
        .is_transient());
        assert!(AlmError::Remote {
            status: 429,
            message: String::new()
        }
        .is_transient());
    }

    #[test]
    fn test_unsent_errors() {
        assert!(AlmError::Unreachable("refused".into()).is_transient());
        assert!(AlmError::Unreachable("refused".into()).is_unsent());
        assert!(AlmError::Remote {
            status: 429,
            message: String::new()
        }
        .is_unsent());
        assert!(!AlmError::Connection("timed out".into()).is_unsent());
        assert!(!AlmError::Remote {
            status: 503,
            message: String::new()
        }
        .is_unsent());
    }

    #[test]
    fn test_permanent_errors() {
        assert!(!AlmError::Configuration("x".into()).is_transient());
        assert!(!AlmError::Authentication("x".into()).is_transient());
        assert!(!AlmError::NotFound("x".into()).is_transient());
        assert!(!AlmError::Validation("x".into()).is_transient());
        assert!(!AlmError::Remote {
            status: 409,
            message: String::new()
        }
        .is_transient());
    }

    #[test]
    fn test_partial_batch_message() {
        let err = AlmError::PartialBatchFailure { failed: 1, total: 3 };
        assert_eq!(err.to_string(), "1 of 3 records failed to sync");
    }
}
