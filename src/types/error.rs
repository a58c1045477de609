//! Error types for dialog-sync
//!
//! Every failure is classified so the delivery policies can decide between
//! retrying, parking and giving up without inspecting error strings.

use hyper::StatusCode;

/// Main error type for synchronization operations
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Network failure, timeout or 5xx from an upstream service
    #[error("{service} unavailable: {message}")]
    Transient { service: &'static str, message: String },

    /// 409 / 412 / 422 from an upstream service, usually overlapping delivery
    #[error("{service} conflict ({status}): {body}")]
    Conflict {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// 400 and other non-retryable 4xx answers from an upstream service
    #[error("{service} rejected request ({status}): {body}")]
    Rejected {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("NATS error: {0}")]
    Nats(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// A state the reconciler treats as a logic defect, never a runtime condition
    #[error("Unreachable state: {0}")]
    Unreachable(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// How a delivery policy should treat a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry with backoff, no attempt limit
    Transient,
    /// Retry a bounded number of times, then park
    Conflict,
    /// Park immediately
    Permanent,
    /// Stop without retrying
    Cancelled,
    /// Logic defect; park and report loudly
    Unreachable,
}

impl SyncError {
    /// Build an error from a non-success upstream HTTP status
    pub fn from_status(service: &'static str, status: u16, body: String) -> Self {
        match status {
            409 | 412 | 422 => Self::Conflict {
                service,
                status,
                body,
            },
            408 | 429 | 500..=599 => Self::Transient {
                service,
                message: format!("HTTP {}: {}", status, body),
            },
            404 => Self::NotFound(format!("{} returned 404: {}", service, body)),
            _ => Self::Rejected {
                service,
                status,
                body,
            },
        }
    }

    /// Classify for retry decisions
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Transient { .. } | Self::Nats(_) | Self::Database(_) => ErrorClass::Transient,
            Self::Conflict { .. } => ErrorClass::Conflict,
            Self::Cancelled => ErrorClass::Cancelled,
            Self::BadRequest(_)
            | Self::NotFound(_)
            | Self::Rejected { .. }
            | Self::Config(_)
            | Self::Internal(_) => ErrorClass::Permanent,
            Self::Unreachable(_) => ErrorClass::Unreachable,
        }
    }

    /// Convert error to HTTP status code for the control surface
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Transient { .. } => StatusCode::BAD_GATEWAY,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Rejected { .. } => StatusCode::BAD_GATEWAY,
            Self::Nats(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unreachable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for SyncError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::from_status("upstream", status.as_u16(), err.to_string()),
            None => Self::Transient {
                service: "upstream",
                message: err.to_string(),
            },
        }
    }
}

impl From<async_nats::Error> for SyncError {
    fn from(err: async_nats::Error) -> Self {
        Self::Nats(err.to_string())
    }
}

impl From<mongodb::error::Error> for SyncError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Result type alias for synchronization operations
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            SyncError::from_status("dialogs", 412, String::new()).class(),
            ErrorClass::Conflict
        );
        assert_eq!(
            SyncError::from_status("dialogs", 422, String::new()).class(),
            ErrorClass::Conflict
        );
        assert_eq!(
            SyncError::from_status("origin", 503, String::new()).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            SyncError::from_status("origin", 429, String::new()).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            SyncError::from_status("dialogs", 400, "bad title".into()).class(),
            ErrorClass::Permanent
        );
        assert_eq!(SyncError::Cancelled.class(), ErrorClass::Cancelled);
    }

    #[test]
    fn test_unreachable_has_own_class() {
        let err = SyncError::Unreachable("Nothing to update".into());
        assert_eq!(err.class(), ErrorClass::Unreachable);
        assert_ne!(
            SyncError::Internal("io".into()).class(),
            ErrorClass::Unreachable
        );
    }

    #[test]
    fn test_control_surface_status() {
        assert_eq!(
            SyncError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SyncError::Database("down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
