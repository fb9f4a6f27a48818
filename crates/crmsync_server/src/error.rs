//! Error types for the sync server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use crmsync_core::CoreError;
use crmsync_protocol::{classify_http_status, Classify, ErrorClass, ProtocolError};
use serde::Serialize;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Push batch larger than the configured maximum.
    #[error("batch too large: {size} changes, maximum is {max}")]
    BatchTooLarge {
        /// Number of changes sent.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Push batch rolled back because of per-change errors.
    #[error("batch rejected: {0} change(s) failed")]
    BatchRejected(usize),

    /// Entity store error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Protocol value could not be interpreted.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Upstream responded with an HTTP error status.
    #[error("upstream returned HTTP {status}: {message}")]
    Http {
        /// Status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code().as_u16())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Returns the HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_)
            | ServerError::BatchTooLarge { .. }
            | ServerError::BatchRejected(_)
            | ServerError::Protocol(_) => StatusCode::BAD_REQUEST,
            ServerError::Core(CoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ServerError::Core(err) if err.is_per_change() => StatusCode::BAD_REQUEST,
            ServerError::Core(_) | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Http { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }
}

impl Classify for ServerError {
    fn class(&self) -> ErrorClass {
        match self {
            ServerError::Core(err) => err.class(),
            ServerError::Http { status, .. } => classify_http_status(*status),
            _ => ErrorClass::Permanent,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmsync_protocol::{EntityId, EntityType};

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
        assert!(ServerError::BatchTooLarge { size: 600, max: 500 }.is_client_error());
    }

    #[test]
    fn core_errors_map_to_status() {
        let not_found = ServerError::from(CoreError::not_found(EntityType::Energy, EntityId::new(3)));
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let invalid = ServerError::from(CoreError::validation("name is required"));
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);

        let lost = ServerError::from(CoreError::connection_lost("reset"));
        assert_eq!(lost.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn retry_class() {
        assert!(ServerError::from(CoreError::lock_timeout("row")).class().is_transient());
        assert!(ServerError::Http { status: 503, message: String::new() }.class().is_transient());
        assert!(!ServerError::Http { status: 500, message: String::new() }.class().is_transient());
        assert!(!ServerError::BatchRejected(2).class().is_transient());
    }

    #[test]
    fn error_display() {
        let err = ServerError::BatchTooLarge { size: 600, max: 500 };
        let msg = err.to_string();
        assert!(msg.contains("600"));
        assert!(msg.contains("500"));
    }
}
