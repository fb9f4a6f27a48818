//! Error types for the sync client.

use crmsync_protocol::{classify_http_status, Classify, EntityType, ErrorClass, ProtocolError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Server answered with an unexpected HTTP status.
    #[error("server returned HTTP {status}: {message}")]
    Http {
        /// Status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Server rolled back a push because some changes were invalid.
    #[error("push rejected: {failed} change(s) failed")]
    Rejected {
        /// Number of failed changes.
        failed: usize,
    },

    /// Protocol value could not be interpreted.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// A local record was not found.
    #[error("{entity_type} record {key} not found locally")]
    RecordNotFound {
        /// Entity type.
        entity_type: EntityType,
        /// ID or client ID looked up.
        key: String,
    },

    /// Local store failure.
    #[error("store error: {0}")]
    Store(String),

    /// Snapshot file could not be read or written.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Not connected.
    #[error("offline")]
    Offline,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a record not found error.
    pub fn record_not_found(entity_type: EntityType, key: impl ToString) -> Self {
        Self::RecordNotFound {
            entity_type,
            key: key.to_string(),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Codec(err.to_string())
    }
}

impl Classify for SyncError {
    fn class(&self) -> ErrorClass {
        match self {
            SyncError::Transport { retryable, .. } if *retryable => ErrorClass::Transient,
            SyncError::Http { status, .. } => classify_http_status(*status),
            SyncError::Offline => ErrorClass::Transient,
            _ => ErrorClass::Permanent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classes() {
        assert!(SyncError::transport_retryable("connection refused").class().is_transient());
        assert!(!SyncError::transport_fatal("bad certificate").class().is_transient());
        assert!(SyncError::Http { status: 429, message: String::new() }.class().is_transient());
        assert!(!SyncError::Http { status: 500, message: String::new() }.class().is_transient());
        assert!(!SyncError::Rejected { failed: 1 }.class().is_transient());
        assert!(SyncError::Offline.class().is_transient());
    }

    #[test]
    fn error_display() {
        let err = SyncError::record_not_found(EntityType::Contact, "c9");
        assert_eq!(err.to_string(), "contact record c9 not found locally");
        assert_eq!(SyncError::Offline.to_string(), "offline");
    }
}
