//! Error types for the sync protocol.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while interpreting protocol values.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Unknown entity type name.
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    /// Unknown operation name.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Unknown conflict strategy name.
    #[error("unknown conflict strategy: {0}")]
    UnknownStrategy(String),

    /// A timestamp could not be parsed.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// A pull continuation cursor could not be parsed.
    #[error("invalid pull cursor: {0}")]
    InvalidCursor(String),

    /// A record payload was not a JSON object.
    #[error("record must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::UnknownStrategy("random".into());
        assert_eq!(err.to_string(), "unknown conflict strategy: random");

        let err = ProtocolError::NotAnObject("array");
        assert!(err.to_string().contains("array"));
    }
}
