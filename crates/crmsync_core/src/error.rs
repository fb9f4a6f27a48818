//! Error types for crmsync core.

use crmsync_protocol::{Classify, EntityId, EntityType, ErrorClass};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by entities and the entity repository.
///
/// `NotFound`, `Validation`, `TypeMismatch` and `InvalidOperation` concern
/// a single change. `ConnectionLost`, `LockTimeout` and `Storage` are
/// infrastructure failures that abort a whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Entity not found.
    #[error("{entity_type} {id} not found")]
    NotFound {
        /// Entity type searched.
        entity_type: EntityType,
        /// ID that was not found.
        id: EntityId,
    },

    /// Entity failed validation.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the problem.
        message: String,
    },

    /// A field had the wrong type.
    #[error("type mismatch: {message}")]
    TypeMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// The store connection was lost.
    #[error("connection lost: {message}")]
    ConnectionLost {
        /// Description of the failure.
        message: String,
    },

    /// A lock could not be acquired in time.
    #[error("lock wait timeout: {message}")]
    LockTimeout {
        /// Description of the failure.
        message: String,
    },

    /// A record read by the transaction changed before commit.
    #[error("transaction conflict on {entity_type} {id}")]
    TransactionConflict {
        /// Entity type.
        entity_type: EntityType,
        /// Entity ID.
        id: EntityId,
    },

    /// Any other storage failure.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(entity_type: EntityType, id: EntityId) -> Self {
        Self::NotFound { entity_type, id }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a connection lost error.
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost {
            message: message.into(),
        }
    }

    /// Creates a lock timeout error.
    pub fn lock_timeout(message: impl Into<String>) -> Self {
        Self::LockTimeout {
            message: message.into(),
        }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Returns true if this error concerns only the change being processed.
    pub fn is_per_change(&self) -> bool {
        matches!(
            self,
            CoreError::NotFound { .. }
                | CoreError::Validation { .. }
                | CoreError::TypeMismatch { .. }
                | CoreError::InvalidOperation { .. }
        )
    }
}

impl Classify for CoreError {
    fn class(&self) -> ErrorClass {
        match self {
            CoreError::ConnectionLost { .. }
            | CoreError::LockTimeout { .. }
            | CoreError::TransactionConflict { .. } => ErrorClass::Transient,
            _ => ErrorClass::Permanent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_change_split() {
        assert!(CoreError::not_found(EntityType::Customer, EntityId::new(1)).is_per_change());
        assert!(CoreError::validation("name is required").is_per_change());
        assert!(CoreError::type_mismatch("email").is_per_change());
        assert!(!CoreError::connection_lost("reset").is_per_change());
        assert!(!CoreError::storage("disk full").is_per_change());
    }

    #[test]
    fn classification() {
        assert!(CoreError::connection_lost("reset").class().is_transient());
        assert!(CoreError::lock_timeout("row 5").class().is_transient());
        let conflict = CoreError::TransactionConflict {
            entity_type: EntityType::Customer,
            id: EntityId::new(1),
        };
        assert!(conflict.class().is_transient());
        assert!(!conflict.is_per_change());
        assert!(!CoreError::storage("disk full").class().is_transient());
        assert!(!CoreError::validation("bad").class().is_transient());
    }

    #[test]
    fn display() {
        let err = CoreError::not_found(EntityType::Contact, EntityId::new(9));
        assert_eq!(err.to_string(), "contact 9 not found");
    }
}
