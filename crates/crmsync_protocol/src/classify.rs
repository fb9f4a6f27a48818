//! Transient/permanent failure classification.

use serde::{Deserialize, Serialize};

/// Whether a failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// Network, connection, lock-timeout or overload failures.
    Transient,
    /// Everything else: malformed data, validation, client errors.
    Permanent,
}

impl ErrorClass {
    /// Returns true for transient failures.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

/// Errors that know their retry class.
pub trait Classify {
    /// Returns the class of this error.
    fn class(&self) -> ErrorClass;
}

/// Classifies an HTTP status code.
///
/// 429, 502, 503 and 504 are transient. Any other status, including 500,
/// is permanent.
pub fn classify_http_status(status: u16) -> ErrorClass {
    match status {
        429 | 502 | 503 | 504 => ErrorClass::Transient,
        _ => ErrorClass::Permanent,
    }
}
