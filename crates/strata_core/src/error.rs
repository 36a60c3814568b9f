//! Core error types for STRATA.

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Value cannot be canonically encoded
    #[error("Invalid encoding: {reason}")]
    InvalidEncoding {
        /// Encoder message
        reason: String,
    },

    /// Invalid hash format
    #[error("Invalid hash: {reason}")]
    InvalidHash {
        /// What was wrong with the input
        reason: String,
    },

    /// Invalid ID format
    #[error("Invalid ID: {reason}")]
    InvalidId {
        /// What was wrong with the input
        reason: String,
    },

    /// Value has the wrong shape for where it is used
    #[error("Type mismatch for {field}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Field or parameter name
        field: String,
        /// Expected kind
        expected: String,
        /// Actual kind
        actual: String,
    },

    /// Validation error
    #[error("Validation failed for {field}: {reason}")]
    Validation {
        /// Field being validated
        field: String,
        /// Why it failed
        reason: String,
    },
}

impl From<postcard::Error> for CoreError {
    fn from(err: postcard::Error) -> Self {
        Self::InvalidEncoding {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidEncoding {
            reason: err.to_string(),
        }
    }
}
