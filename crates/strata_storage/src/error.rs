//! Storage error types.

use std::path::PathBuf;

/// Storage result type
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage error
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem operation failed
    #[error("IO error at {}: {source}", path.display())]
    Io {
        /// Path being operated on
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Output pattern could not be compiled
    #[error("Invalid pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// Pattern as written
        pattern: String,
        /// What is wrong with it
        reason: String,
    },

    /// Every folder along a key's attempt chain is taken
    #[error("No free work folder for key {key} after {attempts} attempts")]
    AttemptsExhausted {
        /// Base cache key
        key: String,
        /// Attempts made
        attempts: u32,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
