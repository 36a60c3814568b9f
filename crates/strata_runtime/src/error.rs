//! Task error taxonomy.
//!
//! Every error raised while processing a tuple reaches the processor's
//! lifecycle listener exactly once. A cache miss is not an error and has
//! no variant here; see [`crate::cache::CacheMiss`].

use strata_core::CoreError;
use strata_storage::StorageError;

/// Task result type
pub type TaskResult<T> = Result<T, TaskError>;

/// Errors raised while instantiating, running or binding a task
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Template and inputs do not fit together; fatal before execution
    #[error("Configuration error in `{task}`: {reason}")]
    Configuration {
        /// Template or task run name
        task: String,
        /// What is inconsistent
        reason: String,
    },

    /// Script body could not be rendered
    #[error("Cannot render script of `{task}`: {reason}")]
    Render {
        /// Task run name
        task: String,
        /// Why rendering failed
        reason: String,
    },

    /// Exit status outside the accepted set
    #[error("Task `{task}` terminated with exit status {exit_code}")]
    InvalidExit {
        /// Task run name
        task: String,
        /// Observed exit status
        exit_code: i32,
    },

    /// A required output resolved to nothing
    #[error("Missing output `{output}` of task `{task}`: nothing matched `{pattern}`")]
    MissingOutput {
        /// Task run name
        task: String,
        /// Output parameter name
        output: String,
        /// Pattern or expression evaluated
        pattern: String,
    },

    /// Launcher failure, propagated unchanged
    #[error(transparent)]
    Launch(#[from] LaunchFailure),

    /// Work folder or marker IO failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Value encoding failure
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Broken internal invariant
    #[error("Internal error: {message}")]
    Internal {
        /// Description
        message: String,
    },
}

impl TaskError {
    /// Build a configuration error
    pub fn configuration(task: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            task: task.into(),
            reason: reason.into(),
        }
    }

    /// Build a render error
    pub fn render(task: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Render {
            task: task.into(),
            reason: reason.into(),
        }
    }
}

/// Unrecoverable error from the launcher collaborator
#[derive(Debug, thiserror::Error)]
#[error("Failed to launch task `{task}`: {reason}")]
pub struct LaunchFailure {
    /// Task run name
    pub task: String,
    /// Human readable reason
    pub reason: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl LaunchFailure {
    /// Create a launch failure
    pub fn new(task: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Attach an underlying cause
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_invalid_exit_display() {
        let err = TaskError::InvalidExit {
            task: "align (2)".to_string(),
            exit_code: 1,
        };
        assert_eq!(err.to_string(), "Task `align (2)` terminated with exit status 1");
    }

    #[test]
    fn test_launch_failure_is_transparent() {
        let failure = LaunchFailure::new("align (1)", "bash not found");
        let expected = failure.to_string();
        let err = TaskError::from(failure);
        assert_eq!(err.to_string(), expected);
        assert!(matches!(err, TaskError::Launch(_)));
    }

    #[test]
    fn test_launch_failure_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let failure = LaunchFailure::new("t", "spawn failed").with_source(io);
        assert!(failure.source().is_some());
    }

    #[test]
    fn test_configuration_helper() {
        let err = TaskError::configuration("align", "expected 2 inputs, got 1");
        assert!(err.to_string().contains("expected 2 inputs"));
    }
}
