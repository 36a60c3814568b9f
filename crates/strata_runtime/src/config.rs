//! Session configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What the session does with a task failure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    /// Halt the processor that raised it
    #[default]
    Terminate,
    /// Log and keep processing
    Ignore,
}

/// Session-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Root of all work folders
    pub work_dir: PathBuf,
    /// Session-level cache toggle
    pub cacheable: bool,
    /// Failure policy
    pub error_strategy: ErrorStrategy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("work"),
            cacheable: true,
            error_strategy: ErrorStrategy::Terminate,
        }
    }
}

impl SessionConfig {
    /// Set the work directory root
    #[must_use]
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Set the session-level cache toggle
    #[must_use]
    pub fn with_cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    /// Set the failure policy
    #[must_use]
    pub fn with_error_strategy(mut self, strategy: ErrorStrategy) -> Self {
        self.error_strategy = strategy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.work_dir, PathBuf::from("work"));
        assert!(config.cacheable);
        assert_eq!(config.error_strategy, ErrorStrategy::Terminate);
    }

    #[test]
    fn test_partial_json() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"cacheable": false, "error_strategy": "ignore"}"#).unwrap();
        assert!(!config.cacheable);
        assert_eq!(config.error_strategy, ErrorStrategy::Ignore);
        assert_eq!(config.work_dir, PathBuf::from("work"));
    }
}
