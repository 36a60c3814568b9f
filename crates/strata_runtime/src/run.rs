//! Mutable per-tuple task runs.

use crate::error::{TaskError, TaskResult};
use indexmap::IndexMap;
use std::fmt;
use std::path::{Path, PathBuf};
use strata_core::{CacheKey, TaskRunId, Value};

/// Lifecycle status of a task run. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskStatus {
    /// Instantiated, not yet started
    New,
    /// Executing or being looked up in the cache
    Running,
    /// Finished, successfully or not
    Terminated,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Running => write!(f, "RUNNING"),
            Self::Terminated => write!(f, "TERMINATED"),
        }
    }
}

/// One execution of a template on one input tuple
#[derive(Debug, Clone)]
pub struct TaskRun {
    id: TaskRunId,
    index: u64,
    name: String,
    inputs: IndexMap<String, Value>,
    staged: Vec<PathBuf>,
    outputs: IndexMap<String, Option<Value>>,
    script: Option<String>,
    work_dir: Option<PathBuf>,
    cache_key: Option<CacheKey>,
    exit_code: Option<i32>,
    cached: bool,
    status: TaskStatus,
}

impl TaskRun {
    /// Create a run of `template` with 1-based `index`
    pub fn new(template: &str, index: u64) -> Self {
        Self {
            id: TaskRunId::new(),
            index,
            name: format!("{} ({})", template, index),
            inputs: IndexMap::new(),
            staged: Vec::new(),
            outputs: IndexMap::new(),
            script: None,
            work_dir: None,
            cache_key: None,
            exit_code: None,
            cached: false,
            status: TaskStatus::New,
        }
    }

    /// Run identifier
    #[must_use]
    pub const fn id(&self) -> TaskRunId {
        self.id
    }

    /// Index within the processor
    #[must_use]
    pub const fn index(&self) -> u64 {
        self.index
    }

    /// Display name, `"<template> (<index>)"`
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Input bindings in declaration order
    #[must_use]
    pub fn inputs(&self) -> &IndexMap<String, Value> {
        &self.inputs
    }

    /// Paths bound to `file` inputs, in declaration order.
    ///
    /// These are the only inputs a launcher links into the work folder.
    #[must_use]
    pub fn staged_files(&self) -> &[PathBuf] {
        &self.staged
    }

    /// Output slots in declaration order; `None` until bound
    #[must_use]
    pub fn outputs(&self) -> &IndexMap<String, Option<Value>> {
        &self.outputs
    }

    /// Rendered script
    #[must_use]
    pub fn script(&self) -> Option<&str> {
        self.script.as_deref()
    }

    /// Work folder
    #[must_use]
    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }

    /// Cache key
    #[must_use]
    pub const fn cache_key(&self) -> Option<CacheKey> {
        self.cache_key
    }

    /// Exit status, once known
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Whether the outputs came from a previous run
    #[must_use]
    pub const fn cached(&self) -> bool {
        self.cached
    }

    /// Current status
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    pub(crate) fn bind_input(&mut self, name: impl Into<String>, value: Value) {
        self.inputs.insert(name.into(), value);
    }

    pub(crate) fn stage_file(&mut self, path: PathBuf) {
        self.staged.push(path);
    }

    pub(crate) fn declare_output(&mut self, name: impl Into<String>) {
        self.outputs.insert(name.into(), None);
    }

    pub(crate) fn bind_output(&mut self, name: &str, value: Option<Value>) {
        if let Some(slot) = self.outputs.get_mut(name) {
            *slot = value;
        }
    }

    pub(crate) fn set_script(&mut self, script: String) {
        self.script = Some(script);
    }

    pub(crate) fn set_work_dir(&mut self, path: PathBuf) {
        self.work_dir = Some(path);
    }

    pub(crate) fn set_cache_key(&mut self, key: CacheKey) {
        self.cache_key = Some(key);
    }

    pub(crate) fn set_exit_code(&mut self, code: i32) {
        self.exit_code = Some(code);
    }

    pub(crate) fn mark_cached(&mut self) {
        self.cached = true;
    }

    /// Move to `next`
    ///
    /// # Errors
    ///
    /// Returns an internal error unless `next` follows the current status.
    /// Re-entering the current status is rejected as well.
    pub fn advance(&mut self, next: TaskStatus) -> TaskResult<()> {
        if next <= self.status {
            return Err(TaskError::Internal {
                message: format!("task `{}` cannot move from {} to {}", self.name, self.status, next),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Mark the run as finished
    pub fn terminate(&mut self) {
        self.status = TaskStatus::Terminated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_and_index() {
        let run = TaskRun::new("align", 7);
        assert_eq!(run.name(), "align (7)");
        assert_eq!(run.index(), 7);
        assert_eq!(run.status(), TaskStatus::New);
        assert!(!run.cached());
    }

    #[test]
    fn test_status_moves_forward_only() {
        let mut run = TaskRun::new("t", 1);
        run.advance(TaskStatus::Running).unwrap();
        run.terminate();
        let err = run.advance(TaskStatus::Running).unwrap_err();
        assert!(matches!(err, TaskError::Internal { .. }));
        assert_eq!(run.status(), TaskStatus::Terminated);
    }

    #[test]
    fn test_status_cannot_be_reentered() {
        let mut run = TaskRun::new("t", 1);
        assert!(run.advance(TaskStatus::New).is_err());
        run.advance(TaskStatus::Running).unwrap();
        let err = run.advance(TaskStatus::Running).unwrap_err();
        assert!(err.to_string().contains("RUNNING to RUNNING"));
        assert_eq!(run.status(), TaskStatus::Running);
    }

    #[test]
    fn test_output_slots() {
        let mut run = TaskRun::new("t", 1);
        run.declare_output("b");
        run.declare_output("a");
        run.bind_output("a", Some(Value::Int(1)));
        run.bind_output("undeclared", Some(Value::Int(2)));

        let slots: Vec<_> = run.outputs().iter().collect();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0], (&"b".to_string(), &None));
        assert_eq!(slots[1].1, &Some(Value::Int(1)));
    }

    #[test]
    fn test_distinct_ids() {
        assert_ne!(TaskRun::new("t", 1).id(), TaskRun::new("t", 1).id());
    }
}
