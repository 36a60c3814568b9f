//! Evaluation environment and execution context.

use crate::run::TaskRun;
use indexmap::IndexMap;
use strata_core::{SessionId, TaskRunId, Value};

/// Typed name → value bindings visible to the script renderer.
///
/// Built once per task run, before rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    vars: IndexMap<String, Value>,
}

impl Environment {
    /// Create an empty environment
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, replacing any previous binding
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Look up `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Whether `name` is bound
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Bindings in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of bindings
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether there are no bindings
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Diagnostic context threaded through one processor's call chain.
///
/// Carries the "current task" for log and error attribution. Each task
/// body owns its own copy; nothing synchronizes on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Processor (template) name
    pub processor: String,
    /// Owning session
    pub session: SessionId,
    /// Task currently executing on this body, if any
    pub task: Option<CurrentTask>,
}

/// Identity of the task a context is attributed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentTask {
    /// Run identifier
    pub id: TaskRunId,
    /// Index within the processor
    pub index: u64,
    /// Display name
    pub name: String,
}

impl ExecutionContext {
    /// Context of a processor with no task attached
    pub fn new(processor: impl Into<String>, session: SessionId) -> Self {
        Self {
            processor: processor.into(),
            session,
            task: None,
        }
    }

    /// Attribute this context to `run`
    pub fn enter_task(&mut self, run: &TaskRun) {
        self.task = Some(CurrentTask {
            id: run.id(),
            index: run.index(),
            name: run.name().to_string(),
        });
    }

    /// Drop the task attribution
    pub fn clear_task(&mut self) {
        self.task = None;
    }

    /// Name to attribute log lines to: the task, else the processor
    #[must_use]
    pub fn label(&self) -> &str {
        self.task.as_ref().map_or(&self.processor, |t| &t.name)
    }
}
