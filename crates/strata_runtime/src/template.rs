//! Immutable task templates.
//!
//! A template is built once when the pipeline is defined and shared by
//! every task run of its processor.

use crate::context::Environment;
use crate::error::{TaskError, TaskResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use strata_core::Value;
use strata_storage::GlobPattern;

/// Kind of an input parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// Plain value, exposed to the script by name
    Value,
    /// File or list of files
    File,
    /// Collection bound as a list
    Repeated,
}

impl ParamKind {
    /// Whether values of this kind are visible to the script renderer
    #[must_use]
    pub const fn exposes_to_script(&self) -> bool {
        matches!(self, Self::Value)
    }
}

/// Input parameter declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputParam {
    /// Parameter name
    pub name: String,
    /// Parameter kind
    pub kind: ParamKind,
}

impl InputParam {
    /// `value` parameter
    pub fn value(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Value,
        }
    }

    /// `file` parameter
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::File,
        }
    }

    /// `repeated` parameter
    pub fn repeated(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Repeated,
        }
    }
}

/// How an output is resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Glob pattern rooted at the work folder
    File(String),
    /// Expression evaluated against the task environment
    Value(String),
}

/// Output parameter declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputParam {
    /// Parameter name
    pub name: String,
    /// Resolution rule
    pub kind: OutputKind,
    /// Resolving to nothing is not an error
    #[serde(default)]
    pub optional: bool,
    /// Let file patterns match staged input files
    #[serde(default)]
    pub include_inputs: bool,
}

impl OutputParam {
    /// File output matching `pattern`
    pub fn file(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: OutputKind::File(pattern.into()),
            optional: false,
            include_inputs: false,
        }
    }

    /// Value output evaluating `expr`
    pub fn value(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: OutputKind::Value(expr.into()),
            optional: false,
            include_inputs: false,
        }
    }

    /// Mark as optional
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Allow matching staged inputs
    #[must_use]
    pub fn including_inputs(mut self) -> Self {
        self.include_inputs = true;
        self
    }

    /// Pattern or expression text
    #[must_use]
    pub fn source(&self) -> &str {
        match &self.kind {
            OutputKind::File(pattern) => pattern,
            OutputKind::Value(expr) => expr,
        }
    }
}

/// Script produced directly from the environment
pub type ScriptFn = Arc<dyn Fn(&Environment) -> TaskResult<Value> + Send + Sync>;

/// Task code body
#[derive(Clone)]
pub enum Code {
    /// Template text with `$name` / `${name}` placeholders
    Template(String),
    /// Closure evaluated against the environment
    Closure(ScriptFn),
}

impl Code {
    /// Code from a closure
    pub fn closure<F>(f: F) -> Self
    where
        F: Fn(&Environment) -> TaskResult<Value> + Send + Sync + 'static,
    {
        Self::Closure(Arc::new(f))
    }
}

impl std::fmt::Debug for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Template(text) => f.debug_tuple("Template").field(text).finish(),
            Self::Closure(_) => f.write_str("Closure(..)"),
        }
    }
}

impl From<&str> for Code {
    fn from(text: &str) -> Self {
        Self::Template(text.to_string())
    }
}

impl From<String> for Code {
    fn from(text: String) -> Self {
        Self::Template(text)
    }
}

impl<'de> Deserialize<'de> for Code {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::Template)
    }
}

fn default_exit_codes() -> BTreeSet<i32> {
    BTreeSet::from([0])
}

fn default_cacheable() -> bool {
    true
}

fn default_max_forks() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

/// Immutable per-stage task definition
#[derive(Debug, Clone, Deserialize)]
pub struct TaskTemplate {
    name: String,
    #[serde(default)]
    inputs: Vec<InputParam>,
    #[serde(default)]
    outputs: Vec<OutputParam>,
    #[serde(default = "default_exit_codes")]
    exit_codes: BTreeSet<i32>,
    #[serde(default = "default_cacheable")]
    cacheable: bool,
    #[serde(default = "default_max_forks")]
    max_forks: usize,
    code: Code,
}

impl TaskTemplate {
    /// Create a template with default policy: exit codes `{0}`, cacheable,
    /// `max_forks` equal to the available parallelism
    pub fn new(name: impl Into<String>, code: impl Into<Code>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            exit_codes: default_exit_codes(),
            cacheable: true,
            max_forks: default_max_forks(),
            code: code.into(),
        }
    }

    /// Append an input declaration
    #[must_use]
    pub fn with_input(mut self, param: InputParam) -> Self {
        self.inputs.push(param);
        self
    }

    /// Append an output declaration
    #[must_use]
    pub fn with_output(mut self, param: OutputParam) -> Self {
        self.outputs.push(param);
        self
    }

    /// Replace the accepted exit-code set
    #[must_use]
    pub fn with_exit_codes(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.exit_codes = codes.into_iter().collect();
        self
    }

    /// Set the template-level cacheable flag
    #[must_use]
    pub fn with_cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    /// Set the concurrency bound
    #[must_use]
    pub fn with_max_forks(mut self, max_forks: usize) -> Self {
        self.max_forks = max_forks;
        self
    }

    /// Template name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Input declarations, in order
    #[must_use]
    pub fn inputs(&self) -> &[InputParam] {
        &self.inputs
    }

    /// Output declarations, in order
    #[must_use]
    pub fn outputs(&self) -> &[OutputParam] {
        &self.outputs
    }

    /// Accepted exit codes
    #[must_use]
    pub fn exit_codes(&self) -> &BTreeSet<i32> {
        &self.exit_codes
    }

    /// Whether `code` is an accepted exit status
    #[must_use]
    pub fn accepts(&self, code: i32) -> bool {
        self.exit_codes.contains(&code)
    }

    /// Template-level cacheable flag
    #[must_use]
    pub const fn cacheable(&self) -> bool {
        self.cacheable
    }

    /// Concurrency bound
    #[must_use]
    pub const fn max_forks(&self) -> usize {
        self.max_forks
    }

    /// Code body
    #[must_use]
    pub fn code(&self) -> &Code {
        &self.code
    }

    /// Check the template is internally consistent
    ///
    /// # Errors
    ///
    /// Returns a configuration error for duplicate parameter names, an
    /// empty exit-code set, a zero concurrency bound or an invalid output
    /// pattern
    pub fn validate(&self) -> TaskResult<()> {
        let fail = |reason: String| Err(TaskError::configuration(&self.name, reason));

        if self.exit_codes.is_empty() {
            return fail("accepted exit-code set is empty".to_string());
        }
        if self.max_forks == 0 {
            return fail("max_forks must be at least 1".to_string());
        }

        let mut seen = BTreeSet::new();
        for name in self.inputs.iter().map(|p| &p.name) {
            if !seen.insert(name) {
                return fail(format!("duplicate input `{}`", name));
            }
        }
        let mut seen = BTreeSet::new();
        for output in &self.outputs {
            if !seen.insert(&output.name) {
                return fail(format!("duplicate output `{}`", output.name));
            }
            if let OutputKind::File(pattern) = &output.kind {
                if let Err(e) = GlobPattern::new(pattern) {
                    return fail(format!("output `{}`: {}", output.name, e));
                }
            }
        }
        Ok(())
    }
}
