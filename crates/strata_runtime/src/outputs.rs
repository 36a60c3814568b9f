//! Output resolution and publication.
//!
//! Resolution only happens after a cache hit or a validated run. File
//! outputs are globbed inside the work folder; value outputs are evaluated
//! against the task environment.

use crate::context::Environment;
use crate::error::{TaskError, TaskResult};
use crate::render::ScriptRenderer;
use crate::run::TaskRun;
use crate::template::{OutputKind, OutputParam, TaskTemplate};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::Path;
use strata_core::Value;
use strata_storage::GlobPattern;
use tokio::sync::mpsc;

/// A resolved output; `None` for an optional output that matched nothing
#[derive(Debug, Clone, PartialEq)]
pub struct BoundOutput {
    /// Output parameter name
    pub name: String,
    /// Resolved value
    pub value: Option<Value>,
}

/// Resolves declared outputs of a finished run
pub struct OutputResolver;

impl OutputResolver {
    /// Resolve every declared output of `template`, in declared order
    ///
    /// # Errors
    ///
    /// Returns `MissingOutput` when a required output resolves to nothing,
    /// or the underlying error if a pattern or expression fails
    pub fn resolve(
        template: &TaskTemplate,
        run: &TaskRun,
        env: &Environment,
        folder: &Path,
    ) -> TaskResult<Vec<BoundOutput>> {
        let staged = staged_names(run);
        template
            .outputs()
            .iter()
            .map(|output| {
                let value = match &output.kind {
                    OutputKind::File(pattern) => resolve_files(output, pattern, folder, &staged)?,
                    OutputKind::Value(expr) => {
                        match ScriptRenderer::evaluate(expr, env, run.name())? {
                            Value::Null => None,
                            value => Some(value),
                        }
                    }
                };
                if value.is_none() && !output.optional {
                    return Err(TaskError::MissingOutput {
                        task: run.name().to_string(),
                        output: output.name.clone(),
                        pattern: output.source().to_string(),
                    });
                }
                Ok(BoundOutput {
                    name: output.name.clone(),
                    value,
                })
            })
            .collect()
    }
}

fn resolve_files(
    output: &OutputParam,
    pattern: &str,
    folder: &Path,
    staged: &BTreeSet<OsString>,
) -> TaskResult<Option<Value>> {
    let glob = GlobPattern::new(pattern)?;
    let mut found = glob.find(folder)?;
    if !output.include_inputs {
        found.retain(|path| {
            let top_level = path.parent() == Some(folder);
            !(top_level && path.file_name().is_some_and(|n| staged.contains(n)))
        });
    }

    let mut values: Vec<Value> = found.into_iter().map(Value::Path).collect();
    Ok(match values.len() {
        0 => None,
        1 => values.pop(),
        _ => Some(Value::List(values)),
    })
}

/// File names under which file inputs are staged in the work folder
fn staged_names(run: &TaskRun) -> BTreeSet<OsString> {
    run.staged_files()
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_os_string())
        .collect()
}

/// Fan-out sender feeding every downstream subscriber of one output
#[derive(Debug, Clone, Default)]
pub struct OutputPort {
    subscribers: Vec<mpsc::UnboundedSender<Value>>,
}

impl OutputPort {
    /// Create a port with no subscribers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a new downstream receiver
    pub fn connect(&mut self) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Subscribe an existing sender, e.g. one shared by several ports
    pub fn attach(&mut self, tx: mpsc::UnboundedSender<Value>) {
        self.subscribers.push(tx);
    }

    /// Send `value` to every subscriber still listening
    pub fn publish(&self, value: &Value) {
        for tx in &self.subscribers {
            // A dropped receiver only means nobody downstream is listening.
            let _ = tx.send(value.clone());
        }
    }
}

/// Binds resolved outputs onto a run and its ports
pub struct OutputBinder;

impl OutputBinder {
    /// Record `outputs` on `run` and publish them in declared order.
    ///
    /// `ports[i]` receives the `i`-th declared output. Unresolved optional
    /// outputs are skipped.
    pub fn publish(run: &mut TaskRun, outputs: Vec<BoundOutput>, ports: &[OutputPort]) {
        for (output, port) in outputs.into_iter().zip(ports) {
            if let Some(value) = &output.value {
                tracing::debug!(task = run.name(), output = %output.name, %value, "publishing output");
                port.publish(value);
            }
            run.bind_output(&output.name, output.value);
        }
    }
}
