//! One task body: instantiate, look up, execute, publish.

use crate::cache::{CacheLookup, CacheValidator};
use crate::context::{Environment, ExecutionContext};
use crate::error::{TaskError, TaskResult};
use crate::gate::{ExecutionGate, Launcher};
use crate::instantiate::Instantiator;
use crate::lifecycle::LifecycleListener;
use crate::monitor::ProcessorStats;
use crate::outputs::{OutputBinder, OutputPort, OutputResolver};
use crate::render::ScriptRenderer;
use crate::run::{TaskRun, TaskStatus};
use crate::session::Session;
use crate::template::TaskTemplate;
use std::sync::Arc;
use strata_core::{CacheKey, Value};
use tracing::Instrument;

/// Everything a task body needs, shared by all bodies of one processor
pub(crate) struct TaskWorker {
    pub(crate) template: Arc<TaskTemplate>,
    pub(crate) session: Arc<Session>,
    pub(crate) launcher: Arc<dyn Launcher>,
    pub(crate) listener: Arc<dyn LifecycleListener>,
    pub(crate) ports: Vec<OutputPort>,
    pub(crate) stats: Arc<ProcessorStats>,
}

impl TaskWorker {
    /// Process one tuple. Returns the halt verdict.
    pub(crate) async fn process(&self, index: u64, tuple: Vec<Value>) -> bool {
        let span = tracing::info_span!("task", name = %self.template.name(), index);
        self.process_inner(index, tuple).instrument(span).await
    }

    async fn process_inner(&self, index: u64, tuple: Vec<Value>) -> bool {
        let mut ctx = ExecutionContext::new(self.template.name(), self.session.id());

        let (mut run, env) = match Instantiator::instantiate(&self.template, index, tuple) {
            Ok(instance) => instance,
            Err(e) => return self.fail(&ctx, &e, None),
        };
        ctx.enter_task(&run);
        self.listener.before_run(&ctx, &run);

        let outcome = self.execute(&ctx, &mut run, &env).await;
        run.terminate();

        let halt = match outcome {
            Ok(()) => {
                self.stats.record_completion(run.cached());
                self.listener.after_run(&ctx, &run);
                false
            }
            Err(e) => self.fail(&ctx, &e, Some(&run)),
        };
        ctx.clear_task();
        halt
    }

    async fn execute(&self, ctx: &ExecutionContext, run: &mut TaskRun, env: &Environment) -> TaskResult<()> {
        let script = ScriptRenderer::render(self.template.code(), env, run.name())?;
        let key = CacheKey::compute(
            self.session.id(),
            &script,
            run.inputs().iter().map(|(name, value)| (name.as_str(), value)),
        )?;
        run.set_script(script);
        run.set_cache_key(key);
        run.advance(TaskStatus::Running)?;

        let _guard = self.session.locks().lock(key).await;

        if self.session.cacheable() && self.template.cacheable() {
            let allocator = self.session.allocator().clone();
            let template = Arc::clone(&self.template);
            let (snapshot, bindings) = (run.clone(), env.clone());
            let lookup = blocking(run.name(), move || {
                CacheValidator::lookup(&allocator, &key, &template, &snapshot, &bindings)
            });
            match lookup.await? {
                CacheLookup::Hit {
                    folder,
                    exit_code,
                    outputs,
                } => {
                    tracing::info!(key = %key.short(), attempt = folder.attempt, "cached");
                    run.set_work_dir(folder.path);
                    run.set_exit_code(exit_code);
                    run.mark_cached();
                    OutputBinder::publish(run, outputs, &self.ports);
                    return Ok(());
                }
                CacheLookup::Miss(reason) => {
                    tracing::debug!(key = %key.short(), %reason, "cache miss");
                }
            }
        }

        let allocator = self.session.allocator().clone();
        let folder = blocking(run.name(), move || Ok(allocator.claim(&key)?)).await?;
        let exit_code = ExecutionGate::execute(self.launcher.as_ref(), ctx, &self.template, run, &folder).await?;

        let template = Arc::clone(&self.template);
        let (snapshot, bindings, path) = (run.clone(), env.clone(), folder.path.clone());
        let outputs = blocking(run.name(), move || {
            OutputResolver::resolve(&template, &snapshot, &bindings, &path)
        })
        .await?;
        OutputBinder::publish(run, outputs, &self.ports);

        tracing::info!(key = %key.short(), exit_code, "completed");
        Ok(())
    }

    fn fail(&self, ctx: &ExecutionContext, error: &TaskError, run: Option<&TaskRun>) -> bool {
        self.stats.record_failure();
        self.listener.on_exception(ctx, error, run)
    }
}

/// Run filesystem work for `task` on the blocking pool
pub(crate) async fn blocking<T, F>(task: &str, work: F) -> TaskResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> TaskResult<T> + Send + 'static,
{
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(work)).await.map_err(|e| TaskError::Internal {
        message: format!("filesystem work for `{}` did not finish: {}", task, e),
    })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blocking_work_leaves_the_runtime_thread() {
        let caller = std::thread::current().id();
        let worker = blocking("t (1)", || Ok(std::thread::current().id())).await.unwrap();
        assert_ne!(worker, caller);
    }

    #[tokio::test]
    async fn test_blocking_work_reports_errors() {
        let err = blocking::<(), _>("t (1)", || Err(TaskError::configuration("t", "bad")))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Configuration { .. }));

        let err = blocking::<(), _>("t (1)", || panic!("disk on fire")).await.unwrap_err();
        assert!(err.to_string().contains("t (1)"));
    }
}
