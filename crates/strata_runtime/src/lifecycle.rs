//! Lifecycle observation of a processor and its task runs.
//!
//! Passthrough hooks only ever see shared references and return nothing,
//! so an observer cannot alter the tuples or runs flowing through.

use crate::context::ExecutionContext;
use crate::error::TaskError;
use crate::run::TaskRun;
use crate::session::Session;
use std::sync::Arc;
use strata_core::Value;

/// Observer injected into a processor
pub trait LifecycleListener: Send + Sync {
    /// Processor is starting
    fn on_start(&self, _ctx: &ExecutionContext) {}

    /// Processor has drained and stopped
    fn on_stop(&self, _ctx: &ExecutionContext) {}

    /// An input tuple arrived
    fn on_message(&self, _ctx: &ExecutionContext, _values: &[Value]) {}

    /// A run is about to be rendered and executed
    fn before_run(&self, _ctx: &ExecutionContext, _run: &TaskRun) {}

    /// A run finished and its outputs were published
    fn after_run(&self, _ctx: &ExecutionContext, _run: &TaskRun) {}

    /// A run failed; returning `true` halts the processor.
    ///
    /// Called exactly once per failure.
    fn on_exception(&self, ctx: &ExecutionContext, error: &TaskError, run: Option<&TaskRun>) -> bool;
}

/// Bookkeeping performed after every successful run
pub trait Finalizer: Send + Sync {
    /// Finalize `run`
    fn finalize(&self, ctx: &ExecutionContext, run: &TaskRun);
}

/// Finalizer that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFinalizer;

impl Finalizer for NoopFinalizer {
    fn finalize(&self, _ctx: &ExecutionContext, _run: &TaskRun) {}
}

/// Default listener: logs, finalizes runs and defers failures to the
/// session's error handler
pub struct TaskInterceptor {
    session: Arc<Session>,
    finalizer: Arc<dyn Finalizer>,
}

impl TaskInterceptor {
    /// Create an interceptor bound to `session`
    #[must_use]
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            finalizer: Arc::new(NoopFinalizer),
        }
    }

    /// Replace the finalizer
    #[must_use]
    pub fn with_finalizer(mut self, finalizer: Arc<dyn Finalizer>) -> Self {
        self.finalizer = finalizer;
        self
    }
}

impl LifecycleListener for TaskInterceptor {
    fn on_start(&self, ctx: &ExecutionContext) {
        tracing::debug!(processor = %ctx.processor, session = %ctx.session, "processor started");
    }

    fn on_stop(&self, ctx: &ExecutionContext) {
        tracing::debug!(processor = %ctx.processor, failures = self.session.failures(), "processor stopped");
    }

    fn on_message(&self, ctx: &ExecutionContext, values: &[Value]) {
        tracing::trace!(processor = %ctx.processor, arity = values.len(), "tuple received");
    }

    fn before_run(&self, _ctx: &ExecutionContext, run: &TaskRun) {
        tracing::trace!(task = run.name(), "submitting");
    }

    fn after_run(&self, ctx: &ExecutionContext, run: &TaskRun) {
        self.finalizer.finalize(ctx, run);
    }

    fn on_exception(&self, ctx: &ExecutionContext, error: &TaskError, run: Option<&TaskRun>) -> bool {
        self.session.handle(ctx, error, run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<String>>);

    impl Finalizer for Recording {
        fn finalize(&self, _ctx: &ExecutionContext, run: &TaskRun) {
            self.0.lock().unwrap().push(run.name().to_string());
        }
    }

    #[test]
    fn test_after_run_finalizes() {
        let session = Arc::new(Session::new(SessionConfig::default()));
        let recording = Arc::new(Recording::default());
        let interceptor = TaskInterceptor::new(Arc::clone(&session)).with_finalizer(recording.clone());
        let ctx = ExecutionContext::new("p", session.id());

        interceptor.after_run(&ctx, &TaskRun::new("p", 1));
        interceptor.after_run(&ctx, &TaskRun::new("p", 2));
        assert_eq!(*recording.0.lock().unwrap(), vec!["p (1)", "p (2)"]);
    }

    #[test]
    fn test_exception_delegates_to_session() {
        let session = Arc::new(Session::new(SessionConfig::default()));
        let interceptor = TaskInterceptor::new(Arc::clone(&session));
        let ctx = ExecutionContext::new("p", session.id());
        let err = TaskError::configuration("p", "bad");

        assert!(interceptor.on_exception(&ctx, &err, None));
        assert_eq!(session.failures(), 1);
    }
}
