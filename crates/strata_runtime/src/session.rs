//! Session: the process-wide collaborator shared by every processor.

use crate::config::{ErrorStrategy, SessionConfig};
use crate::context::ExecutionContext;
use crate::error::TaskError;
use crate::run::TaskRun;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use strata_core::SessionId;
use strata_storage::{FolderAllocator, KeyLocks};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Counts live processors; doubles as the shutdown barrier
#[derive(Debug, Default)]
pub struct ActiveTaskRegistry {
    active: AtomicUsize,
    idle: Notify,
}

impl ActiveTaskRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one processor; returns the new count
    pub fn register(&self) -> usize {
        self.active.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Deregister one processor; returns the new count
    pub fn deregister(&self) -> usize {
        let previous = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        let now = previous.saturating_sub(1);
        if now == 0 {
            self.idle.notify_waiters();
        }
        now
    }

    /// Current count
    #[must_use]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Wait until no processor is registered
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Decides what a task failure means for its processor.
///
/// Returning `true` halts the processor.
pub trait ErrorHandler: Send + Sync {
    /// Handle `error` raised while processing `run`
    fn handle(&self, ctx: &ExecutionContext, error: &TaskError, run: Option<&TaskRun>) -> bool;
}

/// Halts on every failure
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminateOnError;

impl ErrorHandler for TerminateOnError {
    fn handle(&self, ctx: &ExecutionContext, error: &TaskError, run: Option<&TaskRun>) -> bool {
        tracing::error!(
            processor = %ctx.processor,
            task = run.map_or(ctx.label(), TaskRun::name),
            %error,
            "task failed, halting processor"
        );
        true
    }
}

/// Logs failures and keeps going
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreErrors;

impl ErrorHandler for IgnoreErrors {
    fn handle(&self, ctx: &ExecutionContext, error: &TaskError, run: Option<&TaskRun>) -> bool {
        tracing::warn!(
            processor = %ctx.processor,
            task = run.map_or(ctx.label(), TaskRun::name),
            %error,
            "task failed, ignoring"
        );
        false
    }
}

/// Shared state of one pipeline execution
pub struct Session {
    id: SessionId,
    cacheable: bool,
    allocator: FolderAllocator,
    locks: KeyLocks,
    registry: Arc<ActiveTaskRegistry>,
    handler: Arc<dyn ErrorHandler>,
    shutdown: CancellationToken,
    failures: AtomicU64,
}

impl Session {
    /// Create a session with a fresh id
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self::with_id(SessionId::new(), config)
    }

    /// Create a session reusing `id`, which makes earlier work folders of
    /// that session visible to the cache
    #[must_use]
    pub fn with_id(id: SessionId, config: SessionConfig) -> Self {
        let handler: Arc<dyn ErrorHandler> = match config.error_strategy {
            ErrorStrategy::Terminate => Arc::new(TerminateOnError),
            ErrorStrategy::Ignore => Arc::new(IgnoreErrors),
        };
        Self {
            id,
            cacheable: config.cacheable,
            allocator: FolderAllocator::new(config.work_dir),
            locks: KeyLocks::new(),
            registry: Arc::new(ActiveTaskRegistry::new()),
            handler,
            shutdown: CancellationToken::new(),
            failures: AtomicU64::new(0),
        }
    }

    /// Replace the error handler
    #[must_use]
    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Share an existing registry, e.g. across sessions in one process
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ActiveTaskRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Session id
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Work directory root
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        self.allocator.root()
    }

    /// Session-level cache toggle
    #[must_use]
    pub const fn cacheable(&self) -> bool {
        self.cacheable
    }

    /// Work-folder allocator
    #[must_use]
    pub fn allocator(&self) -> &FolderAllocator {
        &self.allocator
    }

    /// Per-key execution locks
    #[must_use]
    pub fn locks(&self) -> &KeyLocks {
        &self.locks
    }

    /// Active-task registry
    #[must_use]
    pub fn registry(&self) -> &Arc<ActiveTaskRegistry> {
        &self.registry
    }

    /// Register a starting processor
    pub fn register_active_task(&self) -> usize {
        self.registry.register()
    }

    /// Deregister a stopped processor
    pub fn deregister_active_task(&self) -> usize {
        self.registry.deregister()
    }

    /// Route a task failure to the error handler and return its verdict
    pub fn handle(&self, ctx: &ExecutionContext, error: &TaskError, run: Option<&TaskRun>) -> bool {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.handler.handle(ctx, error, run)
    }

    /// Failures seen so far
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// External shutdown signal
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Ask every processor to stop pulling tuples
    pub fn shutdown(&self) {
        tracing::info!(session = %self.id, "shutdown requested");
        self.shutdown.cancel();
    }

    /// Wait until every registered processor has stopped
    pub async fn wait_idle(&self) {
        self.registry.wait_idle().await;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("work_dir", &self.work_dir())
            .field("cacheable", &self.cacheable)
            .field("active", &self.registry.active())
            .finish_non_exhaustive()
    }
}
