//! Task processor: multiplexes input channels into bounded task bodies.
//!
//! A permit is taken from the processor's semaphore before the next tuple
//! is pulled, so at most `max_forks` bodies run at once and surplus tuples
//! stay queued in their channels.

use crate::context::ExecutionContext;
use crate::error::{TaskError, TaskResult};
use crate::gate::Launcher;
use crate::lifecycle::{LifecycleListener, TaskInterceptor};
use crate::monitor::{ProcessorReport, ProcessorStats};
use crate::outputs::OutputPort;
use crate::session::Session;
use crate::template::TaskTemplate;
use crate::worker::TaskWorker;
use std::sync::Arc;
use strata_core::Value;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

/// One input of a processor
#[derive(Debug)]
pub enum InputChannel {
    /// Each value is consumed by exactly one tuple; closing ends the input
    Queue(mpsc::Receiver<Value>),
    /// A singleton delivered to every tuple
    Value(Value),
}

impl InputChannel {
    /// A closed queue pre-filled with `values`
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let values: Vec<Value> = values.into_iter().collect();
        let (tx, rx) = mpsc::channel(values.len().max(1));
        for value in values {
            // Capacity covers every value, so this never fails.
            let _ = tx.try_send(value);
        }
        Self::Queue(rx)
    }
}

/// Assembles complete tuples from the input channels
struct TupleReader {
    channels: Vec<InputChannel>,
    fired: bool,
}

impl TupleReader {
    fn new(channels: Vec<InputChannel>) -> Self {
        Self { channels, fired: false }
    }

    /// Next complete tuple, or `None` once any queue is exhausted.
    ///
    /// With no queue inputs the reader yields exactly one tuple.
    async fn next(&mut self) -> Option<Vec<Value>> {
        let singleton = self.channels.iter().all(|c| matches!(c, InputChannel::Value(_)));
        if singleton && std::mem::replace(&mut self.fired, true) {
            return None;
        }

        let mut tuple = Vec::with_capacity(self.channels.len());
        for channel in &mut self.channels {
            match channel {
                InputChannel::Queue(rx) => tuple.push(rx.recv().await?),
                InputChannel::Value(value) => tuple.push(value.clone()),
            }
        }
        Some(tuple)
    }
}

/// Binds input channels and output ports to one task template
pub struct TaskProcessor {
    template: Arc<TaskTemplate>,
    session: Arc<Session>,
    launcher: Arc<dyn Launcher>,
    listener: Arc<dyn LifecycleListener>,
    inputs: Vec<InputChannel>,
    outputs: Vec<OutputPort>,
}

impl TaskProcessor {
    /// Create a processor with the default [`TaskInterceptor`] listener
    pub fn new(template: TaskTemplate, session: Arc<Session>, launcher: Arc<dyn Launcher>) -> Self {
        let listener = Arc::new(TaskInterceptor::new(Arc::clone(&session)));
        Self {
            template: Arc::new(template),
            session,
            launcher,
            listener,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Replace the lifecycle listener
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn LifecycleListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Append an input channel, positionally matching the next declared input
    #[must_use]
    pub fn with_input(mut self, channel: InputChannel) -> Self {
        self.inputs.push(channel);
        self
    }

    /// Append an output port, positionally matching the next declared output
    #[must_use]
    pub fn with_output(mut self, port: OutputPort) -> Self {
        self.outputs.push(port);
        self
    }

    /// Template driving this processor
    #[must_use]
    pub fn template(&self) -> &TaskTemplate {
        &self.template
    }

    fn validate(&self) -> TaskResult<()> {
        self.template.validate()?;
        let name = self.template.name();
        if self.inputs.len() != self.template.inputs().len() {
            return Err(TaskError::configuration(
                name,
                format!(
                    "{} input channels bound to {} declared inputs",
                    self.inputs.len(),
                    self.template.inputs().len()
                ),
            ));
        }
        if self.outputs.len() != self.template.outputs().len() {
            return Err(TaskError::configuration(
                name,
                format!(
                    "{} output ports bound to {} declared outputs",
                    self.outputs.len(),
                    self.template.outputs().len()
                ),
            ));
        }
        Ok(())
    }

    /// Start processing in the background.
    ///
    /// The session registry counts this processor and the listener's
    /// `on_start` has run by the time this returns.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the template is invalid or the
    /// channel and port counts do not match its declarations
    pub fn start(self) -> TaskResult<ProcessorHandle> {
        self.validate()?;
        let ctx = ExecutionContext::new(self.template.name(), self.session.id());
        let active = self.session.register_active_task();
        tracing::debug!(processor = %ctx.processor, active, "processor registered");
        self.listener.on_start(&ctx);
        Ok(ProcessorHandle {
            processor: self.template.name().to_string(),
            handle: tokio::spawn(self.drive(ctx)),
        })
    }

    /// Process every tuple and wait for the processor to stop
    ///
    /// # Errors
    ///
    /// Returns a configuration error before anything runs, see
    /// [`TaskProcessor::start`]
    pub async fn run(self) -> TaskResult<ProcessorReport> {
        self.start()?.join().await
    }

    async fn drive(self, ctx: ExecutionContext) -> ProcessorReport {
        let Self {
            template,
            session,
            launcher,
            listener,
            inputs,
            outputs,
        } = self;

        let stats = Arc::new(ProcessorStats::new());
        let halt = session.shutdown_token().child_token();
        let semaphore = Arc::new(Semaphore::new(template.max_forks()));
        let worker = Arc::new(TaskWorker {
            template: Arc::clone(&template),
            session: Arc::clone(&session),
            launcher,
            listener: Arc::clone(&listener),
            ports: outputs,
            stats: Arc::clone(&stats),
        });

        tracing::info!(processor = %ctx.processor, max_forks = template.max_forks(), "processor running");

        let mut reader = TupleReader::new(inputs);
        let mut bodies = JoinSet::new();
        let mut index = 0u64;

        'pull: loop {
            // Finished bodies are reaped while waiting, so a panic halts
            // before another tuple is taken.
            let permit = loop {
                tokio::select! {
                    biased;
                    () = halt.cancelled() => break 'pull,
                    Some(joined) = bodies.join_next(), if !bodies.is_empty() => {
                        reap(joined, &ctx, &stats, &halt);
                    }
                    permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                        Ok(permit) => break permit,
                        Err(_) => break 'pull,
                    },
                }
            };

            // Pinned across reaps so a partially read tuple is kept.
            let next = reader.next();
            tokio::pin!(next);
            let tuple = loop {
                tokio::select! {
                    biased;
                    () = halt.cancelled() => break 'pull,
                    Some(joined) = bodies.join_next(), if !bodies.is_empty() => {
                        reap(joined, &ctx, &stats, &halt);
                    }
                    tuple = &mut next => match tuple {
                        Some(tuple) => break tuple,
                        None => break 'pull,
                    },
                }
            };

            index += 1;
            listener.on_message(&ctx, &tuple);
            stats.record_submission();

            let worker = Arc::clone(&worker);
            let halt = halt.clone();
            let stats = Arc::clone(&stats);
            bodies.spawn(async move {
                if worker.process(index, tuple).await {
                    stats.mark_halted();
                    halt.cancel();
                }
                drop(permit);
            });
        }

        while let Some(joined) = bodies.join_next().await {
            reap(joined, &ctx, &stats, &halt);
        }
        if halt.is_cancelled() {
            stats.mark_halted();
        }

        // Last reference to the ports: downstream now sees end of stream.
        drop(worker);
        listener.on_stop(&ctx);
        let active = session.deregister_active_task();
        tracing::debug!(processor = %ctx.processor, active, "processor deregistered");

        let report = stats.report(&ctx.processor);
        tracing::info!(
            processor = %report.processor,
            submitted = report.submitted,
            completed = report.completed,
            cached = report.cached,
            failed = report.failed,
            halted = report.halted,
            "processor stopped"
        );
        report
    }
}

fn reap(joined: Result<(), JoinError>, ctx: &ExecutionContext, stats: &ProcessorStats, halt: &CancellationToken) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(processor = %ctx.processor, "task body panicked, halting processor");
            stats.record_panic();
        } else {
            tracing::error!(processor = %ctx.processor, error = %e, "task body aborted, halting processor");
        }
        stats.mark_halted();
        halt.cancel();
    }
}

/// Handle to a running processor
pub struct ProcessorHandle {
    processor: String,
    handle: JoinHandle<ProcessorReport>,
}

impl ProcessorHandle {
    /// Wait for the processor to stop
    ///
    /// # Errors
    ///
    /// Returns an internal error if the processor's own task panicked
    pub async fn join(self) -> TaskResult<ProcessorReport> {
        self.handle.await.map_err(|e| TaskError::Internal {
            message: format!("processor `{}` crashed: {}", self.processor, e),
        })
    }
}
