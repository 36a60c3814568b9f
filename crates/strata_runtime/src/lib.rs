//! STRATA Runtime
//!
//! Task processors that turn arriving input tuples into task runs, with
//! bounded concurrency, content-addressed caching and a lifecycle contract
//! deciding when a processor halts.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod gate;
pub mod instantiate;
pub mod lifecycle;
pub mod monitor;
pub mod outputs;
pub mod processor;
pub mod render;
pub mod run;
pub mod session;
pub mod template;
mod worker;

pub use cache::{CacheLookup, CacheMiss, CacheValidator};
pub use config::{ErrorStrategy, SessionConfig};
pub use context::{CurrentTask, Environment, ExecutionContext};
pub use error::{LaunchFailure, TaskError, TaskResult};
pub use gate::{ExecutionGate, Launcher};
pub use instantiate::Instantiator;
pub use lifecycle::{Finalizer, LifecycleListener, NoopFinalizer, TaskInterceptor};
pub use monitor::{ProcessorReport, ProcessorStats};
pub use outputs::{BoundOutput, OutputBinder, OutputPort, OutputResolver};
pub use processor::{InputChannel, ProcessorHandle, TaskProcessor};
pub use render::ScriptRenderer;
pub use run::{TaskRun, TaskStatus};
pub use session::{ActiveTaskRegistry, ErrorHandler, IgnoreErrors, Session, TerminateOnError};
pub use template::{Code, InputParam, OutputKind, OutputParam, ParamKind, ScriptFn, TaskTemplate};
