//! Execution gate: launch, persist the exit status, validate it.

use crate::context::ExecutionContext;
use crate::error::{LaunchFailure, TaskError, TaskResult};
use crate::run::TaskRun;
use crate::template::TaskTemplate;
use crate::worker::blocking;
use async_trait::async_trait;
use strata_storage::{ExitMarker, WorkFolder};

/// Runs a rendered task body inside its work folder.
///
/// The run's script, inputs and work folder are set before `launch` is
/// called. The returned value is the task's exit status.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Execute `run` to completion
    async fn launch(&self, ctx: &ExecutionContext, run: &TaskRun) -> Result<i32, LaunchFailure>;
}

/// Executes cache misses
pub struct ExecutionGate;

impl ExecutionGate {
    /// Launch `run` in `folder` and validate its exit status.
    ///
    /// The exit status is persisted before validation, so a rejected run
    /// still leaves a complete marker behind.
    ///
    /// # Errors
    ///
    /// Returns the launcher's failure unchanged, a storage error if the
    /// marker cannot be written, or `InvalidExit` if the status is not
    /// accepted by `template`
    pub async fn execute(
        launcher: &dyn Launcher,
        ctx: &ExecutionContext,
        template: &TaskTemplate,
        run: &mut TaskRun,
        folder: &WorkFolder,
    ) -> TaskResult<i32> {
        run.set_work_dir(folder.path.clone());
        tracing::debug!(task = run.name(), folder = %folder.path.display(), "launching");

        let exit_code = launcher.launch(ctx, run).await?;
        run.set_exit_code(exit_code);
        let path = folder.path.clone();
        blocking(run.name(), move || Ok(ExitMarker::write(&path, exit_code)?)).await?;

        if !template.accepts(exit_code) {
            tracing::warn!(task = run.name(), exit_code, "exit status not accepted");
            return Err(TaskError::InvalidExit {
                task: run.name().to_string(),
                exit_code,
            });
        }
        Ok(exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{CacheKey, SessionId, Value};
    use strata_storage::{FolderAllocator, MarkerState};

    struct FixedExit(i32);

    #[async_trait]
    impl Launcher for FixedExit {
        async fn launch(&self, _ctx: &ExecutionContext, run: &TaskRun) -> Result<i32, LaunchFailure> {
            assert!(run.work_dir().is_some());
            Ok(self.0)
        }
    }

    struct Broken;

    #[async_trait]
    impl Launcher for Broken {
        async fn launch(&self, _ctx: &ExecutionContext, run: &TaskRun) -> Result<i32, LaunchFailure> {
            Err(LaunchFailure::new(run.name(), "no shell"))
        }
    }

    fn folder(dir: &tempfile::TempDir) -> WorkFolder {
        let key = CacheKey::compute(SessionId::new(), "x", Vec::<(&str, &Value)>::new()).unwrap();
        FolderAllocator::new(dir.path()).claim(&key).unwrap()
    }

    #[tokio::test]
    async fn test_accepted_exit() {
        let dir = tempfile::tempdir().unwrap();
        let folder = folder(&dir);
        let template = TaskTemplate::new("t", "x");
        let ctx = ExecutionContext::new("t", SessionId::new());
        let mut run = TaskRun::new("t", 1);

        let code = ExecutionGate::execute(&FixedExit(0), &ctx, &template, &mut run, &folder)
            .await
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(run.exit_code(), Some(0));
        assert_eq!(run.work_dir(), Some(folder.path()));
        assert_eq!(ExitMarker::read(folder.path()).unwrap(), MarkerState::Recorded(0));
    }

    #[tokio::test]
    async fn test_rejected_exit_still_persists_marker() {
        let dir = tempfile::tempdir().unwrap();
        let folder = folder(&dir);
        let template = TaskTemplate::new("t", "x");
        let ctx = ExecutionContext::new("t", SessionId::new());
        let mut run = TaskRun::new("t", 1);

        let err = ExecutionGate::execute(&FixedExit(1), &ctx, &template, &mut run, &folder)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::InvalidExit { exit_code: 1, .. }));
        assert_eq!(ExitMarker::read(folder.path()).unwrap(), MarkerState::Recorded(1));
    }

    #[tokio::test]
    async fn test_launch_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let folder = folder(&dir);
        let template = TaskTemplate::new("t", "x");
        let ctx = ExecutionContext::new("t", SessionId::new());
        let mut run = TaskRun::new("t", 1);

        let err = ExecutionGate::execute(&Broken, &ctx, &template, &mut run, &folder)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Launch(_)));
        assert_eq!(ExitMarker::read(folder.path()).unwrap(), MarkerState::Absent);
    }
}
