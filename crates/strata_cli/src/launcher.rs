//! Launcher running task scripts with a local shell.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use strata_runtime::{ExecutionContext, LaunchFailure, Launcher, TaskRun};

/// Script file written into each work folder
pub const COMMAND_SCRIPT: &str = ".command.sh";
/// Captured standard output
pub const COMMAND_OUT: &str = ".command.out";
/// Captured standard error
pub const COMMAND_ERR: &str = ".command.err";

/// Runs `<shell> .command.sh` inside the work folder
#[derive(Debug, Clone)]
pub struct ShellLauncher {
    shell: PathBuf,
}

impl Default for ShellLauncher {
    fn default() -> Self {
        Self {
            shell: PathBuf::from("bash"),
        }
    }
}

impl ShellLauncher {
    /// Use `shell` instead of `bash`
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }
}

#[async_trait]
impl Launcher for ShellLauncher {
    async fn launch(&self, ctx: &ExecutionContext, run: &TaskRun) -> Result<i32, LaunchFailure> {
        let fail = |reason: &str| LaunchFailure::new(run.name(), reason);

        let dir = run.work_dir().ok_or_else(|| fail("no work folder assigned"))?;
        let script = run.script().ok_or_else(|| fail("script not rendered"))?;

        tokio::fs::write(dir.join(COMMAND_SCRIPT), format!("{}\n", script))
            .await
            .map_err(|e| fail("cannot write command script").with_source(e))?;

        for source in run.staged_files() {
            stage(source, dir)
                .await
                .map_err(|e| fail("cannot stage input file").with_source(e))?;
        }

        let stdout = std::fs::File::create(dir.join(COMMAND_OUT))
            .map_err(|e| fail("cannot create stdout capture").with_source(e))?;
        let stderr = std::fs::File::create(dir.join(COMMAND_ERR))
            .map_err(|e| fail("cannot create stderr capture").with_source(e))?;

        tracing::debug!(task = ctx.label(), shell = %self.shell.display(), "spawning");
        let status = tokio::process::Command::new(&self.shell)
            .arg(COMMAND_SCRIPT)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()
            .await
            .map_err(|e| fail("cannot spawn shell").with_source(e))?;

        Ok(exit_code(status))
    }
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

/// Link `source` into `dir` under its file name
async fn stage(source: &Path, dir: &Path) -> std::io::Result<()> {
    let Some(name) = source.file_name() else {
        return Ok(());
    };
    let target = dir.join(name);
    if tokio::fs::symlink_metadata(&target).await.is_ok() {
        return Ok(());
    }
    #[cfg(unix)]
    tokio::fs::symlink(source, &target).await?;
    #[cfg(not(unix))]
    tokio::fs::copy(source, &target).await.map(|_| ())?;
    Ok(())
}
