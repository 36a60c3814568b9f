//! STRATA CLI
//!
//! Runs one task template over JSON inputs with a local shell launcher.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod inputs;
mod launcher;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, bail};
use std::path::PathBuf;
use std::sync::Arc;
use strata_runtime::{OutputPort, Session, SessionConfig, TaskProcessor, TaskTemplate};

use crate::launcher::ShellLauncher;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "STRATA - cached, bounded task execution", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task template over its inputs
    Run {
        /// Task template (JSON)
        #[arg(short, long)]
        task: PathBuf,
        /// Input channels (JSON object keyed by input name)
        #[arg(short, long)]
        inputs: Option<PathBuf>,
        /// Session settings (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Work directory root
        #[arg(short, long)]
        work_dir: Option<PathBuf>,
        /// Ignore and do not consult the cache
        #[arg(long)]
        no_cache: bool,
        /// Override the template's concurrency bound
        #[arg(long)]
        max_forks: Option<usize>,
        /// Reuse a previous session's cache: the last one, or the given id
        #[arg(long, num_args = 0..=1, value_name = "SESSION")]
        resume: Option<Option<String>>,
        /// Shell used to run scripts
        #[arg(long, default_value = "bash")]
        shell: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("strata=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Commands::Run {
            task,
            inputs,
            config,
            work_dir,
            no_cache,
            max_forks,
            resume,
            shell,
        } => {
            let mut config: SessionConfig = match config {
                Some(path) => inputs::read_json(&path)?,
                None => SessionConfig::default(),
            };
            if let Some(work_dir) = work_dir {
                config.work_dir = work_dir;
            }
            if no_cache {
                config.cacheable = false;
            }

            let mut template: TaskTemplate = inputs::read_json(&task)?;
            if let Some(max_forks) = max_forks {
                template = template.with_max_forks(max_forks);
            }

            let cwd = std::env::current_dir().wrap_err("cannot determine current directory")?;
            let channels = inputs::load_inputs(inputs.as_deref(), &template, &cwd)?;

            let work_dir = config.work_dir.clone();
            let id = inputs::resolve_session(resume.as_ref().map(|r| r.as_deref()), &work_dir)?;
            inputs::record_session(id, &work_dir)?;
            let session = Arc::new(Session::with_id(id, config));
            tracing::info!(session = %id, work_dir = %work_dir.display(), "session started");

            {
                let session = Arc::clone(&session);
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        session.shutdown();
                    }
                });
            }

            let launcher = Arc::new(ShellLauncher::default().with_shell(shell));
            let mut processor = TaskProcessor::new(template.clone(), Arc::clone(&session), launcher);
            for channel in channels {
                processor = processor.with_input(channel);
            }

            let mut printers = Vec::new();
            for output in template.outputs() {
                let mut port = OutputPort::new();
                let mut rx = port.connect();
                let name = output.name.clone();
                printers.push(tokio::spawn(async move {
                    while let Some(value) = rx.recv().await {
                        let line = serde_json::json!({ "output": name, "value": value.to_json() });
                        println!("{}", line);
                    }
                }));
                processor = processor.with_output(port);
            }

            let report = processor.run().await?;
            for printer in printers {
                printer.await.wrap_err("output printer crashed")?;
            }

            if !report.succeeded() {
                bail!(
                    "`{}` did not complete: {} of {} runs failed{}",
                    report.processor,
                    report.failed + report.panicked,
                    report.submitted,
                    if report.halted { ", processor halted" } else { "" }
                );
            }
            tracing::info!(
                completed = report.completed,
                cached = report.cached,
                "all runs completed"
            );
            Ok(())
        }
    }
}
