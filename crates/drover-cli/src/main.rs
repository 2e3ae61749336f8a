//! # drover
//!
//! Command-line front end for the background command orchestrator.
//!
//! `drover run <command> [args...]` consults the command's profile (and any
//! explicit `--background`/`--foreground` flag) to decide placement:
//! foreground commands run attached to the terminal; background commands
//! become supervised jobs whose progress and outcome are printed as events
//! arrive.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use drover_core::{JobEvent, JobOptions, JobStatus};
use drover_runtime::Orchestrator;
use tracing::debug;

/// Background command orchestrator.
#[derive(Parser, Debug)]
#[command(name = "drover", about = "Run CLI subcommands as supervised background jobs")]
struct Cli {
    /// Configuration directory (default `~/.drover`).
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Minimum log level when `RUST_LOG` is unset.
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a command, in the foreground or as a background job.
    Run {
        /// Command name.
        command: String,

        /// Arguments passed through to the command.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,

        /// Force background execution.
        #[arg(long)]
        background: bool,

        /// Force foreground execution (wins over --background).
        #[arg(long)]
        foreground: bool,

        /// How long to wait for a background job before giving up on it
        /// (the job keeps running).
        #[arg(long, default_value_t = 600_000)]
        wait_ms: u64,
    },

    /// Print the command profile table.
    Profiles,
}

/// Initialize the global tracing subscriber with stderr output only.
fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();
    let _ = subscriber.try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_subscriber(&cli.log_level);

    let orchestrator = Orchestrator::from_config_dir(cli.config_dir.as_deref())
        .context("Failed to load orchestrator settings")?;

    let exit_code = match cli.command {
        Commands::Run {
            command,
            args,
            background,
            foreground,
            wait_ms,
        } => {
            let options = JobOptions {
                background,
                foreground,
                ..JobOptions::default()
            };
            if orchestrator.should_run_in_background(&command, &args, &options) {
                run_background(&orchestrator, &command, args, options, wait_ms).await?
            } else {
                run_foreground(&command, &args).await?
            }
        }
        Commands::Profiles => {
            print_profiles(&orchestrator);
            0
        }
    };

    orchestrator.shutdown();
    std::process::exit(exit_code);
}

/// Run a command as a supervised background job, streaming progress to the
/// terminal until it finishes or the wait budget runs out.
async fn run_background(
    orchestrator: &Orchestrator,
    command: &str,
    args: Vec<String>,
    options: JobOptions,
    wait_ms: u64,
) -> Result<i32> {
    let (id, mut watch) = orchestrator
        .execute_watched(command, args, options)
        .await?;
    println!("started background job {id}");

    let progress = tokio::spawn(async move {
        while let Some(event) = watch.next().await {
            if let JobEvent::ProgressUpdate {
                job_id,
                percent,
                message,
            } = event
            {
                eprintln!("[{job_id}] {percent}% {message}");
            }
        }
    });

    let waited = orchestrator
        .wait_for_job(&id, Duration::from_millis(wait_ms))
        .await;
    progress.abort();

    match waited {
        Ok(job) => {
            println!("{}", orchestrator.status_report());
            debug!(job_id = %job.id, status = %job.status, "job finished");
            Ok(match job.status {
                JobStatus::Completed => 0,
                _ => job.exit_code.unwrap_or(1),
            })
        }
        Err(e) => {
            eprintln!("{e}");
            println!("{}", orchestrator.status_report());
            Ok(1)
        }
    }
}

/// Run a command attached to the terminal and pass its exit code through.
async fn run_foreground(command: &str, args: &[String]) -> Result<i32> {
    let status = tokio::process::Command::new(command)
        .args(args)
        .status()
        .await
        .with_context(|| format!("Failed to spawn process: {command}"))?;
    Ok(status.code().unwrap_or(1))
}

/// Print the profile table.
fn print_profiles(orchestrator: &Orchestrator) {
    println!("{:<12} {:<16} {}", "command", "auto-background", "limit");
    for profile in orchestrator.profiles().all() {
        println!(
            "{:<12} {:<16} {}",
            profile.name, profile.auto_background, profile.concurrency_limit
        );
    }
}
