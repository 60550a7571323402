//! Command-line entry point.
//!
//! Loads the job configuration, then runs each selected job strictly in
//! sequence. One job's failure is logged and does not stop the remaining
//! jobs; the exit code reports whether every job completed.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use upsync_core::{run_job, Config};

#[derive(Debug, Parser)]
#[command(
    name = "upsync",
    version,
    about = "One-way incremental directory mirroring over SSH"
)]
struct Cli {
    /// Job configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Log level when UPSYNC_LOG is unset.
    #[arg(long, default_value = "info", value_name = "LEVEL")]
    log_level: String,

    /// Jobs to run; all configured jobs when omitted.
    #[arg(value_name = "JOB")]
    jobs: Vec<String>,
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_env("UPSYNC_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "cannot load configuration");
            return ExitCode::FAILURE;
        }
    };

    for name in &cli.jobs {
        if !config.jobs.contains_key(name) {
            error!(job = %name, "no such job in the configuration");
            return ExitCode::FAILURE;
        }
    }

    let mut failed = false;
    for (name, job) in &config.jobs {
        if !cli.jobs.is_empty() && !cli.jobs.iter().any(|j| j == name) {
            continue;
        }
        match run_job(name, job) {
            Ok(summary) => {
                info!(job = %name, synced_any = summary.synced_any, "job complete");
            }
            Err(err) => {
                error!(job = %name, error = %err, "job failed");
                failed = true;
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
