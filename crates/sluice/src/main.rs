//! Sluice - Configurable stream-processing engine
//!
//! # Usage
//!
//! ```bash
//! # Run a stream until interrupted
//! sluice --config sluice.toml
//! sluice run --config sluice.toml --shutdown-timeout-secs 30
//! ```
//!
//! Exits 0 on a clean shutdown and non-zero when the configuration is
//! invalid or the stream fails to start.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sluice_manager::{Environment, Manager};
use sluice_stream::{Stream, StreamConfig};

/// Sluice - configurable stream-processing engine
#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file
    #[arg(short, long, default_value = "sluice.toml", global = true)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a stream until interrupted
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Budget for the graceful drain on shutdown
    #[arg(long, default_value_t = 20)]
    shutdown_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let args = match cli.command {
        Some(Command::Run(args)) => args,
        // No subcommand = run (default behaviour).
        None => RunArgs {
            shutdown_timeout_secs: 20,
        },
    };
    run(cli.config, args).await
}

async fn run(config_path: PathBuf, args: RunArgs) -> Result<()> {
    let env = Environment::new();
    let conf = StreamConfig::from_file(&config_path, &env)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let manager = Arc::new(Manager::with_environment(env));
    let stream = Stream::new(conf, manager)
        .await
        .context("starting stream")?;

    tracing::info!(config = %config_path.display(), "sluice running, ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;

    tracing::info!("shutdown signal received");
    let timeout = Duration::from_secs(args.shutdown_timeout_secs);
    if let Err(err) = stream.stop(timeout).await {
        // An unclean drain is reported but the process still exits
        // normally; everything that could stop has been stopped.
        tracing::error!(error = %err, "stream did not drain cleanly");
    }
    Ok(())
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}
