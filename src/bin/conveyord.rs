//! Conveyor daemon entry point.
//!
//! ```text
//! conveyord --config /etc/conveyor/conveyor.toml
//! ```
//!
//! Opens the store, runs crash recovery, then runs the notification
//! dispatcher until Ctrl-C. Pipeline workers start when an embedding
//! program attaches a job runner; this binary ships none. A shutdown that
//! outlives the configured deadline exits with status 1.

use clap::Parser;
use conveyor::config::ConveyorConfig;
use conveyor::daemon::{Daemon, DaemonError};
use conveyor::store::Store;
use conveyor::telemetry::init_tracing;
use eyre::WrapErr;
use mockable::DefaultClock;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "conveyord", about = "Durable issue-to-PR job pipeline daemon")]
struct Cli {
    /// Path to the TOML configuration; defaults apply when omitted.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ConveyorConfig::load(path)?,
        None => {
            let defaults = ConveyorConfig::default();
            defaults.validate()?;
            defaults
        }
    };
    init_tracing(&config.logging)?;
    if cli.check {
        info!("configuration is valid");
        return Ok(());
    }

    let store = Store::open(&config.store).wrap_err("cannot open store")?;
    let daemon = Daemon::new(config, store, Arc::new(DefaultClock))?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received"),
            Err(err) => error!(error = %err, "cannot listen for interrupt; shutting down"),
        }
        signal_token.cancel();
    });

    match daemon.run(shutdown).await {
        Ok(()) => Ok(()),
        Err(DaemonError::ShutdownTimedOut(deadline)) => {
            error!(deadline_secs = deadline.as_secs(), "forcing exit");
            std::process::exit(1);
        }
        Err(err) => Err(err.into()),
    }
}
