//! # Secret Rotator
//!
//! Entry point: installs the TLS provider, loads configuration, sets up
//! logging and metrics, then runs the requested command.

use anyhow::{bail, Result};
use clap::Parser;
use secret_rotator::cli::{self, Cli};
use secret_rotator::config::RotatorConfig;
use secret_rotator::observability::{init_logging, metrics};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Must happen before any client (AWS SDK, reqwest) builds a TLS config
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        bail!("Failed to install rustls crypto provider");
    }

    let cli = Cli::parse();

    let mut config = RotatorConfig::from_env()?;
    if let Some(store) = cli.store {
        config.store_backend = store;
    }
    config.validate()?;

    init_logging(&config.log_level, &config.log_format)?;

    info!(
        version = cli::VERSION,
        store.backend = %config.store_backend,
        "Starting secret-rotator"
    );

    metrics::register_metrics()?;

    cli::run(cli, config).await
}
