//! Kafka Viewer - addressable Kafka consumer sessions
//!
#![doc = "Main entry point for the Kafka Viewer CLI."]

use anyhow::Result;
use std::path::Path;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kafka_viewer::cli::{Cli, Commands};
use kafka_viewer::commands;
use kafka_viewer::config::Config;
use kafka_viewer::logging::{init_logging, with_startup_logging, DEFAULT_FILTER};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration; warnings go to STDERR before logging is configured
    let config = with_startup_logging(|| Config::load_with_cli(&cli.config, &cli))?;

    // Initialize tracing; without a config file only our own crate logs
    if !Path::new(&cli.config).exists() || init_logging(&config.logging).is_err() {
        init_tracing();
    }

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Consume {
            locator,
            identity,
            json,
        } => {
            let locator = commands::resolve_locator(locator.as_deref(), &identity, true)?;
            tracing::info!(locator = %locator, "Starting viewer session");
            commands::consume::run_consume(config, locator, json).await?;
            Ok(())
        }
        Commands::Locator { identity } => {
            let locator = commands::resolve_locator(None, &identity, false)?;
            println!("{}", locator);
            Ok(())
        }
        Commands::Inspect { locator } => {
            println!("{}", commands::locator::describe_locator(&locator)?);
            Ok(())
        }
        Commands::Partitions { expression } => {
            println!("{}", commands::partitions::describe_partitions(&expression)?);
            Ok(())
        }
        Commands::Clusters => {
            println!("{}", commands::clusters::describe_clusters(&config));
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
