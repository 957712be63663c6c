//! Structured logging setup
//!
//! Provides JSON-formatted and human-readable logging with optional file output.
//! Logs go to STDERR so that records printed by `consume` keep STDOUT clean.

use crate::config::LoggingConfig;
use anyhow::Result;
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Fallback filter used when neither `RUST_LOG` nor a config is available
pub const DEFAULT_FILTER: &str = "kafka_viewer=info";

/// Run `f` with a STDERR subscriber active on the current thread only.
///
/// Covers work done before the configured subscriber is installed, such as
/// loading the configuration itself. Uses `RUST_LOG` or [`DEFAULT_FILTER`].
///
/// # Examples
///
/// ```no_run
/// use kafka_viewer::config::Config;
/// use kafka_viewer::logging::with_startup_logging;
///
/// let config = with_startup_logging(|| Config::load("config/config.yaml")).unwrap();
/// ```
pub fn with_startup_logging<T>(f: impl FnOnce() -> T) -> T {
    with_startup_writer(std::io::stderr, f)
}

fn with_startup_writer<W, T>(writer: W, f: impl FnOnce() -> T) -> T
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer));
    tracing::subscriber::with_default(subscriber, f)
}

/// Build the filter: `RUST_LOG` wins, otherwise the configured level.
///
/// # Errors
///
/// Returns an error if the configured level is not a valid filter directive
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    Ok(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?)
}

/// Initialize logging based on configuration.
///
/// # Arguments
///
/// * `config` - Logging configuration
///
/// # Errors
///
/// Returns an error if the level is invalid, the log file cannot be opened,
/// or a global subscriber is already installed
///
/// # Examples
///
/// ```no_run
/// use kafka_viewer::config::LoggingConfig;
/// use kafka_viewer::logging::init_logging;
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     json_format: true,
///     file_path: None,
/// };
///
/// init_logging(&config).unwrap();
/// ```
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_filter(&config.level)?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let file = match &config.file_path {
        Some(path) => Some(Arc::new(
            OpenOptions::new().create(true).append(true).open(path)?,
        )),
        None => None,
    };

    if config.json_format {
        let stderr_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(std::io::stderr);

        if let Some(file) = file {
            let file_layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(file);
            registry.with(stderr_layer).with(file_layer).try_init()?;
        } else {
            registry.with(stderr_layer).try_init()?;
        }
    } else {
        let stderr_layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_writer(std::io::stderr);

        if let Some(file) = file {
            let file_layer = fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(false)
                .with_writer(file);
            registry.with(stderr_layer).with(file_layer).try_init()?;
        } else {
            registry.with(stderr_layer).try_init()?;
        }
    }

    Ok(())
}
