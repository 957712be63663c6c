//! Error types for Kafka Viewer
//!
//! Session-level failures are [`ConsumerError`]s; this module wraps them
//! together with configuration, IO and serialization failures.

use thiserror::Error;

use crate::consumer::ConsumerError;

/// Main error type for Kafka Viewer operations
#[derive(Error, Debug)]
pub enum ViewerError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid command line usage
    #[error("Usage error: {0}")]
    Usage(String),

    /// Viewer session errors
    #[error(transparent)]
    Consumer(#[from] ConsumerError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for Kafka Viewer operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
