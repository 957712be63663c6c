//! Command-line interface definition for Kafka Viewer
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands to consume through viewer sessions and to work
//! with locators and partition expressions.

use clap::{Args, Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_PATH;

/// Kafka Viewer - addressable Kafka consumer sessions
///
/// View a topic as a member of a consumer group, optionally pinned to an
/// explicit partition set and starting from a chosen offset.
#[derive(Parser, Debug, Clone)]
#[command(name = "kafka-viewer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "KAFKA_VIEWER_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Session identity given as separate flags
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityArgs {
    /// Cluster id from the configuration
    #[arg(long)]
    pub cluster: Option<String>,

    /// Consumer group to join
    #[arg(long)]
    pub group: Option<String>,

    /// Topic to view
    #[arg(long)]
    pub topic: Option<String>,

    /// Starting offset: earliest, latest, default, or a numeric offset
    #[arg(long)]
    pub from: Option<String>,

    /// Partition expression, e.g. "0,2-4"
    #[arg(long)]
    pub partitions: Option<String>,
}

/// Available commands for Kafka Viewer
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start a viewer session and print records until Ctrl-C
    Consume {
        /// Consumer locator, e.g. kafka:local/viewers?topic=orders
        #[arg(conflicts_with_all = ["cluster", "group", "topic", "from", "partitions"])]
        locator: Option<String>,

        #[command(flatten)]
        identity: IdentityArgs,

        /// Print records as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Print the locator for a session identity
    Locator {
        #[command(flatten)]
        identity: IdentityArgs,
    },

    /// Decode a locator and print its identity
    Inspect {
        /// Consumer locator to decode
        locator: String,
    },

    /// Print the normalized partition set of an expression
    Partitions {
        /// Partition expression, e.g. "0,2-4"
        expression: String,
    },

    /// List configured clusters
    Clusters,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
