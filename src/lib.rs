//! Kafka Viewer - addressable Kafka consumer sessions
//!
//! This library provides viewer sessions: Kafka consumer group members
//! that read one topic, are addressed by a locator string, and may pin an
//! explicit partition set and a starting offset.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `consumer`: locators, partition expressions, assignment strategies,
//!   offset resolution, sessions and the session registry
//! - `config`: Configuration management and validation
//! - `logging`: tracing subscriber setup
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//! - `commands`: Command handlers
//!
//! # Example
//!
//! ```no_run
//! use kafka_viewer::{Config, ConsumerIdentity, OffsetPolicy};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml")?;
//!     config.validate()?;
//!
//!     let locator = ConsumerIdentity::new("local", "viewers", "orders")
//!         .with_from_offset(OffsetPolicy::Earliest)
//!         .locator();
//!     println!("{}", locator);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod consumer;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::Config;
pub use consumer::{
    ConsumerIdentity, ConsumerLocator, ConsumerRegistry, ConsumerSession, OffsetPolicy,
};
pub use error::{Result, ViewerError};
