//! Addressable Kafka viewer sessions.
//!
//! A viewer session is one consumer group member reading one topic, named
//! by a locator such as `kafka:clusterA/group1?topic=orders&from=earliest`.
//! Sessions may pin an explicit partition set and start from a keyword
//! policy or a literal offset.
//!
//! # Modules
//!
//! - [`partitions`] - partition expression parsing
//! - [`locator`] - locator encoding and decoding
//! - [`assignment`] - balanced and fixed partition assignment
//! - [`offsets`] - starting position resolution
//! - [`broker`] - connector and connection seams
//! - [`kafka`] - `rdkafka` implementation of the seams
//! - [`session`] - a single viewer session
//! - [`registry`] - the collection of live sessions
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kafka_viewer::config::Config;
//! use kafka_viewer::consumer::{ConsumerLocator, ConsumerRegistry, KafkaConnector};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(Config::load("config/config.yaml")?);
//!     let registry = ConsumerRegistry::new(
//!         config.clone(),
//!         config.consumer.clone(),
//!         Arc::new(KafkaConnector::new()),
//!     );
//!
//!     let locator: ConsumerLocator = "kafka:local/viewers?topic=orders&from=earliest".parse()?;
//!     let session = registry.create(&locator).await?;
//!     session.records().subscribe(|event| {
//!         println!("{}", event.record.offset);
//!     });
//!     Ok(())
//! }
//! ```

pub mod assignment;
pub mod broker;
pub mod error;
pub mod events;
pub mod kafka;
pub mod locator;
pub mod offsets;
pub mod partitions;
pub mod record;
pub mod registry;
pub mod session;
pub mod settings;

#[cfg(test)]
pub mod fake;

pub use assignment::{AssignmentStrategy, FixedPartitionAssignor};
pub use broker::{BrokerAdmin, BrokerConnection, BrokerConnector, BrokerEvent};
pub use error::ConsumerError;
pub use events::{EventEmitter, Subscription};
pub use kafka::KafkaConnector;
pub use locator::{ConsumerIdentity, ConsumerLocator, OffsetPolicy};
pub use offsets::{PartitionWatermarks, SeekEntry, SubscribeOptions};
pub use partitions::{parse_partitions, render_partitions, PartitionParseError};
pub use record::{
    ConsumedRecord, ConsumerChangedStatusEvent, ConsumerErrorEvent, ConsumerStatus,
    RecordReceivedEvent,
};
pub use registry::{ConsumerCollectionChangedEvent, ConsumerRegistry};
pub use session::{ConsumerLaunchState, ConsumerSession};
pub use settings::{ClusterLookup, ClusterSettings, ConsumerOptions, ConsumerSettings};
