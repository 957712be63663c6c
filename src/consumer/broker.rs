//! Seams between viewer sessions and the broker client.
//!
//! A [`BrokerConnector`] turns resolved [`ConsumerOptions`] into a live
//! [`BrokerConnection`]. The Kafka implementation lives in
//! [`super::kafka`]; tests use the scripted broker in `fake`.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::assignment::AssignmentStrategy;
use super::error::ConsumerError;
use super::offsets::{PartitionWatermarks, SeekEntry, SubscribeOptions};
use super::record::{ConsumedRecord, ConsumerStatus};
use super::settings::ConsumerOptions;

/// Something a running connection reports to its session.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    Record(ConsumedRecord),
    Error(ConsumerError),
    Status(ConsumerStatus),
}

/// Topic metadata queries used to resolve starting offsets.
#[async_trait]
pub trait BrokerAdmin: Send + Sync {
    /// Returns low and high watermarks of every partition of a topic.
    async fn fetch_topic_offsets(
        &self,
        topic: &str,
    ) -> Result<Vec<PartitionWatermarks>, ConsumerError>;

    /// Returns the partition ids of a topic, as reported by broker metadata.
    async fn fetch_topic_partitions(&self, topic: &str) -> Result<Vec<i32>, ConsumerError>;
}

/// A connected group member.
#[async_trait]
pub trait BrokerConnection: BrokerAdmin {
    /// Subscribes to a topic using the strategy chosen at connect time.
    async fn subscribe(&self, options: &SubscribeOptions) -> Result<(), ConsumerError>;

    /// Subscribes with starting offsets known up front.
    ///
    /// Connections that own their partitions from the start place `seeks`
    /// in the assignment itself. The default subscribes, then seeks.
    async fn subscribe_at(
        &self,
        options: &SubscribeOptions,
        seeks: &[SeekEntry],
    ) -> Result<(), ConsumerError> {
        self.subscribe(options).await?;
        for entry in seeks {
            self.seek(entry).await?;
        }
        Ok(())
    }

    /// Starts consuming and hands back the event stream.
    ///
    /// # Errors
    ///
    /// Returns `ConsumerError::Connection` when called more than once.
    fn run(&self) -> Result<mpsc::UnboundedReceiver<BrokerEvent>, ConsumerError>;

    /// Moves the read position of one owned partition.
    async fn seek(&self, entry: &SeekEntry) -> Result<(), ConsumerError>;

    /// Leaves the group and releases the connection.
    async fn disconnect(&self) -> Result<(), ConsumerError>;
}

/// Factory for broker connections.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Creates a group member for the given options and strategy.
    ///
    /// # Errors
    ///
    /// Returns `ConsumerError::Connection` if the cluster cannot be reached.
    async fn connect(
        &self,
        options: &ConsumerOptions,
        strategy: &AssignmentStrategy,
    ) -> Result<Box<dyn BrokerConnection>, ConsumerError>;
}
