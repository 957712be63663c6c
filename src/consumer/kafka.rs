//! Kafka broker connections built on `rdkafka`.
//!
//! The balanced strategy subscribes with the client's `roundrobin` assignor
//! and lets the group coordinator balance partitions. The fixed strategy
//! computes its plan locally with the session's own client id as the only
//! member, then assigns the resulting partitions directly, each one starting
//! at its resolved offset.
//!
//! Blocking client calls (metadata, watermarks, seeks) run on the blocking
//! thread pool. Records are read by a task that stops when the connection
//! is disconnected.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{ClientContext, Offset, TopicPartitionList};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::assignment::AssignmentStrategy;
use super::broker::{BrokerAdmin, BrokerConnection, BrokerConnector, BrokerEvent};
use super::error::ConsumerError;
use super::offsets::{PartitionWatermarks, SeekEntry, SubscribeOptions};
use super::record::{ConsumedRecord, ConsumerStatus};
use super::settings::ConsumerOptions;

const CLIENT_ID_PREFIX: &str = "kafka-viewer";
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Client context that reports group rebalances as status events.
struct ViewerContext {
    events: mpsc::UnboundedSender<BrokerEvent>,
}

impl ClientContext for ViewerContext {}

impl ConsumerContext for ViewerContext {
    fn pre_rebalance(&self, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Revoke(tpl) => {
                tracing::debug!(partitions_revoked = tpl.count(), "Rebalance: revoking partitions");
            }
            Rebalance::Assign(tpl) => {
                tracing::debug!(partitions_assigned = tpl.count(), "Rebalance: assigning partitions");
            }
            Rebalance::Error(message) => {
                tracing::warn!(error = %message, "Rebalance error");
                let _ = self
                    .events
                    .send(BrokerEvent::Error(ConsumerError::Connection(message.to_string())));
                return;
            }
        }
        let _ = self
            .events
            .send(BrokerEvent::Status(ConsumerStatus::Rebalancing));
    }

    fn post_rebalance(&self, rebalance: &Rebalance<'_>) {
        if let Rebalance::Assign(_) = rebalance {
            let _ = self
                .events
                .send(BrokerEvent::Status(ConsumerStatus::Rebalanced));
        }
    }
}

type ViewerConsumer = StreamConsumer<ViewerContext>;

/// Connector that creates `rdkafka` stream consumers.
#[derive(Debug, Clone, Default)]
pub struct KafkaConnector;

impl KafkaConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrokerConnector for KafkaConnector {
    async fn connect(
        &self,
        options: &ConsumerOptions,
        strategy: &AssignmentStrategy,
    ) -> Result<Box<dyn BrokerConnection>, ConsumerError> {
        let client_id = format!("{}-{}", CLIENT_ID_PREFIX, Uuid::new_v4());
        let (events, receiver) = mpsc::unbounded_channel();

        let mut config = ClientConfig::new();
        for (key, value) in options.client_settings(&client_id, strategy) {
            config.set(key, value);
        }
        let consumer: ViewerConsumer = config
            .create_with_context(ViewerContext {
                events: events.clone(),
            })
            .map_err(|e| ConsumerError::Connection(format!("failed to create consumer: {}", e)))?;

        let connection = KafkaConnection {
            consumer: Arc::new(consumer),
            client_id,
            strategy: strategy.clone(),
            timeout: options.metadata_timeout,
            events,
            receiver: Mutex::new(Some(receiver)),
            pending_seeks: Arc::new(Mutex::new(HashMap::new())),
            cancellation: CancellationToken::new(),
        };

        connection
            .await_topic_metadata(&options.topic_id, options.retries.max(1))
            .await?;
        tracing::info!(
            client_id = %connection.client_id,
            cluster = %options.cluster.id,
            group = %options.consumer_group_id,
            "Connected to Kafka"
        );
        let _ = connection
            .events
            .send(BrokerEvent::Status(ConsumerStatus::Created));

        Ok(Box::new(connection))
    }
}

type PendingSeeks = Arc<Mutex<HashMap<(String, i32), i64>>>;

/// A live `rdkafka` group member.
struct KafkaConnection {
    consumer: Arc<ViewerConsumer>,
    client_id: String,
    strategy: AssignmentStrategy,
    timeout: Duration,
    events: mpsc::UnboundedSender<BrokerEvent>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<BrokerEvent>>>,
    /// Seeks requested before their partition was assigned
    pending_seeks: PendingSeeks,
    cancellation: CancellationToken,
}

impl KafkaConnection {
    /// Fetches topic metadata until it succeeds or attempts run out.
    async fn await_topic_metadata(&self, topic: &str, attempts: u32) -> Result<(), ConsumerError> {
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.fetch_topic_partitions(topic).await {
                Ok(_) => return Ok(()),
                Err(error) => {
                    tracing::warn!(attempt, attempts, "Kafka metadata request failed: {}", error);
                    last_error = Some(error);
                    if attempt < attempts {
                        tokio::time::sleep(RETRY_BACKOFF).await;
                    }
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| ConsumerError::Connection("no connection attempt made".to_string())))
    }

    /// Assigns the fixed plan directly, starting each partition at its entry
    /// in `seeks` when one exists.
    fn assign_fixed(
        &self,
        options: &SubscribeOptions,
        seeks: &[SeekEntry],
    ) -> Result<(), ConsumerError> {
        let AssignmentStrategy::Fixed(assignor) = &self.strategy else {
            return Err(ConsumerError::Connection(
                "balanced consumers cannot assign partitions".to_string(),
            ));
        };
        let plan = assignor.assign(
            std::slice::from_ref(&self.client_id),
            std::slice::from_ref(&options.topic),
        );
        let partitions = plan.partitions_for(&self.client_id, &options.topic);
        let tpl = assignment_list(&options.topic, &partitions, options.from_beginning, seeks)?;
        self.consumer
            .assign(&tpl)
            .map_err(|e| ConsumerError::Connection(format!("assign failed: {}", e)))?;
        let _ = self
            .events
            .send(BrokerEvent::Status(ConsumerStatus::Rebalanced));
        Ok(())
    }

    async fn blocking<T, F>(&self, call: F) -> Result<T, ConsumerError>
    where
        T: Send + 'static,
        F: FnOnce(&ViewerConsumer) -> Result<T, ConsumerError> + Send + 'static,
    {
        let consumer = Arc::clone(&self.consumer);
        tokio::task::spawn_blocking(move || call(&consumer))
            .await
            .map_err(|e| ConsumerError::Connection(format!("client task failed: {}", e)))?
    }
}

#[async_trait]
impl BrokerAdmin for KafkaConnection {
    async fn fetch_topic_offsets(
        &self,
        topic: &str,
    ) -> Result<Vec<PartitionWatermarks>, ConsumerError> {
        let partitions = self.fetch_topic_partitions(topic).await?;
        let topic = topic.to_string();
        let timeout = self.timeout;
        self.blocking(move |consumer| {
            partitions
                .into_iter()
                .map(|partition| -> Result<PartitionWatermarks, ConsumerError> {
                    let (low, high) = consumer
                        .fetch_watermarks(&topic, partition, timeout)
                        .map_err(|e| {
                            ConsumerError::Connection(format!(
                                "failed to fetch offsets of {}/{}: {}",
                                topic, partition, e
                            ))
                        })?;
                    Ok(PartitionWatermarks {
                        partition,
                        low,
                        high,
                    })
                })
                .collect()
        })
        .await
    }

    async fn fetch_topic_partitions(&self, topic: &str) -> Result<Vec<i32>, ConsumerError> {
        let topic = topic.to_string();
        let timeout = self.timeout;
        self.blocking(move |consumer| {
            let metadata = consumer
                .fetch_metadata(Some(topic.as_str()), timeout)
                .map_err(|e| ConsumerError::Connection(format!("failed to fetch metadata: {}", e)))?;
            let Some(entry) = metadata.topics().iter().find(|t| t.name() == topic) else {
                return Ok(Vec::new());
            };
            if let Some(err) = entry.error() {
                tracing::debug!(topic = %topic, "Topic metadata error: {:?}", err);
                return Ok(Vec::new());
            }
            Ok(entry.partitions().iter().map(|p| p.id()).collect())
        })
        .await
    }
}

#[async_trait]
impl BrokerConnection for KafkaConnection {
    async fn subscribe(&self, options: &SubscribeOptions) -> Result<(), ConsumerError> {
        match &self.strategy {
            AssignmentStrategy::Balanced => {
                self.consumer
                    .subscribe(&[options.topic.as_str()])
                    .map_err(|e| ConsumerError::Connection(format!("subscribe failed: {}", e)))?;
            }
            AssignmentStrategy::Fixed(_) => self.assign_fixed(options, &[])?,
        }
        tracing::debug!(
            client_id = %self.client_id,
            topic = %options.topic,
            strategy = self.strategy.protocol_name(),
            "Subscribed"
        );
        Ok(())
    }

    async fn subscribe_at(
        &self,
        options: &SubscribeOptions,
        seeks: &[SeekEntry],
    ) -> Result<(), ConsumerError> {
        if let AssignmentStrategy::Fixed(_) = &self.strategy {
            self.assign_fixed(options, seeks)?;
            tracing::debug!(
                client_id = %self.client_id,
                topic = %options.topic,
                positioned = seeks.len(),
                "Assigned partitions at starting offsets"
            );
            return Ok(());
        }
        self.subscribe(options).await?;
        for entry in seeks {
            self.seek(entry).await?;
        }
        Ok(())
    }

    fn run(&self) -> Result<mpsc::UnboundedReceiver<BrokerEvent>, ConsumerError> {
        let receiver = lock(&self.receiver)
            .take()
            .ok_or_else(|| ConsumerError::Connection("consumer already running".to_string()))?;

        let consumer = Arc::clone(&self.consumer);
        let events = self.events.clone();
        let pending = Arc::clone(&self.pending_seeks);
        let cancellation = self.cancellation.clone();
        let timeout = self.timeout;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = cancellation.cancelled() => break,

                    message = consumer.recv() => {
                        let event = match message {
                            Ok(message) => {
                                if apply_pending_seek(&consumer, &pending, &message, timeout) {
                                    continue;
                                }
                                BrokerEvent::Record(to_record(&message))
                            }
                            Err(e) => BrokerEvent::Error(ConsumerError::Delivery(e.to_string())),
                        };
                        if events.send(event).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(receiver)
    }

    async fn seek(&self, entry: &SeekEntry) -> Result<(), ConsumerError> {
        let target = entry.clone();
        let timeout = self.timeout;
        let result = self
            .blocking(move |consumer| {
                consumer
                    .seek(&target.topic, target.partition, Offset::Offset(target.offset), timeout)
                    .map_err(ConsumerError::from)
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(error) if matches!(self.strategy, AssignmentStrategy::Balanced) => {
                // Partition not assigned yet; applied when its first record arrives.
                tracing::debug!(
                    topic = %entry.topic,
                    partition = entry.partition,
                    "Deferring seek until assignment: {}",
                    error
                );
                lock(&self.pending_seeks).insert((entry.topic.clone(), entry.partition), entry.offset);
                Ok(())
            }
            Err(error) => Err(ConsumerError::Connection(format!(
                "seek to {}/{}@{} failed: {}",
                entry.topic, entry.partition, entry.offset, error
            ))),
        }
    }

    async fn disconnect(&self) -> Result<(), ConsumerError> {
        self.cancellation.cancel();
        self.consumer.unsubscribe();
        tracing::debug!(client_id = %self.client_id, "Disconnected from Kafka");
        Ok(())
    }
}

/// Builds the partition list of a fixed assignment.
///
/// Partitions with a resolved seek start there; the rest start according to
/// the subscription (beginning, end or the group's stored offset).
fn assignment_list(
    topic: &str,
    partitions: &BTreeSet<i32>,
    from_beginning: Option<bool>,
    seeks: &[SeekEntry],
) -> Result<TopicPartitionList, ConsumerError> {
    let start = match from_beginning {
        Some(true) => Offset::Beginning,
        Some(false) => Offset::End,
        None => Offset::Stored,
    };
    let mut tpl = TopicPartitionList::new();
    for &partition in partitions {
        let offset = seeks
            .iter()
            .find(|entry| entry.topic == topic && entry.partition == partition)
            .map_or(start, |entry| Offset::Offset(entry.offset));
        tpl.add_partition_offset(topic, partition, offset)?;
    }
    Ok(tpl)
}

/// Applies a deferred seek for the partition of `message`.
///
/// Returns `true` when the message precedes the requested offset and must be skipped.
fn apply_pending_seek<M: Message>(
    consumer: &ViewerConsumer,
    pending: &PendingSeeks,
    message: &M,
    timeout: Duration,
) -> bool {
    let key = (message.topic().to_string(), message.partition());
    let Some(offset) = lock(pending).remove(&key) else {
        return false;
    };
    if message.offset() == offset {
        return false;
    }
    if let Err(e) = consumer.seek(&key.0, key.1, Offset::Offset(offset), timeout) {
        tracing::warn!(topic = %key.0, partition = key.1, "Deferred seek failed: {}", e);
        return false;
    }
    true
}

fn to_record<M: Message>(message: &M) -> ConsumedRecord {
    ConsumedRecord {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(bytes::Bytes::copy_from_slice),
        value: message.payload().map(bytes::Bytes::copy_from_slice),
        timestamp: message
            .timestamp()
            .to_millis()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::locator::{ConsumerIdentity, OffsetPolicy};
    use crate::consumer::settings::{ClusterSettings, ConsumerSettings, MockClusterLookup};
    use rdkafka::message::{OwnedMessage, Timestamp};

    #[test]
    fn test_to_record_copies_message() {
        let message = OwnedMessage::new(
            Some(b"value".to_vec()),
            Some(b"key".to_vec()),
            "orders".to_string(),
            Timestamp::CreateTime(1_700_000_000_000),
            3,
            42,
            None,
        );

        let record = to_record(&message);

        assert_eq!(record.topic, "orders");
        assert_eq!(record.partition, 3);
        assert_eq!(record.offset, 42);
        assert_eq!(record.key_str().as_deref(), Some("key"));
        assert_eq!(record.value_str().as_deref(), Some("value"));
        assert_eq!(record.timestamp.unwrap().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_to_record_tombstone_without_timestamp() {
        let message = OwnedMessage::new(
            None,
            None,
            "orders".to_string(),
            Timestamp::NotAvailable,
            0,
            7,
            None,
        );

        let record = to_record(&message);

        assert!(record.is_tombstone());
        assert_eq!(record.key, None);
        assert_eq!(record.timestamp, None);
    }

    #[test]
    fn test_rebalance_hooks_report_status() {
        let (events, mut receiver) = mpsc::unbounded_channel();
        let context = ViewerContext { events };
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition("orders", 0);

        context.pre_rebalance(&Rebalance::Revoke(&tpl));
        context.post_rebalance(&Rebalance::Revoke(&tpl));
        context.pre_rebalance(&Rebalance::Assign(&tpl));
        context.post_rebalance(&Rebalance::Assign(&tpl));

        assert_eq!(
            receiver.try_recv().unwrap(),
            BrokerEvent::Status(ConsumerStatus::Rebalancing)
        );
        assert_eq!(
            receiver.try_recv().unwrap(),
            BrokerEvent::Status(ConsumerStatus::Rebalancing)
        );
        assert_eq!(
            receiver.try_recv().unwrap(),
            BrokerEvent::Status(ConsumerStatus::Rebalanced)
        );
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_assignment_list_starts_at_resolved_offsets() {
        let partitions: BTreeSet<i32> = [0, 1, 2].into_iter().collect();
        let seeks = vec![
            SeekEntry { topic: "orders".to_string(), partition: 0, offset: 100 },
            SeekEntry { topic: "orders".to_string(), partition: 2, offset: 7 },
        ];

        let tpl = assignment_list("orders", &partitions, None, &seeks).unwrap();

        assert_eq!(tpl.count(), 3);
        let offset_of = |partition| tpl.find_partition("orders", partition).unwrap().offset();
        assert_eq!(offset_of(0), Offset::Offset(100));
        assert_eq!(offset_of(1), Offset::Stored);
        assert_eq!(offset_of(2), Offset::Offset(7));
    }

    #[test]
    fn test_assignment_list_without_seeks_uses_subscription_start() {
        let partitions: BTreeSet<i32> = [3].into_iter().collect();

        let earliest = assignment_list("orders", &partitions, Some(true), &[]).unwrap();
        let latest = assignment_list("orders", &partitions, Some(false), &[]).unwrap();

        assert_eq!(earliest.find_partition("orders", 3).unwrap().offset(), Offset::Beginning);
        assert_eq!(latest.find_partition("orders", 3).unwrap().offset(), Offset::End);
    }

    #[tokio::test]
    async fn test_connect_unreachable_cluster_fails() {
        let mut lookup = MockClusterLookup::new();
        lookup
            .expect_cluster()
            .returning(|_| Some(ClusterSettings::new("c", "127.0.0.1:1")));
        let settings = ConsumerSettings {
            retries: 1,
            metadata_timeout_ms: 200,
            ..ConsumerSettings::default()
        };
        let identity =
            ConsumerIdentity::new("c", "g", "t").with_from_offset(OffsetPolicy::Earliest);
        let options = ConsumerOptions::new(&identity, &lookup, &settings).unwrap();

        let result = KafkaConnector::new()
            .connect(&options, &AssignmentStrategy::Balanced)
            .await;

        assert!(matches!(result, Err(ConsumerError::Connection(_))));
    }
}
