//! Scripted in-process broker for tests.
//!
//! [`FakeBroker`] implements [`BrokerConnector`] and [`BrokerAdmin`]. It
//! records every call, serves watermarks and partition lists configured up
//! front, and can be told to fail a given step. Events pushed with
//! [`FakeBroker::emit`] reach every running connection.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

use super::assignment::AssignmentStrategy;
use super::broker::{BrokerAdmin, BrokerConnection, BrokerConnector, BrokerEvent};
use super::error::ConsumerError;
use super::offsets::{PartitionWatermarks, SeekEntry, SubscribeOptions};
use super::record::{ConsumedRecord, ConsumerStatus};
use super::settings::ConsumerOptions;

/// One recorded broker interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum FakeCall {
    Connect {
        cluster_id: String,
        group_id: String,
        strategy: AssignmentStrategy,
    },
    Subscribe(SubscribeOptions),
    Run,
    FetchOffsets(String),
    FetchPartitions(String),
    Seek(SeekEntry),
    Disconnect,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<FakeCall>,
    watermarks: HashMap<String, Vec<PartitionWatermarks>>,
    partitions: HashMap<String, Vec<i32>>,
    connect_error: Option<ConsumerError>,
    subscribe_error: Option<ConsumerError>,
    seek_error: Option<ConsumerError>,
    connect_delay: Option<Duration>,
    backlog: Vec<ConsumedRecord>,
    senders: Vec<mpsc::UnboundedSender<BrokerEvent>>,
    open: usize,
}

/// Shared handle to a scripted broker.
#[derive(Clone, Default)]
pub struct FakeBroker {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Serves `(partition, low, high)` watermarks for a topic.
    pub fn with_watermarks(self, topic: &str, watermarks: &[(i32, i64, i64)]) -> Self {
        let entries = watermarks
            .iter()
            .map(|&(partition, low, high)| PartitionWatermarks {
                partition,
                low,
                high,
            })
            .collect();
        self.lock().watermarks.insert(topic.to_string(), entries);
        self
    }

    /// Serves a partition list for a topic.
    pub fn with_partitions(self, topic: &str, partitions: &[i32]) -> Self {
        self.lock()
            .partitions
            .insert(topic.to_string(), partitions.to_vec());
        self
    }

    pub fn fail_connect_with(self, error: ConsumerError) -> Self {
        self.lock().connect_error = Some(error);
        self
    }

    pub fn fail_subscribe_with(self, error: ConsumerError) -> Self {
        self.lock().subscribe_error = Some(error);
        self
    }

    pub fn fail_seek_with(self, error: ConsumerError) -> Self {
        self.lock().seek_error = Some(error);
        self
    }

    /// Queues records that every new connection delivers as soon as it runs.
    pub fn with_backlog(self, records: Vec<ConsumedRecord>) -> Self {
        self.lock().backlog = records;
        self
    }

    /// Makes every connect wait before completing.
    pub fn with_connect_delay(self, delay: Duration) -> Self {
        self.lock().connect_delay = Some(delay);
        self
    }

    /// Returns every recorded call, oldest first.
    pub fn calls(&self) -> Vec<FakeCall> {
        self.lock().calls.clone()
    }

    /// Returns the recorded seeks, oldest first.
    pub fn seeks(&self) -> Vec<SeekEntry> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                FakeCall::Seek(entry) => Some(entry.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of connections made and not yet disconnected.
    pub fn open_connections(&self) -> usize {
        self.lock().open
    }

    /// Delivers an event to every running connection.
    pub fn emit(&self, event: BrokerEvent) {
        let mut state = self.lock();
        state
            .senders
            .retain(|sender| sender.send(event.clone()).is_ok());
    }

    fn record(&self, call: FakeCall) {
        self.lock().calls.push(call);
    }
}

#[async_trait]
impl BrokerAdmin for FakeBroker {
    async fn fetch_topic_offsets(
        &self,
        topic: &str,
    ) -> Result<Vec<PartitionWatermarks>, ConsumerError> {
        self.record(FakeCall::FetchOffsets(topic.to_string()));
        Ok(self.lock().watermarks.get(topic).cloned().unwrap_or_default())
    }

    async fn fetch_topic_partitions(&self, topic: &str) -> Result<Vec<i32>, ConsumerError> {
        self.record(FakeCall::FetchPartitions(topic.to_string()));
        Ok(self.lock().partitions.get(topic).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl BrokerConnector for FakeBroker {
    async fn connect(
        &self,
        options: &ConsumerOptions,
        strategy: &AssignmentStrategy,
    ) -> Result<Box<dyn BrokerConnection>, ConsumerError> {
        let delay = self.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(FakeCall::Connect {
            cluster_id: options.cluster.id.clone(),
            group_id: options.consumer_group_id.clone(),
            strategy: strategy.clone(),
        });

        let failure = self.lock().connect_error.clone();
        if let Some(error) = failure {
            return Err(error);
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        // The receiver is buffered until run() hands it out.
        let _ = sender.send(BrokerEvent::Status(ConsumerStatus::Created));
        let mut state = self.lock();
        for record in &state.backlog {
            let _ = sender.send(BrokerEvent::Record(record.clone()));
        }
        state.open += 1;
        state.senders.push(sender);
        drop(state);

        Ok(Box::new(FakeConnection {
            broker: self.clone(),
            receiver: Mutex::new(Some(receiver)),
        }))
    }
}

/// Connection handed out by [`FakeBroker`].
struct FakeConnection {
    broker: FakeBroker,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<BrokerEvent>>>,
}

#[async_trait]
impl BrokerAdmin for FakeConnection {
    async fn fetch_topic_offsets(
        &self,
        topic: &str,
    ) -> Result<Vec<PartitionWatermarks>, ConsumerError> {
        self.broker.fetch_topic_offsets(topic).await
    }

    async fn fetch_topic_partitions(&self, topic: &str) -> Result<Vec<i32>, ConsumerError> {
        self.broker.fetch_topic_partitions(topic).await
    }
}

#[async_trait]
impl BrokerConnection for FakeConnection {
    async fn subscribe(&self, options: &SubscribeOptions) -> Result<(), ConsumerError> {
        self.broker.record(FakeCall::Subscribe(options.clone()));
        match self.broker.lock().subscribe_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn run(&self) -> Result<mpsc::UnboundedReceiver<BrokerEvent>, ConsumerError> {
        self.broker.record(FakeCall::Run);
        self.receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or_else(|| ConsumerError::Connection("consumer already running".to_string()))
    }

    async fn seek(&self, entry: &SeekEntry) -> Result<(), ConsumerError> {
        self.broker.record(FakeCall::Seek(entry.clone()));
        match self.broker.lock().seek_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) -> Result<(), ConsumerError> {
        self.broker.record(FakeCall::Disconnect);
        let mut state = self.broker.lock();
        state.open = state.open.saturating_sub(1);
        Ok(())
    }
}
