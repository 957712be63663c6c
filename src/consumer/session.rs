//! A single viewer session.
//!
//! A [`ConsumerSession`] is built from a locator, joins its consumer group
//! on [`start`](ConsumerSession::start), positions itself with the resolved
//! seeks and forwards broker events to its three emitters. The launch state
//! lives in a `watch` channel so the registry can wait for a start to settle.

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::assignment::AssignmentStrategy;
use super::broker::{BrokerConnection, BrokerConnector, BrokerEvent};
use super::error::ConsumerError;
use super::events::EventEmitter;
use super::locator::ConsumerLocator;
use super::offsets::{resolve_seeks, SeekEntry, SubscribeOptions};
use super::record::{ConsumerChangedStatusEvent, ConsumerErrorEvent, RecordReceivedEvent};
use super::settings::{ClusterLookup, ConsumerOptions, ConsumerSettings};

/// Lifecycle of a session as seen by the registry.
///
/// `None` is both the initial state and the state after a failed start.
/// `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerLaunchState {
    None,
    Starting,
    Started,
    Closing,
    Closed,
}

impl fmt::Display for ConsumerLaunchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

struct SessionEmitters {
    records: EventEmitter<RecordReceivedEvent>,
    errors: EventEmitter<ConsumerErrorEvent>,
    status: EventEmitter<ConsumerChangedStatusEvent>,
}

/// One addressable consumer group member reading one topic.
pub struct ConsumerSession {
    locator: ConsumerLocator,
    options: ConsumerOptions,
    strategy: AssignmentStrategy,
    state: watch::Sender<ConsumerLaunchState>,
    error: Arc<Mutex<Option<ConsumerError>>>,
    connection: tokio::sync::Mutex<Option<Box<dyn BrokerConnection>>>,
    cancellation: CancellationToken,
    emitters: Arc<SessionEmitters>,
}

impl ConsumerSession {
    /// Builds a session for a locator.
    ///
    /// # Arguments
    ///
    /// * `locator` - Address of the session
    /// * `clusters` - Cluster settings lookup
    /// * `settings` - Consumer defaults
    ///
    /// # Errors
    ///
    /// Returns `ConsumerError::InvalidLocator` or `ConsumerError::InvalidOffset`
    /// for a malformed locator, `ConsumerError::UnknownCluster` if its cluster
    /// is not configured, and `ConsumerError::Partitions` for a malformed
    /// partition expression.
    pub fn new(
        locator: ConsumerLocator,
        clusters: &dyn ClusterLookup,
        settings: &ConsumerSettings,
    ) -> Result<Self, ConsumerError> {
        let identity = locator.identity()?;
        let options = ConsumerOptions::new(&identity, clusters, settings)?;
        let strategy = AssignmentStrategy::for_partitions(options.partitions.as_ref());

        Ok(Self {
            locator,
            options,
            strategy,
            state: watch::Sender::new(ConsumerLaunchState::None),
            error: Arc::new(Mutex::new(None)),
            connection: tokio::sync::Mutex::new(None),
            cancellation: CancellationToken::new(),
            emitters: Arc::new(SessionEmitters {
                records: EventEmitter::new(),
                errors: EventEmitter::new(),
                status: EventEmitter::new(),
            }),
        })
    }

    pub fn locator(&self) -> &ConsumerLocator {
        &self.locator
    }

    pub fn options(&self) -> &ConsumerOptions {
        &self.options
    }

    pub fn strategy(&self) -> &AssignmentStrategy {
        &self.strategy
    }

    pub fn cluster_id(&self) -> &str {
        &self.options.cluster.id
    }

    pub fn consumer_group_id(&self) -> &str {
        &self.options.consumer_group_id
    }

    pub fn topic_id(&self) -> &str {
        &self.options.topic_id
    }

    /// Current launch state.
    pub fn state(&self) -> ConsumerLaunchState {
        *self.state.borrow()
    }

    /// Receiver that observes every launch state change.
    pub fn watch_state(&self) -> watch::Receiver<ConsumerLaunchState> {
        self.state.subscribe()
    }

    /// Last fatal error, if any.
    pub fn error(&self) -> Option<ConsumerError> {
        lock(&self.error).clone()
    }

    /// Records received by this session.
    pub fn records(&self) -> &EventEmitter<RecordReceivedEvent> {
        &self.emitters.records
    }

    /// Errors raised while the session runs.
    pub fn errors(&self) -> &EventEmitter<ConsumerErrorEvent> {
        &self.emitters.errors
    }

    /// Group membership status changes.
    pub fn status_changes(&self) -> &EventEmitter<ConsumerChangedStatusEvent> {
        &self.emitters.status
    }

    /// Moves to a new launch state. `Closed` is never left.
    ///
    /// Returns `false` if the state did not change.
    pub(crate) fn set_state(&self, next: ConsumerLaunchState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ConsumerLaunchState::Closed || *state == next {
                return false;
            }
            *state = next;
            true
        })
    }

    /// Moves `Started` to `Closing`. Returns `false` from any other state.
    pub(crate) fn begin_closing(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state != ConsumerLaunchState::Started {
                return false;
            }
            *state = ConsumerLaunchState::Closing;
            true
        })
    }

    /// Waits until the session is no longer `Starting`.
    pub(crate) async fn wait_until_settled(&self) {
        let mut state = self.state.subscribe();
        let _ = state
            .wait_for(|state| *state != ConsumerLaunchState::Starting)
            .await;
    }

    pub(crate) fn set_error(&self, error: ConsumerError) {
        *lock(&self.error) = Some(error);
    }

    /// Connects, subscribes, starts consuming and applies the starting seeks.
    ///
    /// The connection is released on every failure path, and the error is
    /// recorded on the session before it is returned.
    ///
    /// # Errors
    ///
    /// Returns the first connect, subscribe, metadata or seek failure.
    pub async fn start(&self, connector: &dyn BrokerConnector) -> Result<(), ConsumerError> {
        tracing::debug!(
            locator = %self.locator,
            strategy = self.strategy.protocol_name(),
            "Starting consumer"
        );

        let result = match connector.connect(&self.options, &self.strategy).await {
            Ok(connection) => {
                let joined = self.join(connection.as_ref()).await;
                *self.connection.lock().await = Some(connection);
                joined
            }
            Err(error) => Err(error),
        };

        if let Err(error) = &result {
            tracing::error!(locator = %self.locator, "Failed to start consumer: {}", error);
            self.set_error(error.clone());
            self.dispose().await;
        }
        result
    }

    async fn join(&self, connection: &dyn BrokerConnection) -> Result<(), ConsumerError> {
        let topic = &self.options.topic_id;
        let policy = self.options.from_offset;
        let subscription = SubscribeOptions::new(topic, policy);

        if let AssignmentStrategy::Fixed(_) = &self.strategy {
            // Fixed partitions are owned as soon as they are assigned.
            let seeks =
                resolve_seeks(connection, topic, policy, self.options.partitions.as_ref()).await?;
            self.log_seeks(&seeks);
            connection.subscribe_at(&subscription, &seeks).await?;
            self.spawn_forwarder(connection.run()?);
            return Ok(());
        }

        connection.subscribe(&subscription).await?;
        self.spawn_forwarder(connection.run()?);

        let seeks = resolve_seeks(connection, topic, policy, self.options.partitions.as_ref()).await?;
        self.log_seeks(&seeks);
        for entry in &seeks {
            connection.seek(entry).await?;
        }
        Ok(())
    }

    fn log_seeks(&self, seeks: &[SeekEntry]) {
        for entry in seeks {
            tracing::debug!(
                locator = %self.locator,
                partition = entry.partition,
                offset = entry.offset,
                "Seeking"
            );
        }
    }

    fn spawn_forwarder(&self, mut events: mpsc::UnboundedReceiver<BrokerEvent>) {
        let cancellation = self.cancellation.clone();
        let emitters = Arc::clone(&self.emitters);
        let error = Arc::clone(&self.error);
        let locator = self.locator.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = cancellation.cancelled() => break,

                    event = events.recv() => {
                        let Some(event) = event else {
                            break;
                        };
                        match event {
                            BrokerEvent::Record(record) => {
                                emitters.records.fire(&RecordReceivedEvent {
                                    locator: locator.clone(),
                                    record,
                                });
                            }
                            BrokerEvent::Status(status) => {
                                tracing::debug!(locator = %locator, %status, "Consumer status changed");
                                emitters.status.fire(&ConsumerChangedStatusEvent {
                                    locator: locator.clone(),
                                    status,
                                });
                            }
                            BrokerEvent::Error(err) => {
                                if err.is_fatal() {
                                    tracing::error!(locator = %locator, "Consumer error: {}", err);
                                    *lock(&error) = Some(err.clone());
                                } else {
                                    tracing::warn!(locator = %locator, "Consumer error: {}", err);
                                }
                                emitters.errors.fire(&ConsumerErrorEvent {
                                    locator: locator.clone(),
                                    error: err,
                                });
                            }
                        }
                    }
                }
            }
            tracing::trace!(locator = %locator, "Event forwarding stopped");
        });
    }

    /// Stops event delivery, disconnects and drops every listener.
    ///
    /// Safe to call more than once.
    pub async fn dispose(&self) {
        self.cancellation.cancel();

        let connection = self.connection.lock().await.take();
        if let Some(connection) = connection {
            if let Err(error) = connection.disconnect().await {
                tracing::warn!(locator = %self.locator, "Failed to disconnect consumer: {}", error);
            }
        }

        self.emitters.records.dispose();
        self.emitters.errors.dispose();
        self.emitters.status.dispose();
    }
}

impl fmt::Debug for ConsumerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerSession")
            .field("locator", &self.locator)
            .field("state", &self.state())
            .field("strategy", &self.strategy.protocol_name())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
