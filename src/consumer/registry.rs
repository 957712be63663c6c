//! Registry of viewer sessions keyed by locator.
//!
//! The registry owns every live [`ConsumerSession`], drives its launch state
//! and announces each transition on a collection-changed emitter. Those
//! announcements go through a single dispatcher task, so listeners see them
//! in the order the transitions happened. The announcement that follows a
//! start is held until `settle_delay` after it was queued; delays of
//! concurrent starts overlap and do not add up.
//!
//! Close requests made while a session is starting wait for the start to
//! settle; a start that failed has already removed the session, and the
//! close is then a no-op.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::broker::BrokerConnector;
use super::error::ConsumerError;
use super::events::{EventEmitter, Subscription};
use super::locator::ConsumerLocator;
use super::session::{ConsumerLaunchState, ConsumerSession};
use super::settings::{ClusterLookup, ConsumerSettings};

/// Announces that sessions entered a new launch state.
#[derive(Debug, Clone)]
pub struct ConsumerCollectionChangedEvent {
    pub consumers: Vec<Arc<ConsumerSession>>,
    /// State at the moment of the transition
    pub state: ConsumerLaunchState,
}

struct Notification {
    event: ConsumerCollectionChangedEvent,
    deliver_at: Instant,
}

/// Collection of live viewer sessions.
///
/// Must be created inside a Tokio runtime: construction spawns the
/// dispatcher task that delivers collection-changed events.
pub struct ConsumerRegistry {
    clusters: Arc<dyn ClusterLookup>,
    settings: ConsumerSettings,
    default_connector: Arc<dyn BrokerConnector>,
    providers: HashMap<String, Arc<dyn BrokerConnector>>,
    sessions: RwLock<HashMap<ConsumerLocator, Arc<ConsumerSession>>>,
    collection_changed: Arc<EventEmitter<ConsumerCollectionChangedEvent>>,
    notifications: mpsc::UnboundedSender<Notification>,
}

impl ConsumerRegistry {
    /// Creates an empty registry.
    ///
    /// # Arguments
    ///
    /// * `clusters` - Cluster settings lookup
    /// * `settings` - Consumer defaults applied to every session
    /// * `connector` - Connector used by clusters without a connection provider
    pub fn new(
        clusters: Arc<dyn ClusterLookup>,
        settings: ConsumerSettings,
        connector: Arc<dyn BrokerConnector>,
    ) -> Self {
        let collection_changed = Arc::new(EventEmitter::new());
        let (notifications, receiver) = mpsc::unbounded_channel();
        spawn_dispatcher(receiver, Arc::clone(&collection_changed));

        Self {
            clusters,
            settings,
            default_connector: connector,
            providers: HashMap::new(),
            sessions: RwLock::new(HashMap::new()),
            collection_changed,
            notifications,
        }
    }

    /// Registers a named connection provider.
    pub fn with_connection_provider(
        mut self,
        name: &str,
        connector: Arc<dyn BrokerConnector>,
    ) -> Self {
        self.providers.insert(name.to_string(), connector);
        self
    }

    /// Creates, registers and starts a session.
    ///
    /// Listeners see `Starting`, then `Started` after the settle delay, or
    /// `None` if the start failed.
    ///
    /// # Errors
    ///
    /// Construction errors (`UnknownCluster`, `UnknownConnectionProvider`,
    /// `Partitions`, malformed locators) are returned before anything is
    /// registered. Start errors are recorded on the session, which is then
    /// removed from the registry, and returned.
    pub async fn create(
        &self,
        locator: &ConsumerLocator,
    ) -> Result<Arc<ConsumerSession>, ConsumerError> {
        self.create_with(locator, |_| {}).await
    }

    /// Same as [`create`](Self::create), but hands the session to `attach`
    /// before it starts.
    ///
    /// Listeners registered on the session's emitters inside `attach` see
    /// every status change and record, including those delivered while the
    /// session is still starting. `attach` is not called when construction
    /// fails.
    ///
    /// # Errors
    ///
    /// Same as [`create`](Self::create).
    pub async fn create_with<F>(
        &self,
        locator: &ConsumerLocator,
        attach: F,
    ) -> Result<Arc<ConsumerSession>, ConsumerError>
    where
        F: FnOnce(&ConsumerSession) + Send,
    {
        let session = Arc::new(ConsumerSession::new(
            locator.clone(),
            self.clusters.as_ref(),
            &self.settings,
        )?);
        let connector = self.connector_for(&session)?;
        attach(&session);

        self.warn_on_group_conflict(&session);
        self.write().insert(locator.clone(), Arc::clone(&session));
        session.set_state(ConsumerLaunchState::Starting);
        self.notify(&session, ConsumerLaunchState::Starting, Duration::ZERO);

        match session.start(connector.as_ref()).await {
            Ok(()) => {
                tracing::info!(locator = %locator, "Consumer started");
                session.set_state(ConsumerLaunchState::Started);
                self.notify(
                    &session,
                    ConsumerLaunchState::Started,
                    self.settings.settle_delay(),
                );
                Ok(session)
            }
            Err(error) => {
                self.remove(&session);
                session.set_error(error.clone());
                session.set_state(ConsumerLaunchState::None);
                self.notify(
                    &session,
                    ConsumerLaunchState::None,
                    self.settings.settle_delay(),
                );
                Err(error)
            }
        }
    }

    /// Closes and removes a session. Unknown locators are ignored.
    pub async fn close(&self, locator: &ConsumerLocator) {
        let Some(session) = self.get(locator) else {
            return;
        };

        session.wait_until_settled().await;
        if !session.begin_closing() {
            tracing::debug!(
                locator = %locator,
                state = %session.state(),
                "Consumer not running, nothing to close"
            );
            return;
        }
        self.notify(&session, ConsumerLaunchState::Closing, Duration::ZERO);

        session.dispose().await;
        self.remove(&session);
        session.set_state(ConsumerLaunchState::Closed);
        self.notify(&session, ConsumerLaunchState::Closed, Duration::ZERO);
        tracing::info!(locator = %locator, "Consumer closed");
    }

    pub fn get(&self, locator: &ConsumerLocator) -> Option<Arc<ConsumerSession>> {
        self.read().get(locator).cloned()
    }

    pub fn get_all(&self) -> Vec<Arc<ConsumerSession>> {
        let mut sessions: Vec<_> = self.read().values().cloned().collect();
        sessions.sort_by(|a, b| a.locator().cmp(b.locator()));
        sessions
    }

    /// Returns the first session of a cluster and consumer group.
    pub fn get_by_group_id(
        &self,
        cluster_id: &str,
        consumer_group_id: &str,
    ) -> Option<Arc<ConsumerSession>> {
        self.get_all().into_iter().find(|session| {
            session.cluster_id() == cluster_id && session.consumer_group_id() == consumer_group_id
        })
    }

    pub fn has(&self, locator: &ConsumerLocator) -> bool {
        self.read().contains_key(locator)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Registers a collection-changed listener.
    pub fn on_collection_changed<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ConsumerCollectionChangedEvent) + Send + Sync + 'static,
    {
        self.collection_changed.subscribe(listener)
    }

    pub fn collection_changed(&self) -> &EventEmitter<ConsumerCollectionChangedEvent> {
        &self.collection_changed
    }

    /// Disposes every session and the collection-changed emitter.
    pub async fn dispose(&self) {
        let sessions: Vec<_> = self.write().drain().map(|(_, session)| session).collect();
        for session in sessions {
            session.dispose().await;
            session.set_state(ConsumerLaunchState::Closed);
        }
        self.collection_changed.dispose();
    }

    fn connector_for(
        &self,
        session: &ConsumerSession,
    ) -> Result<Arc<dyn BrokerConnector>, ConsumerError> {
        match &session.options().cluster.connection_provider {
            Some(name) => self
                .providers
                .get(name)
                .cloned()
                .ok_or_else(|| ConsumerError::UnknownConnectionProvider(name.clone())),
            None => Ok(Arc::clone(&self.default_connector)),
        }
    }

    fn warn_on_group_conflict(&self, session: &ConsumerSession) {
        let requested = session.strategy().fixed_partitions();
        for other in self.read().values() {
            if other.cluster_id() == session.cluster_id()
                && other.consumer_group_id() == session.consumer_group_id()
                && other.locator() != session.locator()
                && other.strategy().fixed_partitions() != requested
            {
                tracing::warn!(
                    group = session.consumer_group_id(),
                    existing = %other.locator(),
                    requested = %session.locator(),
                    "Consumer group already viewed with a different partition selection; \
                     the latest assignment wins"
                );
            }
        }
    }

    fn remove(&self, session: &Arc<ConsumerSession>) {
        let mut sessions = self.write();
        if let Some(current) = sessions.get(session.locator()) {
            if Arc::ptr_eq(current, session) {
                sessions.remove(session.locator());
            }
        }
    }

    fn notify(&self, session: &Arc<ConsumerSession>, state: ConsumerLaunchState, delay: Duration) {
        let notification = Notification {
            event: ConsumerCollectionChangedEvent {
                consumers: vec![Arc::clone(session)],
                state,
            },
            deliver_at: Instant::now() + delay,
        };
        if self.notifications.send(notification).is_err() {
            tracing::debug!("Collection-changed dispatcher stopped, event dropped");
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConsumerLocator, Arc<ConsumerSession>>> {
        self.sessions.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConsumerLocator, Arc<ConsumerSession>>> {
        self.sessions.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn spawn_dispatcher(
    mut notifications: mpsc::UnboundedReceiver<Notification>,
    emitter: Arc<EventEmitter<ConsumerCollectionChangedEvent>>,
) {
    tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            tokio::time::sleep_until(notification.deliver_at).await;
            emitter.fire(&notification.event);
        }
    });
}
