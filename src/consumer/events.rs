//! Typed synchronous publish/subscribe channels.
//!
//! Each event kind (records, errors, status changes, collection changes) gets
//! its own [`EventEmitter`]. Listeners are invoked synchronously, in
//! registration order, on the thread that fires the event. Disposing an
//! emitter drops every listener and turns later fires into no-ops.

use std::sync::{Arc, Mutex, MutexGuard};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle returned by [`EventEmitter::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

struct EmitterState<T> {
    next_id: u64,
    listeners: Vec<(u64, Listener<T>)>,
    disposed: bool,
}

/// A broadcast channel for one event type.
pub struct EventEmitter<T> {
    state: Mutex<EmitterState<T>>,
}

impl<T> EventEmitter<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EmitterState {
                next_id: 0,
                listeners: Vec::new(),
                disposed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EmitterState<T>> {
        // A panicking listener never runs under the lock, so the state stays consistent
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a listener.
    ///
    /// Listeners added after [`dispose`](Self::dispose) are never called.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        if !state.disposed {
            state.listeners.push((id, Arc::new(listener)));
        }
        Subscription(id)
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut state = self.lock();
        let before = state.listeners.len();
        state.listeners.retain(|(id, _)| *id != subscription.0);
        state.listeners.len() != before
    }

    /// Delivers an event to every current listener in registration order.
    ///
    /// The listener list is snapshotted first, so listeners may subscribe or
    /// unsubscribe from inside a callback.
    pub fn fire(&self, event: &T) {
        let listeners: Vec<Listener<T>> = self
            .lock()
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Drops every listener; later fires deliver nothing.
    pub fn dispose(&self) {
        let mut state = self.lock();
        state.disposed = true;
        state.listeners.clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }
}

impl<T> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for EventEmitter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("EventEmitter")
            .field("listeners", &state.listeners.len())
            .field("disposed", &state.disposed)
            .finish()
    }
}
