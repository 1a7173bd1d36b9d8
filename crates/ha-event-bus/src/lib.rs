//! Event bus and signal dispatcher for Home Assistant
//!
//! This crate provides the two in-process messaging primitives of the host:
//!
//! - [`EventBus`] carries named, JSON-payload events such as
//!   `homeassistant_start` to any number of subscribers.
//! - [`Dispatcher`] carries typed payloads on string-named signals, used for
//!   internal notifications that never leave the process (for example
//!   "a discovered config entry was removed").

mod dispatcher;

pub use dispatcher::{Dispatcher, SharedDispatcher};

use dashmap::DashMap;
use ha_core::{Event, EventType};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Default channel capacity for event subscriptions
pub(crate) const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// A unique identifier for an event listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// The event bus for publishing and subscribing to events
///
/// Subscribers get a broadcast receiver per event type; `*` subscribers
/// receive everything. Firing never blocks and never fails: events fired
/// with nobody listening are dropped.
pub struct EventBus {
    /// Map of event types to their broadcast senders
    listeners: DashMap<EventType, broadcast::Sender<Event<serde_json::Value>>>,
    /// Sender for MATCH_ALL subscribers
    match_all_sender: broadcast::Sender<Event<serde_json::Value>>,
    next_listener_id: AtomicU64,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (match_all_sender, _) = broadcast::channel(capacity);
        Self {
            listeners: DashMap::new(),
            match_all_sender,
            next_listener_id: AtomicU64::new(1),
            capacity,
        }
    }

    /// Subscribe to events of a specific type
    pub fn subscribe(
        &self,
        event_type: impl Into<EventType>,
    ) -> broadcast::Receiver<Event<serde_json::Value>> {
        let event_type = event_type.into();
        trace!(event_type = %event_type, "Subscribing to event type");

        if event_type.is_match_all() {
            return self.match_all_sender.subscribe();
        }

        self.listeners
            .entry(event_type)
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(self.capacity);
                tx
            })
            .subscribe()
    }

    /// Subscribe to all events
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event<serde_json::Value>> {
        self.match_all_sender.subscribe()
    }

    /// Run `handler` for the next event of `event_type`, then stop listening
    ///
    /// The subscription is taken before this returns, so an event fired right
    /// after the call is not missed. Must be called inside a tokio runtime.
    pub fn listen_once<F, Fut>(&self, event_type: impl Into<EventType>, handler: F) -> JoinHandle<()>
    where
        F: FnOnce(Event<serde_json::Value>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let event_type = event_type.into();
        let mut rx = self.subscribe(event_type.clone());
        let id = self.next_listener_id();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        debug!(event_type = %event_type, listener = ?id, "One-time listener fired");
                        handler(event).await;
                        return;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(event_type = %event_type, "One-time listener lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(event_type = %event_type, "Event bus closed before listener fired");
                        return;
                    }
                }
            }
        })
    }

    /// Fire an event to every subscriber of its type and to MATCH_ALL subscribers
    pub fn fire(&self, event: Event<serde_json::Value>) {
        debug!(event_type = %event.event_type, "Firing event");

        if let Some(sender) = self.listeners.get(&event.event_type) {
            // A send error only means nobody is listening
            let _ = sender.send(event.clone());
        }

        let _ = self.match_all_sender.send(event);
    }

    pub fn next_listener_id(&self) -> ListenerId {
        ListenerId(self.next_listener_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Number of event types that have been subscribed to
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for EventBus
pub type SharedEventBus = Arc<EventBus>;
