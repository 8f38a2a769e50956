//! Process-wide publish/subscribe channel.
//!
//! The sync engine, the commit handler and display consumers never call each
//! other directly; they exchange [`DrawerEvent`]s through an [`EventBus`].
//!
//! Delivery rules:
//! - every subscriber sees every event, in registration order
//! - a subscriber that returns an error is logged and skipped; later
//!   subscribers still receive the event
//! - channel subscribers whose receiver was dropped are pruned on the next emit
//!
//! Handlers run synchronously inside [`EventBus::emit`]. Anything that needs
//! to await should subscribe with [`EventBus::subscribe_channel`] and consume
//! the receiver from its own task.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::model::{AppState, Canvas, CanvasId, Element};

/// Payload captured from the host when a debounced sync fires.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPayload {
    pub elements: Vec<Element>,
    pub app_state: AppState,
    /// Working selection at the moment the change was first observed.
    pub origin_canvas_id: Option<CanvasId>,
}

/// Domain events exchanged between the core and its observers.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawerEvent {
    /// A canvas was written into host storage.
    CanvasLoaded(Canvas),
    /// The host document drifted; the payload is waiting to be committed.
    SyncRequested(SyncPayload),
    /// The working selection moved to this canvas.
    CanvasSelected(Canvas),
    /// A commit persisted a new version of this canvas.
    CanvasSaved(Canvas),
    /// A canvas was removed from the store.
    CanvasDeleted(CanvasId),
    /// Project membership or names changed.
    ProjectsChanged,
    /// A workflow failed in a way the user should hear about.
    ErrorOccurred { error: String, details: Option<Value> },
}

impl DrawerEvent {
    /// Short topic name for logs.
    #[must_use]
    pub const fn topic(&self) -> &'static str {
        match self {
            Self::CanvasLoaded(_) => "canvas_loaded",
            Self::SyncRequested(_) => "sync_requested",
            Self::CanvasSelected(_) => "canvas_selected",
            Self::CanvasSaved(_) => "canvas_saved",
            Self::CanvasDeleted(_) => "canvas_deleted",
            Self::ProjectsChanged => "projects_changed",
            Self::ErrorOccurred { .. } => "error_occurred",
        }
    }
}

/// Opaque handle returned by `subscribe*`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&DrawerEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Clone)]
enum Subscriber {
    Callback(Handler),
    Channel(mpsc::UnboundedSender<DrawerEvent>),
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
}

/// Cheaply clonable event bus. Clones share one subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronous handler.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&DrawerEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(Subscriber::Callback(Arc::new(handler)))
    }

    /// Register a channel subscriber and return its receiving end.
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<DrawerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.register(Subscriber::Channel(tx)), rx)
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.lock();
        let before = registry.subscribers.len();
        registry.subscribers.retain(|(sid, _)| *sid != id);
        registry.subscribers.len() != before
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Deliver `event` to every subscriber in registration order.
    ///
    /// Handlers are invoked outside the registry lock, so a handler may emit
    /// or (un)subscribe without deadlocking.
    pub fn emit(&self, event: &DrawerEvent) {
        let snapshot: Vec<(SubscriptionId, Subscriber)> = self.lock().subscribers.clone();
        trace!(topic = event.topic(), subscribers = snapshot.len(), "emit");

        let mut closed = Vec::new();
        for (id, subscriber) in snapshot {
            match subscriber {
                Subscriber::Callback(handler) => {
                    if let Err(error) = handler(event) {
                        warn!(topic = event.topic(), error = %error, "event subscriber failed");
                    }
                }
                Subscriber::Channel(tx) => {
                    if tx.send(event.clone()).is_err() {
                        closed.push(id);
                    }
                }
            }
        }

        if !closed.is_empty() {
            self.lock()
                .subscribers
                .retain(|(id, _)| !closed.contains(id));
        }
    }

    fn register(&self, subscriber: Subscriber) -> SubscriptionId {
        let mut registry = self.lock();
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry.subscribers.push((id, subscriber));
        id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
