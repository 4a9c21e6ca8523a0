//! Event bus fanning domain events out to handlers.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::task::TaskTracker;

use crate::event::{Event, EventKind, Topic};
use crate::handler::{EventHandler, SharedHandler};

/// The event bus for publishing domain events to registered handlers.
///
/// Every handler runs on its own task, so a slow webhook fan-out never
/// delays the broker publish and neither delays the caller.
#[derive(Clone)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<SharedHandler>>>,
    tasks: TaskTracker,
}

impl EventBus {
    /// Creates a new event bus.
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
            tasks: TaskTracker::new(),
        }
    }

    /// Subscribes a handler to every event.
    pub async fn on(&self, handler: impl EventHandler + 'static) {
        self.on_shared(Arc::new(handler)).await;
    }

    /// Subscribes an already shared handler.
    pub async fn on_shared(&self, handler: SharedHandler) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Gets the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }

    /// Inbound trigger called after a successful persistence write.
    ///
    /// Returns immediately and never fails; serialization problems and a
    /// missing runtime are logged and the event is dropped.
    pub fn publish_event(&self, topic: Topic, kind: EventKind, entity: &impl Serialize) {
        match Event::from_entity(topic, kind, entity) {
            Ok(event) => self.publish(event),
            Err(e) => tracing::error!(%topic, %kind, "Dropping event with unserializable entity: {}", e),
        }
    }

    /// Schedules an event for fan-out without waiting.
    pub fn publish(&self, event: Event) {
        if self.tasks.is_closed() {
            tracing::warn!(event_id = %event.id, "Event bus is shutting down, dropping event");
            return;
        }

        if tokio::runtime::Handle::try_current().is_err() {
            tracing::error!(event_id = %event.id, "No async runtime available, dropping event");
            return;
        }

        let handlers = Arc::clone(&self.handlers);
        let tasks = self.tasks.clone();
        self.tasks.spawn(async move {
            let handlers = handlers.read().await.clone();
            Self::spawn_handlers(&tasks, handlers, event);
        });
    }

    /// Stops accepting new events.
    pub fn close(&self) {
        self.tasks.close();
    }

    /// Closes the bus and waits for in-flight handler tasks.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tasks.close();
        tokio::time::timeout(timeout, self.tasks.wait()).await.is_ok()
    }

    fn spawn_handlers(tasks: &TaskTracker, handlers: Vec<SharedHandler>, event: Event) {
        tracing::debug!(
            event_id = %event.id,
            topic = %event.topic,
            kind = %event.kind,
            handlers = handlers.len(),
            "Dispatching event"
        );

        let event = Arc::new(event);
        for handler in handlers {
            let event = Arc::clone(&event);
            tasks.spawn(async move {
                if let Err(e) = handler.handle(&event).await {
                    tracing::error!(event_id = %event.id, "Event handler '{}' error: {}", handler.id(), e);
                }
            });
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
