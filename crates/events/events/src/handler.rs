//! Consumers of published events.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::EventError;
use crate::event::Event;

/// Something that reacts to domain changes: webhook fan-out, the broker, tests.
///
/// Handlers run on their own task. An error is logged by the bus and never
/// reaches whoever published the event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs.
    fn id(&self) -> &str {
        "anonymous"
    }

    async fn handle(&self, event: &Event) -> Result<(), EventError>;
}

pub type SharedHandler = Arc<dyn EventHandler>;

#[async_trait]
impl<T: EventHandler + ?Sized> EventHandler for Arc<T> {
    fn id(&self) -> &str {
        (**self).id()
    }

    async fn handle(&self, event: &Event) -> Result<(), EventError> {
        (**self).handle(event).await
    }
}
