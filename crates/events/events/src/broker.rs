//! Message broker publishing, the sibling of webhook fan-out.
//!
//! A [`BrokerPublisher`] is constructed once at process start, registered
//! on the [`EventBus`](crate::EventBus) through a [`BrokerHandler`], and
//! closed explicitly at shutdown.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::error::{EventError, EventResult};
use crate::event::{Event, EventKind, Topic};
use crate::handler::EventHandler;

/// Exchange every domain event is published to, routed by topic.
pub const EXCHANGE: &str = "bans-api";

/// Message body published to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerMessage {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub topic: Topic,
    pub data: Value,
}

impl From<&Event> for BrokerMessage {
    fn from(event: &Event) -> Self {
        Self {
            kind: event.kind,
            topic: event.topic,
            data: event.payload.clone(),
        }
    }
}

/// A process-scoped broker client.
#[async_trait]
pub trait BrokerPublisher: Send + Sync {
    /// Publishes a message routed by its topic.
    async fn publish(&self, message: &BrokerMessage) -> EventResult<()>;

    /// Flushes and closes the underlying connection.
    async fn close(&self) -> EventResult<()>;
}

/// Publisher that only writes messages to the log.
///
/// Used when no broker is configured.
#[derive(Debug, Default)]
pub struct LoggingPublisher {
    closed: AtomicBool,
}

impl LoggingPublisher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BrokerPublisher for LoggingPublisher {
    async fn publish(&self, message: &BrokerMessage) -> EventResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EventError::PublisherClosed);
        }
        tracing::info!(
            exchange = EXCHANGE,
            routing_key = %message.topic,
            kind = %message.kind,
            "Broker message"
        );
        Ok(())
    }

    async fn close(&self) -> EventResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// In-memory publisher that records every message.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<BrokerMessage>>,
    closed: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every published message.
    pub async fn messages(&self) -> Vec<BrokerMessage> {
        self.messages.lock().await.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl BrokerPublisher for RecordingPublisher {
    async fn publish(&self, message: &BrokerMessage) -> EventResult<()> {
        if self.is_closed() {
            return Err(EventError::PublisherClosed);
        }
        self.messages.lock().await.push(message.clone());
        Ok(())
    }

    async fn close(&self) -> EventResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Event handler forwarding every event to a broker publisher.
pub struct BrokerHandler {
    publisher: Arc<dyn BrokerPublisher>,
}

impl BrokerHandler {
    pub fn new(publisher: Arc<dyn BrokerPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl EventHandler for BrokerHandler {
    fn id(&self) -> &str {
        "broker-publisher"
    }

    async fn handle(&self, event: &Event) -> Result<(), EventError> {
        let message = BrokerMessage::from(event);
        self.publisher.publish(&message).await.map_err(|e| {
            EventError::BrokerError(format!("publish to {} failed: {}", EXCHANGE, e))
        })
    }
}
