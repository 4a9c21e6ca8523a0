//! Errors raised while building, dispatching or forwarding events.

use thiserror::Error;

pub type EventResult<T> = Result<T, EventError>;

#[derive(Debug, Error)]
pub enum EventError {
    /// A handler rejected the event. Logged by the bus, never surfaced to the producer.
    #[error("Handler failed: {0}")]
    HandlerFailed(String),

    /// The changed entity could not be turned into a JSON payload.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("Unknown event kind: {0}")]
    UnknownKind(String),

    #[error("Broker error: {0}")]
    BrokerError(String),

    #[error("Publisher closed")]
    PublisherClosed,
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::SerializationError(err.to_string())
    }
}
