//! Event types and structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::EventError;

/// Subscription category of a domain event.
///
/// The wire name doubles as the routing key on the broker and as the entity
/// key in outbound webhook bodies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    /// User (ban) reports.
    User,
    /// User ban lists.
    #[serde(rename = "userbanlist")]
    UserBanList,
    /// Content reports.
    Content,
}

impl Topic {
    /// All topics, in declaration order.
    pub const ALL: [Topic; 3] = [Topic::User, Topic::UserBanList, Topic::Content];

    /// Returns the wire name (e.g., "userbanlist").
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::User => "user",
            Topic::UserBanList => "userbanlist",
            Topic::Content => "content",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Topic::User),
            "userbanlist" => Ok(Topic::UserBanList),
            "content" => Ok(Topic::Content),
            other => Err(EventError::UnknownTopic(other.to_string())),
        }
    }
}

/// The mutation that produced an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

impl EventKind {
    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(EventKind::Create),
            "update" => Ok(EventKind::Update),
            "delete" => Ok(EventKind::Delete),
            other => Err(EventError::UnknownKind(other.to_string())),
        }
    }
}

/// An immutable record of a single domain mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event instance, used for log correlation.
    pub id: String,
    /// Subscription category.
    pub topic: Topic,
    /// Mutation kind.
    pub kind: EventKind,
    /// Entity state at the time of the mutation.
    pub payload: Value,
    /// Timestamp when the event was created.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Creates a new event from an already serialized entity.
    pub fn new(topic: Topic, kind: EventKind, payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            topic,
            kind,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Creates an event by serializing an entity.
    pub fn from_entity(topic: Topic, kind: EventKind, entity: &impl Serialize) -> Result<Self, EventError> {
        let payload = serde_json::to_value(entity)?;
        Ok(Self::new(topic, kind, payload))
    }

    /// Returns the entity identifier if the payload carries one.
    pub fn entity_id(&self) -> Option<String> {
        match self.payload.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_wire_names() {
        for topic in Topic::ALL {
            assert_eq!(topic.as_str().parse::<Topic>().unwrap(), topic);
            assert_eq!(
                serde_json::to_value(topic).unwrap(),
                Value::String(topic.as_str().to_string())
            );
        }
        assert!("ban".parse::<Topic>().is_err());
    }

    #[test]
    fn test_kind_serialization() {
        assert_eq!(serde_json::to_string(&EventKind::Create).unwrap(), "\"create\"");
        assert_eq!("delete".parse::<EventKind>().unwrap(), EventKind::Delete);
        assert!("upsert".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_event_from_entity() {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Report {
            id: u64,
            user_id: String,
        }

        let event = Event::from_entity(
            Topic::User,
            EventKind::Create,
            &Report { id: 7, user_id: "123".into() },
        )
        .unwrap();

        assert_eq!(event.payload["userId"], "123");
        assert_eq!(event.entity_id().as_deref(), Some("7"));
        assert!(!event.id.is_empty());
    }
}
