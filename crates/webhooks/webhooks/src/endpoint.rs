//! Webhook subscriber records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use bans_events::Topic;

/// A named permission granted to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    /// Name of the capability that unlocks privileged payload fields.
    pub const VIEW_PRIVILEGED: &'static str = "view_privileged";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The capability that unlocks privileged payload fields.
    pub fn view_privileged() -> Self {
        Self::new(Self::VIEW_PRIVILEGED)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered third-party HTTP destination for event notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    /// Unique identifier.
    pub id: String,
    /// Human-readable name.
    pub name: Option<String>,
    /// Target URL.
    pub url: String,
    /// Secret for signing payloads.
    pub secret: String,
    /// Account responsible for the endpoint.
    pub owner: String,
    /// Topics this endpoint wants events for.
    pub subscriptions: BTreeSet<Topic>,
    /// Capabilities granted to this endpoint.
    pub scope: BTreeSet<Capability>,
    /// Excluded from delivery until an administrator re-enables it.
    pub disabled: bool,
    /// Consecutive delivery failures since the last success or reset.
    pub failure_count: u32,
    /// When the endpoint was created.
    pub created_at: DateTime<Utc>,
    /// When the endpoint was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Subscriber {
    /// Creates a new, enabled subscriber with no subscriptions.
    pub fn new(owner: impl Into<String>, url: impl Into<String>, secret: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: None,
            url: url.into(),
            secret: secret.into(),
            owner: owner.into(),
            subscriptions: BTreeSet::new(),
            scope: BTreeSet::new(),
            disabled: false,
            failure_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Subscribes to the given topics.
    pub fn topics(mut self, topics: impl IntoIterator<Item = Topic>) -> Self {
        self.subscriptions = topics.into_iter().collect();
        self
    }

    /// Grants a capability.
    pub fn grant(mut self, capability: Capability) -> Self {
        self.scope.insert(capability);
        self
    }

    /// Disables the endpoint.
    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Checks if this subscriber should receive an event for the topic.
    pub fn is_eligible(&self, topic: Topic) -> bool {
        !self.disabled && self.subscriptions.contains(&topic)
    }

    /// Checks whether a capability has been granted.
    pub fn has_capability(&self, capability: &Capability) -> bool {
        self.scope.contains(capability)
    }
}

/// Owner-facing view of a subscriber, without the secret and failure counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberView {
    pub id: String,
    pub url: String,
    pub name: Option<String>,
    pub disabled: bool,
    pub subscriptions: BTreeSet<Topic>,
}

impl From<&Subscriber> for SubscriberView {
    fn from(subscriber: &Subscriber) -> Self {
        Self {
            id: subscriber.id.clone(),
            url: subscriber.url.clone(),
            name: subscriber.name.clone(),
            disabled: subscriber.disabled,
            subscriptions: subscriber.subscriptions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eligibility() {
        let subscriber = Subscriber::new("owner", "https://example.com", "secret")
            .topics([Topic::User, Topic::UserBanList]);

        assert!(subscriber.is_eligible(Topic::User));
        assert!(subscriber.is_eligible(Topic::UserBanList));
        assert!(!subscriber.is_eligible(Topic::Content));

        let disabled = subscriber.clone().disabled();
        assert!(!disabled.is_eligible(Topic::User));
    }

    #[test]
    fn test_capabilities() {
        let subscriber = Subscriber::new("owner", "https://example.com", "secret");
        assert!(!subscriber.has_capability(&Capability::view_privileged()));

        let subscriber = subscriber.grant(Capability::view_privileged());
        assert!(subscriber.has_capability(&Capability::view_privileged()));
    }

    #[test]
    fn test_view_hides_secret() {
        let subscriber = Subscriber::new("owner", "https://example.com", "hunter2").name("mod bot");
        let view = serde_json::to_value(SubscriberView::from(&subscriber)).unwrap();

        assert!(view.get("secret").is_none());
        assert!(view.get("failure_count").is_none());
        assert_eq!(view["name"], "mod bot");
    }
}
