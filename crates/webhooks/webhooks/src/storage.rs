//! Subscriber storage trait for persistence.
//!
//! Counter updates are single store operations so that concurrent delivery
//! attempts to the same subscriber never lose an increment or a reset.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

use bans_events::Topic;

use crate::endpoint::{Capability, Subscriber};
use crate::error::WebhookResult;

/// Failure state after an atomic counter update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureRecord {
    /// Counter value after the update.
    pub failure_count: u32,
    /// Whether the subscriber is disabled after the update.
    pub disabled: bool,
    /// Whether this very update flipped `disabled` from false to true.
    pub newly_disabled: bool,
}

/// Administrative settings. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct SubscriberPatch {
    pub url: Option<String>,
    pub name: Option<String>,
    pub subscriptions: Option<BTreeSet<Topic>>,
    pub scope: Option<BTreeSet<Capability>>,
    /// Clearing the flag also resets the failure counter.
    pub disabled: Option<bool>,
}

impl SubscriberPatch {
    pub fn is_empty(&self) -> bool {
        self.url.is_none()
            && self.name.is_none()
            && self.subscriptions.is_none()
            && self.scope.is_none()
            && self.disabled.is_none()
    }
}

/// Trait for subscriber storage backends.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    // ==================== Registry Operations ====================

    /// Saves a new subscriber.
    async fn insert(&self, subscriber: &Subscriber) -> WebhookResult<()>;

    /// Gets a subscriber by ID.
    async fn get(&self, id: &str) -> WebhookResult<Option<Subscriber>>;

    /// Lists subscribers that are enabled and subscribed to `topic`.
    async fn list_eligible(&self, topic: Topic) -> WebhookResult<Vec<Subscriber>>;

    /// Lists all subscribers belonging to an owner.
    async fn list_by_owner(&self, owner: &str) -> WebhookResult<Vec<Subscriber>>;

    /// Deletes a subscriber. Returns `false` if it did not exist.
    async fn delete(&self, id: &str) -> WebhookResult<bool>;

    // ==================== Administrative Updates ====================

    /// Applies every field of the patch in one update.
    async fn apply_patch(&self, id: &str, patch: &SubscriberPatch) -> WebhookResult<Option<Subscriber>>;

    /// Replaces the signing secret.
    async fn set_secret(&self, id: &str, secret: &str) -> WebhookResult<bool>;

    // ==================== Atomic Failure State ====================

    /// Atomically resets the failure counter. `disabled` is left untouched.
    async fn record_success(&self, id: &str) -> WebhookResult<Option<FailureRecord>>;

    /// Atomically increments the failure counter, disabling the subscriber
    /// once the counter reaches `threshold`.
    async fn record_failure(&self, id: &str, threshold: u32) -> WebhookResult<Option<FailureRecord>>;
}

/// In-memory subscriber storage.
pub struct InMemorySubscriberStore {
    subscribers: RwLock<HashMap<String, Subscriber>>,
}

impl InMemorySubscriberStore {
    /// Creates a new in-memory storage.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored subscribers.
    pub async fn len(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.subscribers.read().await.is_empty()
    }
}

impl Default for InMemorySubscriberStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted(mut subscribers: Vec<Subscriber>) -> Vec<Subscriber> {
    subscribers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    subscribers
}

#[async_trait]
impl SubscriberStore for InMemorySubscriberStore {
    async fn insert(&self, subscriber: &Subscriber) -> WebhookResult<()> {
        let mut subscribers = self.subscribers.write().await;
        subscribers.insert(subscriber.id.clone(), subscriber.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> WebhookResult<Option<Subscriber>> {
        let subscribers = self.subscribers.read().await;
        Ok(subscribers.get(id).cloned())
    }

    async fn list_eligible(&self, topic: Topic) -> WebhookResult<Vec<Subscriber>> {
        let subscribers = self.subscribers.read().await;
        Ok(sorted(
            subscribers
                .values()
                .filter(|s| s.is_eligible(topic))
                .cloned()
                .collect(),
        ))
    }

    async fn list_by_owner(&self, owner: &str) -> WebhookResult<Vec<Subscriber>> {
        let subscribers = self.subscribers.read().await;
        Ok(sorted(
            subscribers
                .values()
                .filter(|s| s.owner == owner)
                .cloned()
                .collect(),
        ))
    }

    async fn delete(&self, id: &str) -> WebhookResult<bool> {
        let mut subscribers = self.subscribers.write().await;
        Ok(subscribers.remove(id).is_some())
    }

    async fn apply_patch(&self, id: &str, patch: &SubscriberPatch) -> WebhookResult<Option<Subscriber>> {
        let mut subscribers = self.subscribers.write().await;
        let Some(subscriber) = subscribers.get_mut(id) else {
            return Ok(None);
        };

        if let Some(url) = &patch.url {
            subscriber.url = url.clone();
        }
        if let Some(name) = &patch.name {
            subscriber.name = Some(name.clone());
        }
        if let Some(subscriptions) = &patch.subscriptions {
            subscriber.subscriptions = subscriptions.clone();
        }
        if let Some(scope) = &patch.scope {
            subscriber.scope = scope.clone();
        }
        if let Some(disabled) = patch.disabled {
            subscriber.disabled = disabled;
            if !disabled {
                subscriber.failure_count = 0;
            }
        }
        subscriber.updated_at = Utc::now();

        Ok(Some(subscriber.clone()))
    }

    async fn set_secret(&self, id: &str, secret: &str) -> WebhookResult<bool> {
        let mut subscribers = self.subscribers.write().await;
        let Some(subscriber) = subscribers.get_mut(id) else {
            return Ok(false);
        };
        subscriber.secret = secret.to_string();
        subscriber.updated_at = Utc::now();
        Ok(true)
    }

    async fn record_success(&self, id: &str) -> WebhookResult<Option<FailureRecord>> {
        let mut subscribers = self.subscribers.write().await;
        Ok(subscribers.get_mut(id).map(|subscriber| {
            subscriber.failure_count = 0;
            FailureRecord {
                failure_count: 0,
                disabled: subscriber.disabled,
                newly_disabled: false,
            }
        }))
    }

    async fn record_failure(&self, id: &str, threshold: u32) -> WebhookResult<Option<FailureRecord>> {
        let mut subscribers = self.subscribers.write().await;
        Ok(subscribers.get_mut(id).map(|subscriber| {
            subscriber.failure_count = subscriber.failure_count.saturating_add(1);

            let newly_disabled = !subscriber.disabled && subscriber.failure_count >= threshold;
            if newly_disabled {
                subscriber.disabled = true;
                subscriber.updated_at = Utc::now();
            }

            FailureRecord {
                failure_count: subscriber.failure_count,
                disabled: subscriber.disabled,
                newly_disabled,
            }
        }))
    }
}
