//! Administrative management of webhook subscribers.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use bans_events::Topic;

use crate::endpoint::{Capability, Subscriber, SubscriberView};
use crate::error::{WebhookError, WebhookResult};
use crate::storage::{SubscriberPatch, SubscriberStore};

/// Number of random bytes in a generated secret (hex-encoded to twice as many chars).
const SECRET_BYTES: usize = 32;

/// Generates a fresh signing secret.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Request to register a new endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriber {
    pub owner: String,
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub subscriptions: BTreeSet<Topic>,
    #[serde(default)]
    pub scope: BTreeSet<Capability>,
}

/// Request to edit an endpoint. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EditSubscriber {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub subscriptions: Option<BTreeSet<Topic>>,
    #[serde(default)]
    pub disabled: Option<bool>,
}

/// Endpoint id together with its (new) secret. Only ever returned once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberSecret {
    pub id: String,
    pub secret: String,
}

/// Administrative operations over the subscriber store.
pub struct SubscriberAdmin {
    store: Arc<dyn SubscriberStore>,
}

impl SubscriberAdmin {
    pub fn new(store: Arc<dyn SubscriberStore>) -> Self {
        Self { store }
    }

    /// Registers an endpoint and returns its generated secret.
    pub async fn create(&self, request: CreateSubscriber) -> WebhookResult<SubscriberSecret> {
        validate_url(&request.url)?;

        let secret = generate_secret();
        let mut subscriber = Subscriber::new(request.owner, request.url, secret.clone())
            .topics(request.subscriptions);
        subscriber.name = request.name;
        subscriber.scope = request.scope;

        self.store.insert(&subscriber).await?;
        tracing::info!(endpoint_id = %subscriber.id, owner = %subscriber.owner, "Webhook endpoint created");

        Ok(SubscriberSecret {
            id: subscriber.id,
            secret,
        })
    }

    /// Edits url, name, subscriptions or the disabled flag.
    ///
    /// Clearing `disabled` also resets the failure counter.
    pub async fn edit(&self, id: &str, request: EditSubscriber) -> WebhookResult<SubscriberView> {
        if let Some(url) = &request.url {
            validate_url(url)?;
        }

        let disabled = request.disabled;
        let patch = SubscriberPatch {
            url: request.url,
            name: request.name,
            subscriptions: request.subscriptions,
            scope: None,
            disabled,
        };

        let updated = if patch.is_empty() {
            self.store.get(id).await?
        } else {
            self.store.apply_patch(id, &patch).await?
        }
        .ok_or_else(|| WebhookError::EndpointNotFound(id.to_string()))?;

        if let Some(disabled) = disabled {
            tracing::info!(endpoint_id = %id, disabled, "Webhook endpoint disabled flag set by administrator");
        }

        Ok(SubscriberView::from(&updated))
    }

    /// Grants or revokes capabilities.
    pub async fn set_scope(&self, id: &str, scope: BTreeSet<Capability>) -> WebhookResult<()> {
        let patch = SubscriberPatch {
            scope: Some(scope),
            ..Default::default()
        };
        self.store
            .apply_patch(id, &patch)
            .await?
            .map(|_| ())
            .ok_or_else(|| WebhookError::EndpointNotFound(id.to_string()))
    }

    /// Replaces the secret; signatures made with the old one stop verifying immediately.
    pub async fn rollover_secret(&self, id: &str) -> WebhookResult<SubscriberSecret> {
        let secret = generate_secret();
        if !self.store.set_secret(id, &secret).await? {
            return Err(WebhookError::EndpointNotFound(id.to_string()));
        }
        tracing::info!(endpoint_id = %id, "Webhook secret rolled over");

        Ok(SubscriberSecret {
            id: id.to_string(),
            secret,
        })
    }

    /// Deletes an endpoint.
    pub async fn delete(&self, id: &str) -> WebhookResult<()> {
        if self.store.delete(id).await? {
            tracing::info!(endpoint_id = %id, "Webhook endpoint deleted");
            Ok(())
        } else {
            Err(WebhookError::EndpointNotFound(id.to_string()))
        }
    }

    /// Lists an owner's endpoints.
    pub async fn list_by_owner(&self, owner: &str) -> WebhookResult<Vec<SubscriberView>> {
        let subscribers = self.store.list_by_owner(owner).await?;
        Ok(subscribers.iter().map(SubscriberView::from).collect())
    }
}

fn validate_url(raw: &str) -> WebhookResult<()> {
    let url = url::Url::parse(raw).map_err(|e| WebhookError::ConfigError(format!("invalid url {raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(WebhookError::ConfigError(format!("unsupported url scheme: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::WebhookSigner;
    use crate::storage::{FailureRecord, InMemorySubscriberStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store that counts every write reaching the backend.
    #[derive(Default)]
    struct CountingStore {
        inner: InMemorySubscriberStore,
        writes: AtomicUsize,
    }

    impl CountingStore {
        fn write(&self) {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl SubscriberStore for CountingStore {
        async fn insert(&self, subscriber: &Subscriber) -> WebhookResult<()> {
            self.inner.insert(subscriber).await
        }

        async fn get(&self, id: &str) -> WebhookResult<Option<Subscriber>> {
            self.inner.get(id).await
        }

        async fn list_eligible(&self, topic: Topic) -> WebhookResult<Vec<Subscriber>> {
            self.inner.list_eligible(topic).await
        }

        async fn list_by_owner(&self, owner: &str) -> WebhookResult<Vec<Subscriber>> {
            self.inner.list_by_owner(owner).await
        }

        async fn delete(&self, id: &str) -> WebhookResult<bool> {
            self.write();
            self.inner.delete(id).await
        }

        async fn apply_patch(&self, id: &str, patch: &SubscriberPatch) -> WebhookResult<Option<Subscriber>> {
            self.write();
            self.inner.apply_patch(id, patch).await
        }

        async fn set_secret(&self, id: &str, secret: &str) -> WebhookResult<bool> {
            self.write();
            self.inner.set_secret(id, secret).await
        }

        async fn record_success(&self, id: &str) -> WebhookResult<Option<FailureRecord>> {
            self.inner.record_success(id).await
        }

        async fn record_failure(&self, id: &str, threshold: u32) -> WebhookResult<Option<FailureRecord>> {
            self.inner.record_failure(id, threshold).await
        }
    }

    fn admin() -> (Arc<InMemorySubscriberStore>, SubscriberAdmin) {
        let store = Arc::new(InMemorySubscriberStore::new());
        (store.clone(), SubscriberAdmin::new(store))
    }

    fn create_request(owner: &str) -> CreateSubscriber {
        CreateSubscriber {
            owner: owner.to_string(),
            url: "https://bot.example/hook".to_string(),
            name: Some("mod bot".to_string()),
            subscriptions: [Topic::User].into_iter().collect(),
            scope: BTreeSet::new(),
        }
    }

    #[test]
    fn test_generated_secrets() {
        let a = generate_secret();
        let b = generate_secret();
        assert_eq!(a.len(), SECRET_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let (store, admin) = admin();
        let created = admin.create(create_request("owner-1")).await.unwrap();
        admin.create(create_request("owner-2")).await.unwrap();

        let stored = store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(stored.secret, created.secret);
        assert!(!stored.disabled);
        assert_eq!(stored.failure_count, 0);

        let listed = admin.list_by_owner("owner-1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
        assert_eq!(listed[0].name.as_deref(), Some("mod bot"));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_url() {
        let (_store, admin) = admin();
        let mut request = create_request("owner-1");
        request.url = "ftp://bot.example/hook".to_string();
        assert!(matches!(admin.create(request).await, Err(WebhookError::ConfigError(_))));

        let mut request = create_request("owner-1");
        request.url = "not a url".to_string();
        assert!(matches!(admin.create(request).await, Err(WebhookError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_rollover_invalidates_old_signatures() {
        let (store, admin) = admin();
        let created = admin.create(create_request("owner-1")).await.unwrap();
        let body = br#"{"type":"create","user":{"id":1}}"#;
        let old_signature = WebhookSigner::new(&created.secret).sign(body);

        let rolled = admin.rollover_secret(&created.id).await.unwrap();

        assert_ne!(rolled.secret, created.secret);
        let stored = store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(stored.secret, rolled.secret);
        assert!(!WebhookSigner::new(&stored.secret).verify(body, &old_signature));
    }

    #[tokio::test]
    async fn test_edit_and_force_clear() {
        let (store, admin) = admin();
        let created = admin.create(create_request("owner-1")).await.unwrap();
        for _ in 0..5 {
            store.record_failure(&created.id, 5).await.unwrap();
        }

        let view = admin
            .edit(
                &created.id,
                EditSubscriber {
                    subscriptions: Some([Topic::User, Topic::Content].into_iter().collect()),
                    disabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(!view.disabled);
        assert_eq!(view.subscriptions.len(), 2);
        assert_eq!(store.get(&created.id).await.unwrap().unwrap().failure_count, 0);
    }

    #[tokio::test]
    async fn test_unknown_endpoint() {
        let (_store, admin) = admin();
        assert!(matches!(
            admin.rollover_secret("missing").await,
            Err(WebhookError::EndpointNotFound(_))
        ));
        assert!(matches!(admin.delete("missing").await, Err(WebhookError::EndpointNotFound(_))));
        assert!(matches!(
            admin.edit("missing", EditSubscriber::default()).await,
            Err(WebhookError::EndpointNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, admin) = admin();
        let created = admin.create(create_request("owner-1")).await.unwrap();
        admin.delete(&created.id).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_edit_with_disabled_is_one_store_write() {
        let store = Arc::new(CountingStore::default());
        let admin = SubscriberAdmin::new(store.clone());
        let created = admin.create(create_request("owner-1")).await.unwrap();
        for _ in 0..5 {
            store.record_failure(&created.id, 5).await.unwrap();
        }

        let view = admin
            .edit(
                &created.id,
                EditSubscriber {
                    url: Some("https://bot.example/v2".to_string()),
                    disabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert_eq!(view.url, "https://bot.example/v2");
        assert!(!view.disabled);
        assert_eq!(store.get(&created.id).await.unwrap().unwrap().failure_count, 0);
    }

    #[tokio::test]
    async fn test_edit_after_delete_changes_nothing() {
        let (store, admin) = admin();
        let created = admin.create(create_request("owner-1")).await.unwrap();
        admin.delete(&created.id).await.unwrap();

        let result = admin
            .edit(
                &created.id,
                EditSubscriber {
                    url: Some("https://bot.example/v2".to_string()),
                    disabled: Some(false),
                    ..Default::default()
                },
            )
            .await;

        assert!(matches!(result, Err(WebhookError::EndpointNotFound(_))));
        assert!(store.is_empty().await);
    }
}
