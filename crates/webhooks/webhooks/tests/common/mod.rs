//! Common test utilities for bans_webhooks integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use bans_events::{Event, EventKind, Topic};
use bans_webhooks::{
    Capability, DisabledEndpointNotice, EmailNotifier, InMemorySubscriberStore, InMemoryUserDirectory,
    Mailer, ReqwestTransport, Subscriber, SubscriberStore, WebhookConfig, WebhookResult, WebhookSystem,
};

pub const OWNER: &str = "owner-1";
pub const OWNER_EMAIL: &str = "mod@example.com";
pub const SECRET: &str = "s3cr3t";

/// Mailer that records every notice.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<DisabledEndpointNotice>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, notice: &DisabledEndpointNotice) -> WebhookResult<()> {
        self.sent.lock().await.push(notice.clone());
        Ok(())
    }
}

/// A fully wired system over real HTTP.
pub struct Harness {
    pub system: Arc<WebhookSystem>,
    pub store: Arc<InMemorySubscriberStore>,
    pub notifier: Arc<EmailNotifier>,
    pub mailer: Arc<RecordingMailer>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(WebhookConfig::default().request_timeout_ms(2_000)).await
    }

    pub async fn with_config(config: WebhookConfig) -> Self {
        let store = Arc::new(InMemorySubscriberStore::new());
        let directory = Arc::new(InMemoryUserDirectory::new());
        directory.insert(OWNER, OWNER_EMAIL).await;
        let mailer = Arc::new(RecordingMailer::default());
        let notifier = Arc::new(EmailNotifier::new(directory, mailer.clone(), "noreply@example.com"));

        let system = Arc::new(WebhookSystem::new(
            config,
            store.clone(),
            Arc::new(ReqwestTransport::new()),
            notifier.clone(),
        ));

        Self {
            system,
            store,
            notifier,
            mailer,
        }
    }

    /// Registers a subscriber and returns it.
    pub async fn subscribe(&self, url: &str, topics: &[Topic], privileged: bool) -> Subscriber {
        let mut subscriber = Subscriber::new(OWNER, url, SECRET).topics(topics.iter().copied());
        if privileged {
            subscriber = subscriber.grant(Capability::view_privileged());
        }
        self.store.insert(&subscriber).await.unwrap();
        subscriber
    }

    pub async fn reload(&self, subscriber: &Subscriber) -> Subscriber {
        self.store.get(&subscriber.id).await.unwrap().unwrap()
    }

    /// Waits for any in-flight notification emails.
    pub async fn drain_notifications(&self) {
        self.notifier.tasks().close();
        tokio::time::timeout(Duration::from_secs(5), self.notifier.tasks().wait())
            .await
            .expect("notifications did not finish");
    }
}

/// The user report from the documented end-to-end scenario.
pub fn user_report_created() -> Event {
    Event::new(
        Topic::User,
        EventKind::Create,
        serde_json::json!({"id": 1, "proof": ["x"], "userId": "123"}),
    )
}

/// Returns a URL nothing is listening on.
pub async fn dead_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/hook")
}

/// Independent implementation of the receiver-side signature check.
pub fn expected_signature(secret: &str, body: &[u8]) -> String {
    use base64::Engine;
    use hmac::{Hmac, Mac};

    let encoded = base64::engine::general_purpose::STANDARD.encode(body);
    let mut mac = Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(encoded.as_bytes());
    hex::encode(mac.finalize().into_bytes()).to_uppercase()
}
