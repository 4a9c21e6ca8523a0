//! # Bans API Server
//!
//! Wires the event bus, the webhook pipeline and the broker publisher into a
//! single service that the rest of the Bans API publishes changes through.

pub mod config;

pub use config::{AppConfig, ConfigError, MailConfig, ServerConfig, load_config, load_from_env};

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use bans_events::{BrokerHandler, BrokerPublisher, EventBus, EventKind, LoggingPublisher, Topic};
use bans_webhooks::{
    EmailNotifier, InMemorySubscriberStore, InMemoryUserDirectory, LogMailer, Mailer, ReqwestTransport,
    SendGridMailer, SubscriberAdmin, SubscriberStore, UserDirectory, WebhookSystem, WebhookTransport,
};

/// The running notification service.
pub struct BansServer {
    config: AppConfig,
    bus: EventBus,
    webhooks: Arc<WebhookSystem>,
    notifier: Arc<EmailNotifier>,
    directory: Arc<dyn UserDirectory>,
    publisher: Arc<dyn BrokerPublisher>,
}

impl BansServer {
    /// Builds the service with in-memory storage, real HTTP delivery and a logging broker.
    ///
    /// Owner contacts come from `[mail.owners]`.
    pub async fn new(config: AppConfig) -> Self {
        let directory = owner_directory(&config).await;
        Self::with_parts(
            config,
            Arc::new(InMemorySubscriberStore::new()),
            Arc::new(ReqwestTransport::new()),
            directory,
            Arc::new(LoggingPublisher::new()),
        )
        .await
    }

    /// Builds the service over the given store, transport, owner directory and broker publisher.
    pub async fn with_parts(
        config: AppConfig,
        store: Arc<dyn SubscriberStore>,
        transport: Arc<dyn WebhookTransport>,
        directory: Arc<dyn UserDirectory>,
        publisher: Arc<dyn BrokerPublisher>,
    ) -> Self {
        let notifier = Arc::new(EmailNotifier::new(
            Arc::clone(&directory),
            mailer(&config),
            config.mail.from_address.clone(),
        ));

        let webhooks = Arc::new(WebhookSystem::new(
            config.webhooks.clone(),
            store,
            transport,
            notifier.clone(),
        ));

        let bus = EventBus::new();
        webhooks.clone().connect_to_events(&bus).await;
        bus.on(BrokerHandler::new(Arc::clone(&publisher))).await;

        Self {
            config,
            bus,
            webhooks,
            notifier,
            directory,
            publisher,
        }
    }

    /// Announces a change to every consumer. Never fails or blocks.
    pub fn publish_event(&self, topic: Topic, kind: EventKind, entity: &impl Serialize) {
        self.bus.publish_event(topic, kind, entity);
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn webhooks(&self) -> &Arc<WebhookSystem> {
        &self.webhooks
    }

    /// Subscriber administration.
    pub fn admin(&self) -> SubscriberAdmin {
        self.webhooks.admin()
    }

    /// Owner contact addresses used for disablement notices.
    pub fn directory(&self) -> &Arc<dyn UserDirectory> {
        &self.directory
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Stops accepting events, drains in-flight work, then closes the broker publisher.
    ///
    /// Returns `false` if anything was still running when the timeout elapsed.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        self.bus.close();
        let mut drained = self.bus.drain(remaining(deadline)).await;
        drained &= self.webhooks.drain(remaining(deadline)).await;

        let notices = self.notifier.tasks();
        notices.close();
        drained &= tokio::time::timeout(remaining(deadline), notices.wait()).await.is_ok();

        if !drained {
            tracing::warn!("Shutdown timeout elapsed with deliveries still in flight");
        }

        if let Err(e) = self.publisher.close().await {
            tracing::error!(error = %e, "Failed to close broker publisher");
        }

        tracing::info!(drained, "Bans API server stopped");
        drained
    }
}

fn remaining(deadline: tokio::time::Instant) -> Duration {
    deadline.saturating_duration_since(tokio::time::Instant::now())
}

async fn owner_directory(config: &AppConfig) -> Arc<dyn UserDirectory> {
    let directory = InMemoryUserDirectory::new();
    for (owner, email) in &config.mail.owners {
        directory.insert(owner.clone(), email.clone()).await;
    }
    if config.mail.owners.is_empty() {
        tracing::warn!("No owner contacts configured; disablement notices cannot be addressed");
    }
    Arc::new(directory)
}

fn mailer(config: &AppConfig) -> Arc<dyn Mailer> {
    let Some(api_key) = config.mail.sendgrid_api_key.clone() else {
        tracing::warn!("No SendGrid API key configured; disablement notices will only be logged");
        return Arc::new(LogMailer);
    };

    let mut mailer = SendGridMailer::new(api_key).timeout(config.mail.timeout());
    if let Some(base) = &config.mail.api_base {
        mailer = mailer.api_base(base.clone());
    }
    if let Some(template) = &config.mail.template_id {
        mailer = mailer.template_id(template.clone());
    }
    Arc::new(mailer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bans_events::RecordingPublisher;

    #[tokio::test]
    async fn test_publish_reaches_broker_and_shutdown_closes_it() {
        let publisher = Arc::new(RecordingPublisher::new());
        let server = BansServer::with_parts(
            AppConfig::default(),
            Arc::new(InMemorySubscriberStore::new()),
            Arc::new(ReqwestTransport::new()),
            Arc::new(InMemoryUserDirectory::new()),
            publisher.clone(),
        )
        .await;
        assert_eq!(server.bus().handler_count().await, 2);

        server.publish_event(Topic::Content, EventKind::Create, &serde_json::json!({"id": 4}));

        assert!(server.shutdown(Duration::from_secs(5)).await);
        assert!(publisher.is_closed());

        let messages = publisher.messages().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, Topic::Content);
        assert_eq!(messages[0].kind, EventKind::Create);
    }

    #[tokio::test]
    async fn test_events_after_shutdown_are_dropped() {
        let publisher = Arc::new(RecordingPublisher::new());
        let server = BansServer::with_parts(
            AppConfig::default(),
            Arc::new(InMemorySubscriberStore::new()),
            Arc::new(ReqwestTransport::new()),
            Arc::new(InMemoryUserDirectory::new()),
            publisher.clone(),
        )
        .await;

        server.shutdown(Duration::from_secs(1)).await;
        server.publish_event(Topic::User, EventKind::Delete, &serde_json::json!({"id": 1}));
        tokio::task::yield_now().await;

        assert!(publisher.messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_configured_owners_are_resolvable() {
        let mut config = AppConfig::default();
        config.mail.owners.insert("owner-1".into(), "mod@example.com".into());

        let server = BansServer::new(config).await;

        assert_eq!(
            server.directory().contact_email("owner-1").await.unwrap().as_deref(),
            Some("mod@example.com")
        );
        assert!(server.directory().contact_email("owner-2").await.unwrap().is_none());
        server.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_disablement_mail_reaches_sendgrid() {
        use bans_webhooks::CreateSubscriber;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let sendgrid = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&sendgrid)
            .await;

        let dead_url = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            format!("http://127.0.0.1:{}/hook", listener.local_addr().unwrap().port())
        };

        let mut config = AppConfig::default();
        config.webhooks = config.webhooks.disable_threshold(1).request_timeout_ms(2_000);
        config.mail.sendgrid_api_key = Some("SG.key".into());
        config.mail.api_base = Some(sendgrid.uri());

        let directory = Arc::new(InMemoryUserDirectory::new());
        directory.insert("owner-1", "mod@example.com").await;

        let server = BansServer::with_parts(
            config,
            Arc::new(InMemorySubscriberStore::new()),
            Arc::new(ReqwestTransport::new()),
            directory,
            Arc::new(RecordingPublisher::new()),
        )
        .await;

        server
            .admin()
            .create(CreateSubscriber {
                owner: "owner-1".into(),
                url: dead_url,
                name: None,
                subscriptions: [Topic::User].into_iter().collect(),
                scope: Default::default(),
            })
            .await
            .unwrap();

        server.publish_event(Topic::User, EventKind::Create, &serde_json::json!({"id": 1}));
        assert!(server.shutdown(Duration::from_secs(10)).await);

        let requests = sendgrid.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["personalizations"][0]["to"][0]["email"], "mod@example.com");
    }
}
