//! Webhook system - main entry point.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use bans_events::{Event, EventBus, EventError, EventHandler};

use crate::admin::SubscriberAdmin;
use crate::delivery::{DeliveryEngine, DeliveryTicket};
use crate::endpoint::Capability;
use crate::notifier::DisablementNotifier;
use crate::redaction::{DEFAULT_REDACTED_FIELDS, RedactionPolicy};
use crate::storage::SubscriberStore;
use crate::tracker::{DEFAULT_DISABLE_THRESHOLD, FailureTracker};
use crate::transport::WebhookTransport;

/// Webhook system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Consecutive failures after which an endpoint is disabled.
    pub disable_threshold: u32,
    /// Timeout for a single outbound POST, in milliseconds.
    pub request_timeout_ms: u64,
    /// Top-level payload fields hidden from unprivileged subscribers.
    pub redacted_fields: Vec<String>,
    /// Capability that lifts redaction.
    pub privileged_capability: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            disable_threshold: DEFAULT_DISABLE_THRESHOLD,
            request_timeout_ms: 10_000,
            redacted_fields: DEFAULT_REDACTED_FIELDS.iter().map(|f| f.to_string()).collect(),
            privileged_capability: Capability::VIEW_PRIVILEGED.to_string(),
        }
    }
}

impl WebhookConfig {
    /// Creates a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the disable threshold.
    pub fn disable_threshold(mut self, threshold: u32) -> Self {
        self.disable_threshold = threshold;
        self
    }

    /// Sets the request timeout.
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = ms;
        self
    }

    /// Sets the redacted field set.
    pub fn redacted_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.redacted_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn redaction_policy(&self) -> RedactionPolicy {
        RedactionPolicy::new(
            self.redacted_fields.iter().cloned(),
            Capability::new(&self.privileged_capability),
        )
    }
}

/// The main webhook system.
pub struct WebhookSystem {
    config: WebhookConfig,
    store: Arc<dyn SubscriberStore>,
    engine: Arc<DeliveryEngine>,
}

impl WebhookSystem {
    /// Wires the delivery engine, failure tracker and notifier together.
    pub fn new(
        config: WebhookConfig,
        store: Arc<dyn SubscriberStore>,
        transport: Arc<dyn WebhookTransport>,
        notifier: Arc<dyn DisablementNotifier>,
    ) -> Self {
        let tracker = FailureTracker::new(Arc::clone(&store), notifier)
            .with_threshold(config.disable_threshold);
        let engine = DeliveryEngine::new(Arc::clone(&store), transport, tracker)
            .with_redaction(config.redaction_policy())
            .with_timeout(config.request_timeout());

        Self {
            config,
            store,
            engine: Arc::new(engine),
        }
    }

    /// Schedules delivery of an event; never blocks on endpoint outcomes.
    pub fn deliver(&self, event: Event) -> DeliveryTicket {
        self.engine.deliver(event)
    }

    /// Administrative operations over this system's subscribers.
    pub fn admin(&self) -> SubscriberAdmin {
        SubscriberAdmin::new(Arc::clone(&self.store))
    }

    /// Gets the subscriber store.
    pub fn store(&self) -> &Arc<dyn SubscriberStore> {
        &self.store
    }

    /// Gets the delivery engine.
    pub fn engine(&self) -> &Arc<DeliveryEngine> {
        &self.engine
    }

    /// Gets the configuration.
    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// Closes the engine and waits for in-flight deliveries.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let tasks = self.engine.tasks();
        tasks.close();
        tokio::time::timeout(timeout, tasks.wait()).await.is_ok()
    }

    /// Creates an event handler that schedules webhook deliveries.
    pub fn create_event_handler(self: Arc<Self>) -> WebhookEventHandler {
        WebhookEventHandler { system: self }
    }

    /// Connects to an event bus.
    pub async fn connect_to_events(self: Arc<Self>, bus: &EventBus) {
        let handler = self.create_event_handler();
        bus.on(handler).await;
    }
}

/// Event handler that schedules webhook deliveries.
pub struct WebhookEventHandler {
    system: Arc<WebhookSystem>,
}

#[async_trait::async_trait]
impl EventHandler for WebhookEventHandler {
    fn id(&self) -> &str {
        "webhook-system"
    }

    async fn handle(&self, event: &Event) -> Result<(), EventError> {
        // The ticket is dropped: outcomes are folded into the failure tracker.
        let _ = self.system.deliver(event.clone());
        Ok(())
    }
}
