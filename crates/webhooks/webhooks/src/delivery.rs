//! Webhook delivery attempts and engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use bans_events::Event;

use crate::endpoint::Subscriber;
use crate::error::{WebhookError, WebhookResult};
use crate::redaction::RedactionPolicy;
use crate::signature::{SIGNATURE_HEADER, WebhookSigner};
use crate::storage::SubscriberStore;
use crate::tracker::FailureTracker;
use crate::transport::{WebhookRequest, WebhookTransport};

/// Default upper bound for a single outbound POST.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one delivery attempt to one subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    /// Event ID.
    pub event_id: String,
    /// Endpoint ID.
    pub endpoint_id: String,
    /// HTTP status code (if a response was received).
    pub status_code: Option<u16>,
    /// Error message (if failed).
    pub error: Option<String>,
    /// Duration in milliseconds.
    pub duration_ms: u64,
    /// When the attempt finished.
    pub created_at: DateTime<Utc>,
}

impl DeliveryAttempt {
    /// Creates a successful attempt record.
    pub fn success(event: &Event, subscriber: &Subscriber, status_code: u16, duration_ms: u64) -> Self {
        Self {
            event_id: event.id.clone(),
            endpoint_id: subscriber.id.clone(),
            status_code: Some(status_code),
            error: None,
            duration_ms,
            created_at: Utc::now(),
        }
    }

    /// Creates a failed attempt record.
    pub fn failure(event: &Event, subscriber: &Subscriber, error: &WebhookError, duration_ms: u64) -> Self {
        let status_code = match error {
            WebhookError::HttpStatus(code) => Some(*code),
            _ => None,
        };
        Self {
            event_id: event.id.clone(),
            endpoint_id: subscriber.id.clone(),
            status_code,
            error: Some(error.to_string()),
            duration_ms,
            created_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Builds the outbound body `{ "type": kind, "<topic>": payload }`.
pub fn build_body(event: &Event, payload: Value) -> Value {
    let mut body = Map::new();
    body.insert("type".to_string(), Value::String(event.kind.as_str().to_string()));
    body.insert(event.topic.as_str().to_string(), payload);
    Value::Object(body)
}

/// Handle to a scheduled fan-out.
///
/// Dropping it does not cancel anything; awaiting it yields every attempt
/// once all of them have finished.
pub struct DeliveryTicket {
    handle: JoinHandle<Vec<DeliveryAttempt>>,
}

impl DeliveryTicket {
    /// Waits for every attempt of this fan-out.
    pub async fn wait(self) -> Vec<DeliveryAttempt> {
        match self.handle.await {
            Ok(attempts) => attempts,
            Err(e) => {
                tracing::error!("Webhook fan-out task failed: {}", e);
                Vec::new()
            }
        }
    }
}

/// Webhook delivery engine.
pub struct DeliveryEngine {
    store: Arc<dyn SubscriberStore>,
    transport: Arc<dyn WebhookTransport>,
    tracker: FailureTracker,
    redaction: RedactionPolicy,
    timeout: Duration,
    tasks: TaskTracker,
}

impl DeliveryEngine {
    /// Creates a new delivery engine.
    pub fn new(
        store: Arc<dyn SubscriberStore>,
        transport: Arc<dyn WebhookTransport>,
        tracker: FailureTracker,
    ) -> Self {
        Self {
            store,
            transport,
            tracker,
            redaction: RedactionPolicy::default(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            tasks: TaskTracker::new(),
        }
    }

    /// Sets the redaction policy.
    pub fn with_redaction(mut self, redaction: RedactionPolicy) -> Self {
        self.redaction = redaction;
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Tracker of in-flight fan-out and attempt tasks.
    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    /// Schedules delivery of an event to every eligible subscriber.
    ///
    /// Returns as soon as the fan-out is scheduled. Each subscriber gets its
    /// own task, so a slow endpoint never holds up another.
    pub fn deliver(self: &Arc<Self>, event: Event) -> DeliveryTicket {
        let engine = Arc::clone(self);
        let handle = self.tasks.spawn(async move { engine.fan_out(Arc::new(event)).await });
        DeliveryTicket { handle }
    }

    async fn fan_out(self: Arc<Self>, event: Arc<Event>) -> Vec<DeliveryAttempt> {
        let subscribers = match self.store.list_eligible(event.topic).await {
            Ok(subscribers) => subscribers,
            Err(e) => {
                tracing::error!(event_id = %event.id, "Failed to look up subscribers, dropping event: {}", e);
                return Vec::new();
            }
        };

        if subscribers.is_empty() {
            tracing::debug!(event_id = %event.id, topic = %event.topic, "No eligible subscribers");
            return Vec::new();
        }

        tracing::info!(
            event_id = %event.id,
            topic = %event.topic,
            kind = %event.kind,
            subscribers = subscribers.len(),
            "Dispatching webhooks"
        );

        let handles: Vec<_> = subscribers
            .into_iter()
            .map(|subscriber| {
                let engine = Arc::clone(&self);
                let event = Arc::clone(&event);
                self.tasks.spawn(async move { engine.attempt(&subscriber, &event).await })
            })
            .collect();

        let mut attempts = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(attempt) => attempts.push(attempt),
                Err(e) => tracing::error!(event_id = %event.id, "Webhook attempt task failed: {}", e),
            }
        }
        attempts
    }

    /// Performs one attempt and folds its outcome into the failure tracker.
    async fn attempt(&self, subscriber: &Subscriber, event: &Event) -> DeliveryAttempt {
        let start = Instant::now();
        let result = self.send(subscriber, event).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(status) => {
                tracing::debug!(endpoint_id = %subscriber.id, event_id = %event.id, status, "Webhook delivered");
                self.tracker.record_success(subscriber).await;
                DeliveryAttempt::success(event, subscriber, status, duration_ms)
            }
            Err(e) => {
                tracing::warn!(
                    endpoint_id = %subscriber.id,
                    event_id = %event.id,
                    url = %subscriber.url,
                    "Webhook delivery failed: {}",
                    e
                );
                self.tracker.record_failure(subscriber).await;
                DeliveryAttempt::failure(event, subscriber, &e, duration_ms)
            }
        }
    }

    /// Builds, signs and posts the request. Non-2xx responses are errors.
    async fn send(&self, subscriber: &Subscriber, event: &Event) -> WebhookResult<u16> {
        let request = self.build_request(subscriber, event)?;

        let status = tokio::time::timeout(request.timeout, self.transport.post(&request))
            .await
            .map_err(|_| WebhookError::Timeout)??;

        if (200..300).contains(&status) {
            Ok(status)
        } else {
            Err(WebhookError::HttpStatus(status))
        }
    }

    /// Builds the signed request a subscriber would receive for an event.
    pub fn build_request(&self, subscriber: &Subscriber, event: &Event) -> WebhookResult<WebhookRequest> {
        let signer = WebhookSigner::for_subscriber(&subscriber.id, &subscriber.secret)?;

        let payload = self.redaction.redact(&event.payload, &subscriber.scope);
        let body = serde_json::to_string(&build_body(event, payload))?;
        let signature = signer.sign(body.as_bytes());

        Ok(WebhookRequest {
            url: subscriber.url.clone(),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                (SIGNATURE_HEADER.to_string(), signature),
            ],
            body,
            timeout: self.timeout,
        })
    }
}
