//! Owner notification when an endpoint is auto-disabled.
//!
//! Notification is best-effort: directory and mail failures are logged and
//! dropped, and never feed back into the subscriber's failure state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
#[cfg(feature = "http-client")]
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::task::TaskTracker;

use crate::endpoint::Subscriber;
use crate::error::{WebhookError, WebhookResult};

/// Resolves account ids to contact addresses.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Returns the owner's email, or `None` if the account is unknown.
    async fn contact_email(&self, owner: &str) -> WebhookResult<Option<String>>;
}

/// Message telling an owner that one of their endpoints was disabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisabledEndpointNotice {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub endpoint_id: String,
    pub endpoint_url: String,
    pub failure_count: u32,
}

impl DisabledEndpointNotice {
    /// Plain-text rendering, used when no template is configured.
    pub fn text(&self) -> String {
        format!(
            "Your webhook endpoint {} ({}) was disabled after {} consecutive failed deliveries.\n\
             Fix the endpoint, then ask an administrator to re-enable it.",
            self.endpoint_url, self.endpoint_id, self.failure_count
        )
    }
}

/// Sends notification emails.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, notice: &DisabledEndpointNotice) -> WebhookResult<()>;
}

/// Invoked by the failure tracker once per threshold crossing.
///
/// Must return immediately and must not fail.
pub trait DisablementNotifier: Send + Sync {
    fn notify(&self, subscriber: &Subscriber);
}

/// Notifier that emails the endpoint owner.
pub struct EmailNotifier {
    directory: Arc<dyn UserDirectory>,
    mailer: Arc<dyn Mailer>,
    from: String,
    tasks: TaskTracker,
}

impl EmailNotifier {
    pub fn new(directory: Arc<dyn UserDirectory>, mailer: Arc<dyn Mailer>, from: impl Into<String>) -> Self {
        Self {
            directory,
            mailer,
            from: from.into(),
            tasks: TaskTracker::new(),
        }
    }

    /// Tracker of in-flight notification tasks.
    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    async fn send_notice(
        directory: &dyn UserDirectory,
        mailer: &dyn Mailer,
        from: String,
        subscriber: Subscriber,
    ) {
        let to = match directory.contact_email(&subscriber.owner).await {
            Ok(Some(email)) => email,
            Ok(None) => {
                tracing::warn!(
                    endpoint_id = %subscriber.id,
                    owner = %subscriber.owner,
                    "Owner not found in directory, dropping disablement notice"
                );
                return;
            }
            Err(e) => {
                tracing::warn!(
                    endpoint_id = %subscriber.id,
                    owner = %subscriber.owner,
                    "Owner lookup failed, dropping disablement notice: {}",
                    e
                );
                return;
            }
        };

        let notice = DisabledEndpointNotice {
            to,
            from,
            subject: "Your webhook endpoint has been disabled".to_string(),
            endpoint_id: subscriber.id.clone(),
            endpoint_url: subscriber.url.clone(),
            failure_count: subscriber.failure_count,
        };

        match mailer.send(&notice).await {
            Ok(()) => tracing::info!(endpoint_id = %subscriber.id, "Disablement notice sent"),
            Err(e) => tracing::error!(endpoint_id = %subscriber.id, "Failed to send disablement notice: {}", e),
        }
    }
}

impl DisablementNotifier for EmailNotifier {
    fn notify(&self, subscriber: &Subscriber) {
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::error!(endpoint_id = %subscriber.id, "No async runtime, dropping disablement notice");
            return;
        }

        let directory = Arc::clone(&self.directory);
        let mailer = Arc::clone(&self.mailer);
        let from = self.from.clone();
        let subscriber = subscriber.clone();

        self.tasks.spawn(async move {
            Self::send_notice(directory.as_ref(), mailer.as_ref(), from, subscriber).await;
        });
    }
}

/// In-memory user directory.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    emails: RwLock<HashMap<String, String>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, owner: impl Into<String>, email: impl Into<String>) {
        self.emails.write().await.insert(owner.into(), email.into());
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn contact_email(&self, owner: &str) -> WebhookResult<Option<String>> {
        Ok(self.emails.read().await.get(owner).cloned())
    }
}

/// Mailer that writes notices to the log instead of sending them.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, notice: &DisabledEndpointNotice) -> WebhookResult<()> {
        tracing::info!(
            to = %notice.to,
            endpoint_id = %notice.endpoint_id,
            endpoint_url = %notice.endpoint_url,
            "Mail delivery disabled, notice not sent"
        );
        Ok(())
    }
}

/// Mailer using the SendGrid v3 HTTP API.
#[cfg(feature = "http-client")]
pub struct SendGridMailer {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    template_id: Option<String>,
    timeout: Duration,
}

#[cfg(feature = "http-client")]
impl SendGridMailer {
    /// Default API base URL.
    pub const DEFAULT_API_BASE: &'static str = "https://api.sendgrid.com";
    /// Upper bound on a single send, so a hung API call cannot stall shutdown.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            api_base: Self::DEFAULT_API_BASE.to_string(),
            template_id: None,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the API base URL.
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Uses a dynamic template instead of plain text.
    pub fn template_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.template_id = if id.is_empty() { None } else { Some(id) };
        self
    }

    fn request_body(&self, notice: &DisabledEndpointNotice) -> serde_json::Value {
        match &self.template_id {
            Some(template_id) => serde_json::json!({
                "personalizations": [{
                    "to": [{ "email": notice.to }],
                    "dynamic_template_data": {
                        "endpointId": notice.endpoint_id,
                        "url": notice.endpoint_url,
                        "failures": notice.failure_count,
                    },
                }],
                "from": { "email": notice.from },
                "template_id": template_id,
            }),
            None => serde_json::json!({
                "personalizations": [{ "to": [{ "email": notice.to }] }],
                "from": { "email": notice.from },
                "subject": notice.subject,
                "content": [{ "type": "text/plain", "value": notice.text() }],
            }),
        }
    }
}

#[cfg(feature = "http-client")]
#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, notice: &DisabledEndpointNotice) -> WebhookResult<()> {
        let url = format!("{}/v3/mail/send", self.api_base.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(notice))
            .send()
            .await
            .map_err(|e| WebhookError::MailError(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(WebhookError::MailError(format!("HTTP {}: {}", status.as_u16(), body)))
        }
    }
}
