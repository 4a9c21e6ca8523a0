//! Outbound HTTP transport for webhook requests.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::WebhookResult;

/// A fully built, signed webhook request.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    /// Target URL.
    pub url: String,
    /// Headers, in insertion order.
    pub headers: Vec<(String, String)>,
    /// Exact JSON body bytes that were signed.
    pub body: String,
    /// Upper bound for the whole request.
    pub timeout: Duration,
}

impl WebhookRequest {
    /// Gets a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Sends webhook requests.
///
/// Implementations return the response status for any response received,
/// and an error only when no response arrived (connect failure, timeout).
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, request: &WebhookRequest) -> WebhookResult<u16>;
}

/// Transport backed by a shared `reqwest` client.
#[cfg(feature = "http-client")]
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

#[cfg(feature = "http-client")]
impl ReqwestTransport {
    /// Creates a transport with a fresh connection pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport reusing an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http-client")]
#[async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn post(&self, request: &WebhookRequest) -> WebhookResult<u16> {
        let mut builder = self
            .client
            .post(&request.url)
            .timeout(request.timeout);

        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }

        let response = builder.body(request.body.clone()).send().await?;
        Ok(response.status().as_u16())
    }
}
