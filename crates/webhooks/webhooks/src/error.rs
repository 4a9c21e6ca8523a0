//! Errors raised by delivery, administration and owner notification.

use thiserror::Error;

pub type WebhookResult<T> = Result<T, WebhookError>;

#[derive(Debug, Error)]
pub enum WebhookError {
    // Delivery: every one of these counts as a failed attempt.
    #[error("Endpoint responded with HTTP {0}")]
    HttpStatus(u16),

    /// Connection refused, DNS failure or a broken stream.
    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Subscriber {0} has no signing secret")]
    MissingSecret(String),

    /// The body could not be serialized.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    // Receiver side.
    #[error("Invalid signature")]
    InvalidSignature,

    // Registry and collaborators.
    #[error("Endpoint not found: {0}")]
    EndpointNotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Directory lookup failed: {0}")]
    DirectoryError(String),

    #[error("Mail delivery failed: {0}")]
    MailError(String),

    /// Rejected url or setting.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<serde_json::Error> for WebhookError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

#[cfg(feature = "http-client")]
impl From<reqwest::Error> for WebhookError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::HttpError(err.to_string())
        }
    }
}
