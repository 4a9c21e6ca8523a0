//! # Bans API Webhooks
//!
//! Webhook delivery for Bans API change events:
//! - Subscriber registry with per-topic eligibility
//! - Per-subscriber redaction of privileged payload fields
//! - HMAC-SHA256 signed, concurrent, non-blocking delivery
//! - Consecutive-failure tracking with automatic disablement
//! - Owner notification by email when an endpoint is disabled
//!
//! ## Example
//!
//! ```rust,ignore
//! use bans_webhooks::{WebhookSystem, WebhookConfig, InMemorySubscriberStore, ReqwestTransport};
//!
//! let system = Arc::new(WebhookSystem::new(
//!     WebhookConfig::default(),
//!     Arc::new(InMemorySubscriberStore::new()),
//!     Arc::new(ReqwestTransport::new()),
//!     notifier,
//! ));
//!
//! // Connect to event bus
//! system.connect_to_events(&event_bus).await;
//! ```

mod endpoint;
mod delivery;
mod signature;
mod redaction;
mod storage;
mod tracker;
mod error;
mod system;
pub mod admin;
pub mod notifier;
pub mod transport;

pub use endpoint::{Capability, Subscriber, SubscriberView};
pub use delivery::{DeliveryAttempt, DeliveryEngine, DeliveryTicket, build_body, DEFAULT_REQUEST_TIMEOUT};
pub use signature::{WebhookSigner, SIGNATURE_HEADER};
pub use redaction::{RedactionPolicy, DEFAULT_REDACTED_FIELDS};
pub use storage::{FailureRecord, InMemorySubscriberStore, SubscriberPatch, SubscriberStore};
pub use tracker::{FailureTracker, DEFAULT_DISABLE_THRESHOLD};
pub use error::{WebhookError, WebhookResult};
pub use system::{WebhookConfig, WebhookEventHandler, WebhookSystem};
pub use admin::{CreateSubscriber, EditSubscriber, SubscriberAdmin, SubscriberSecret};
pub use notifier::{DisabledEndpointNotice, DisablementNotifier, EmailNotifier, InMemoryUserDirectory, LogMailer, Mailer, UserDirectory};
pub use transport::{WebhookRequest, WebhookTransport};

#[cfg(feature = "http-client")]
pub use notifier::SendGridMailer;
#[cfg(feature = "http-client")]
pub use transport::ReqwestTransport;
