//! # Bans API Events
//!
//! Domain change events for the Bans API:
//! - Closed set of topics (user reports, user ban lists, content reports)
//! - Event bus fanning each mutation out to independent handlers
//! - Broker publisher with an explicit lifecycle
//!
//! ## Example
//!
//! ```rust,ignore
//! use bans_events::{EventBus, EventKind, Topic};
//!
//! let bus = EventBus::new();
//! bus.on(webhook_handler).await;
//!
//! // After the report has been written
//! bus.publish_event(Topic::User, EventKind::Create, &report);
//! ```

mod event;
mod bus;
mod handler;
mod error;
pub mod broker;

pub use event::{Event, EventKind, Topic};
pub use bus::EventBus;
pub use handler::{EventHandler, SharedHandler};
pub use error::{EventError, EventResult};
pub use broker::{BrokerHandler, BrokerMessage, BrokerPublisher, LoggingPublisher, RecordingPublisher};
