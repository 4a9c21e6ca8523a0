//! Consecutive-failure tracking with automatic disablement.
//!
//! State machine per subscriber:
//! - Active { failures: n }: success -> Active { 0 }, failure -> Active { n + 1 }
//!   or Disabled once n + 1 reaches the threshold (owner notified).
//! - Disabled: no further deliveries are scheduled; in-flight attempts still
//!   update the counter but never notify again. Only an administrator leaves
//!   this state.

use std::sync::Arc;

use crate::endpoint::Subscriber;
use crate::notifier::DisablementNotifier;
use crate::storage::{FailureRecord, SubscriberStore};

/// Consecutive failures after which a subscriber is disabled by default.
pub const DEFAULT_DISABLE_THRESHOLD: u32 = 5;

/// Applies delivery outcomes to subscriber failure state.
pub struct FailureTracker {
    store: Arc<dyn SubscriberStore>,
    notifier: Arc<dyn DisablementNotifier>,
    threshold: u32,
}

impl FailureTracker {
    /// Creates a tracker with the default threshold.
    pub fn new(store: Arc<dyn SubscriberStore>, notifier: Arc<dyn DisablementNotifier>) -> Self {
        Self {
            store,
            notifier,
            threshold: DEFAULT_DISABLE_THRESHOLD,
        }
    }

    /// Sets the disable threshold (minimum 1).
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Resets the subscriber's failure counter.
    pub async fn record_success(&self, subscriber: &Subscriber) -> Option<FailureRecord> {
        match self.store.record_success(&subscriber.id).await {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                tracing::debug!(endpoint_id = %subscriber.id, "Subscriber deleted before success was recorded");
                None
            }
            Err(e) => {
                tracing::error!(endpoint_id = %subscriber.id, "Failed to reset failure counter: {}", e);
                None
            }
        }
    }

    /// Counts a failure, disabling and notifying on the threshold crossing.
    pub async fn record_failure(&self, subscriber: &Subscriber) -> Option<FailureRecord> {
        let record = match self.store.record_failure(&subscriber.id, self.threshold).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!(endpoint_id = %subscriber.id, "Subscriber deleted before failure was recorded");
                return None;
            }
            Err(e) => {
                tracing::error!(endpoint_id = %subscriber.id, "Failed to increment failure counter: {}", e);
                return None;
            }
        };

        if record.newly_disabled {
            tracing::info!(
                endpoint_id = %subscriber.id,
                url = %subscriber.url,
                failures = record.failure_count,
                "Webhook endpoint disabled after consecutive failures"
            );

            let mut disabled = subscriber.clone();
            disabled.failure_count = record.failure_count;
            disabled.disabled = true;
            self.notifier.notify(&disabled);
        }

        Some(record)
    }
}
