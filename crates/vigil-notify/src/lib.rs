//! Notification delivery for finished alert events.
//!
//! The [`consumer::EventConsumer`] drains the engine's event queue and
//! routes each event to the [`NotificationChannel`] implementations named
//! in the event's routing. Delivery failures are the channel's problem
//! (retries included); the consumer's contract is that every event's
//! outcome is recorded, never silently discarded.

pub mod channels;
pub mod consumer;
pub mod error;


use anyhow::Result;
use async_trait::async_trait;

use vigil_common::types::AlertEvent;

/// A delivery channel for alert and recovery events (e.g. a webhook
/// endpoint).
///
/// Implementations own their retry policy; `send` returns only after the
/// event is delivered or retries are exhausted.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Delivers the event through this channel.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails after retries (if applicable).
    async fn send(&self, event: &AlertEvent) -> Result<()>;

    /// The channel name events are routed by (e.g. `"webhook-ops"`).
    fn channel_name(&self) -> &str;
}
