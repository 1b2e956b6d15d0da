use tokio_util::sync::CancellationToken;

use vigil_common::types::AlertEvent;
use vigil_engine::queue::EventReceiver;

use crate::NotificationChannel;

/// The single consumer of the engine's event queue. Pulls events in queue
/// order and fans each one out to the channels its rule routes to.
pub struct EventConsumer {
    channels: Vec<Box<dyn NotificationChannel>>,
    cancel: CancellationToken,
}

impl EventConsumer {
    pub fn new(channels: Vec<Box<dyn NotificationChannel>>, cancel: CancellationToken) -> Self {
        Self { channels, cancel }
    }

    pub async fn run(self, mut events: EventReceiver) {
        tracing::info!(channels = self.channels.len(), "event consumer started");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                maybe = events.recv() => match maybe {
                    Some(event) => self.dispatch(&event).await,
                    // all producers gone, nothing left to drain
                    None => break,
                }
            }
        }
        tracing::info!("event consumer stopped");
    }

    /// Every event's outcome is recorded: delivered, failed, or unroutable.
    pub async fn dispatch(&self, event: &AlertEvent) {
        let mut matched = false;
        for channel in &self.channels {
            if !event
                .notify_channels
                .iter()
                .any(|name| name == channel.channel_name())
            {
                continue;
            }
            matched = true;
            match channel.send(event).await {
                Ok(()) => tracing::info!(
                    channel = channel.channel_name(),
                    hash = %event.hash,
                    recovered = event.is_recovered,
                    "event delivered"
                ),
                Err(e) => tracing::error!(
                    channel = channel.channel_name(),
                    hash = %event.hash,
                    error = %e,
                    "event delivery failed"
                ),
            }
        }
        if !matched {
            tracing::warn!(
                rule_id = event.rule_id,
                hash = %event.hash,
                routes = ?event.notify_channels,
                "no notification channel matched"
            );
        }
    }
}
