//! In-process channel transport.
//!
//! One `tokio::sync::broadcast` channel per session channel name. Every
//! subscriber receives every publish, the publisher included. A channel is
//! created by its first subscriber and removed when the last subscription is
//! dropped. Publishing to a channel nobody listens on is a logged no-op.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

use tavern_shared::EventEnvelope;

/// Default per-channel buffer. Subscribers that fall further behind skip
/// events (logged as lag).
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

pub type SharedEvent = Arc<EventEnvelope>;

pub struct ChannelHub {
    channels: DashMap<String, broadcast::Sender<SharedEvent>>,
    capacity: usize,
}

impl ChannelHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to a channel, creating it if needed.
    pub fn subscribe(self: &Arc<Self>, channel: &str) -> Subscription {
        let receiver = self
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| {
                tracing::debug!(channel = %channel, "Channel opened");
                broadcast::channel(self.capacity).0
            })
            .subscribe();

        Subscription {
            channel: channel.to_string(),
            receiver: Some(receiver),
            hub: Arc::clone(self),
        }
    }

    /// Fire-and-forget publish. Returns the number of subscribers the event
    /// was handed to.
    pub fn publish(&self, channel: &str, event: EventEnvelope) -> usize {
        let Some(sender) = self.channels.get(channel).map(|s| s.clone()) else {
            tracing::debug!(channel = %channel, "Publish to channel without subscribers");
            return 0;
        };
        match sender.send(Arc::new(event)) {
            Ok(count) => count,
            Err(_) => {
                tracing::debug!(channel = %channel, "All subscribers left before publish");
                0
            }
        }
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn release(&self, channel: &str) {
        let removed = self
            .channels
            .remove_if(channel, |_, sender| sender.receiver_count() == 0);
        if removed.is_some() {
            tracing::debug!(channel = %channel, "Channel closed, last subscriber left");
        }
    }
}

impl Default for ChannelHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

/// A live subscription. Dropping it unsubscribes.
pub struct Subscription {
    channel: String,
    receiver: Option<broadcast::Receiver<SharedEvent>>,
    hub: Arc<ChannelHub>,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next event, or `None` once the channel is gone.
    ///
    /// Lag is not an error: skipped events are logged and delivery resumes
    /// with the oldest retained event.
    pub async fn recv(&mut self) -> Option<SharedEvent> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        channel = %self.channel,
                        skipped,
                        "Subscriber lagged, events skipped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Drop the receiver first so the count seen by `release` excludes it.
        drop(self.receiver.take());
        self.hub.release(&self.channel);
    }
}
