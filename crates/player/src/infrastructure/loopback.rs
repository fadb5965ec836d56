//! In-process channel transport for tests.
//!
//! [`LoopbackHub`] stands in for the engine: every client gets its own
//! [`LoopbackTransport`] from [`LoopbackHub::connect`], and a publish on a
//! channel is delivered to every subscriber of that channel, the publisher
//! included. Duplicate delivery can be switched on to exercise
//! de-duplication, and [`LoopbackTransport::reconnect`] plays the part of a
//! dropped and restored connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use tavern_domain::Identity;
use tavern_shared::EventEnvelope;

use crate::ports::outbound::{ChannelDelivery, ChannelTransport, EventStream, TransportError};

const SUBSCRIBER_BUFFER: usize = 256;

struct Subscriber {
    connection: u64,
    sender: mpsc::Sender<ChannelDelivery>,
}

#[derive(Default)]
pub struct LoopbackHub {
    channels: Mutex<HashMap<String, Vec<Subscriber>>>,
    published: Mutex<Vec<EventEnvelope>>,
    duplicate_delivery: AtomicBool,
    next_connection: AtomicU64,
}

impl LoopbackHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver every event twice to each subscriber.
    pub fn set_duplicate_delivery(&self, enabled: bool) {
        self.duplicate_delivery.store(enabled, Ordering::SeqCst);
    }

    pub fn connect(self: &Arc<Self>) -> LoopbackTransport {
        LoopbackTransport {
            hub: Arc::clone(self),
            connection: self.next_connection.fetch_add(1, Ordering::SeqCst),
        }
    }

    /// Every event published so far, in publish order.
    pub async fn published(&self) -> Vec<EventEnvelope> {
        self.published.lock().await.clone()
    }

    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .await
            .get(channel)
            .map_or(0, Vec::len)
    }

    async fn deliver(&self, channel: &str, event: EventEnvelope) {
        self.published.lock().await.push(event.clone());

        let senders: Vec<mpsc::Sender<ChannelDelivery>> = {
            let mut channels = self.channels.lock().await;
            let Some(subscribers) = channels.get_mut(channel) else {
                tracing::debug!(channel = %channel, "Publish on channel with no subscribers");
                return;
            };
            subscribers.retain(|s| !s.sender.is_closed());
            subscribers.iter().map(|s| s.sender.clone()).collect()
        };

        let copies = if self.duplicate_delivery.load(Ordering::SeqCst) {
            2
        } else {
            1
        };
        for sender in senders {
            for _ in 0..copies {
                // A subscriber that went away between retain and send is fine.
                let _ = sender.send(ChannelDelivery::Event(event.clone())).await;
            }
        }
    }
}

/// One client's handle on a [`LoopbackHub`].
pub struct LoopbackTransport {
    hub: Arc<LoopbackHub>,
    connection: u64,
}

impl LoopbackTransport {
    /// Tell every channel this client holds that it was re-subscribed, as
    /// a websocket transport does after reconnecting.
    pub async fn reconnect(&self) {
        let senders: Vec<mpsc::Sender<ChannelDelivery>> = self
            .hub
            .channels
            .lock()
            .await
            .values()
            .flatten()
            .filter(|s| s.connection == self.connection)
            .map(|s| s.sender.clone())
            .collect();
        for sender in senders {
            let _ = sender.send(ChannelDelivery::Resubscribed).await;
        }
    }
}

#[async_trait]
impl ChannelTransport for LoopbackTransport {
    async fn subscribe(
        &self,
        channel: &str,
        _identity: &Identity,
    ) -> Result<EventStream, TransportError> {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut channels = self.hub.channels.lock().await;
        let subscribers = channels.entry(channel.to_string()).or_default();
        subscribers.retain(|s| s.connection != self.connection);
        subscribers.push(Subscriber {
            connection: self.connection,
            sender,
        });
        Ok(EventStream::new(receiver))
    }

    async fn publish(&self, channel: &str, event: EventEnvelope) -> Result<(), TransportError> {
        self.hub.deliver(channel, event).await;
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError> {
        let mut channels = self.hub.channels.lock().await;
        if let Some(subscribers) = channels.get_mut(channel) {
            subscribers.retain(|s| s.connection != self.connection);
            if subscribers.is_empty() {
                channels.remove(channel);
            }
        }
        Ok(())
    }
}
