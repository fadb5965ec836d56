//! Channel Transport Port - publish/subscribe access to session channels
//!
//! A channel delivers every published event to every current subscriber,
//! the publisher included. There is no ack and no retry: publish is
//! fire-and-forget from the caller's point of view.

use async_trait::async_trait;
use tokio::sync::mpsc;

use tavern_domain::Identity;
use tavern_shared::EventEnvelope;

/// Connection state for the engine connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected to the server
    Disconnected,
    /// Attempting to establish connection
    Connecting,
    /// Successfully connected
    Connected,
    /// Connection lost, attempting to reconnect
    Reconnecting,
    /// Connection failed (max retries exceeded)
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,
    #[error("Connection closed")]
    Closed,
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Timed out waiting for the engine")]
    Timeout,
    #[error("Engine rejected request ({code}): {message}")]
    Rejected { code: String, message: String },
}

/// What a subscribed channel hands to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelDelivery {
    Event(EventEnvelope),
    /// The connection dropped and the channel is live again. Events
    /// published while it was down are not replayed.
    Resubscribed,
}

/// Deliveries for one subscribed channel.
///
/// The stream stays open across reconnects and ends when the transport
/// drops the channel: after an unsubscribe, an intentional disconnect, a
/// kick, or when reconnecting gives up.
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::Receiver<ChannelDelivery>,
}

impl EventStream {
    pub fn new(receiver: mpsc::Receiver<ChannelDelivery>) -> Self {
        Self { receiver }
    }

    pub async fn recv(&mut self) -> Option<ChannelDelivery> {
        self.receiver.recv().await
    }

    /// Next event, skipping reconnect notices.
    pub async fn next_event(&mut self) -> Option<EventEnvelope> {
        loop {
            match self.recv().await? {
                ChannelDelivery::Event(event) => return Some(event),
                ChannelDelivery::Resubscribed => continue,
            }
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Join a channel as `identity`. Events published after this returns are
    /// delivered on the returned stream.
    async fn subscribe(
        &self,
        channel: &str,
        identity: &Identity,
    ) -> Result<EventStream, TransportError>;

    async fn publish(&self, channel: &str, event: EventEnvelope) -> Result<(), TransportError>;

    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError>;
}
