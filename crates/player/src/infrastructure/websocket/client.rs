//! Engine WebSocket client using tokio-tungstenite

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use tavern_domain::Identity;
use tavern_shared::{error_codes, ClientMessage, EventEnvelope, ServerMessage, KICKED_CLOSE_CODE};

use super::core::BackoffState;
use crate::ports::outbound::{
    ChannelDelivery, ChannelTransport, ConnectionState, EventStream, TransportError,
};

type SocketReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

const OUTBOUND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 256;
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

struct ChannelSlot {
    identity: Identity,
    sender: mpsc::Sender<ChannelDelivery>,
}

struct PendingSubscribe {
    channel: String,
    reply: oneshot::Sender<Result<(), TransportError>>,
}

struct Inner {
    url: String,
    state: RwLock<ConnectionState>,
    outbound: Mutex<Option<mpsc::Sender<ClientMessage>>>,
    channels: Mutex<HashMap<String, ChannelSlot>>,
    pending: Mutex<Option<PendingSubscribe>>,
    /// One subscribe round-trip at a time.
    subscribe_lock: Mutex<()>,
    /// Set when the disconnect was asked for (vs an unexpected close)
    intentional_disconnect: AtomicBool,
}

/// Channel transport over the engine's `/ws` endpoint.
///
/// After an unexpected close the transport reconnects with exponential
/// backoff and re-subscribes every channel it holds. Event streams stay
/// open across reconnects and get a [`ChannelDelivery::Resubscribed`] once
/// the engine confirms; they end on an intentional disconnect, on a kick,
/// or when reconnecting gives up.
#[derive(Clone)]
pub struct WsTransport {
    inner: Arc<Inner>,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                state: RwLock::new(ConnectionState::Disconnected),
                outbound: Mutex::new(None),
                channels: Mutex::new(HashMap::new()),
                pending: Mutex::new(None),
                subscribe_lock: Mutex::new(()),
                intentional_disconnect: AtomicBool::new(false),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub async fn state(&self) -> ConnectionState {
        *self.inner.state.read().await
    }

    /// Open the connection. Returns once the socket is up; reconnection
    /// after that happens in the background.
    pub async fn connect(&self) -> Result<(), TransportError> {
        self.inner
            .intentional_disconnect
            .store(false, Ordering::SeqCst);

        let session = self.inner.open().await?;
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.supervise(session).await });
        Ok(())
    }

    pub async fn disconnect(&self) {
        self.inner
            .intentional_disconnect
            .store(true, Ordering::SeqCst);
        if let Some(pending) = self.inner.pending.lock().await.take() {
            let _ = pending.reply.send(Err(TransportError::Closed));
        }
        // Dropping the sender ends the write task, which closes the socket.
        self.inner.outbound.lock().await.take();
        self.inner.set_state(ConnectionState::Disconnected).await;
    }

    pub async fn heartbeat(&self) -> Result<(), TransportError> {
        self.inner.send(ClientMessage::Heartbeat).await
    }
}

impl Inner {
    async fn set_state(&self, new_state: ConnectionState) {
        *self.state.write().await = new_state;
    }

    async fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        // Clone the sender to avoid holding the lock across await
        let tx = self.outbound.lock().await.clone();
        let Some(tx) = tx else {
            return Err(TransportError::NotConnected);
        };
        tx.send(message).await.map_err(|_| TransportError::Closed)
    }

    /// Connect and spawn the read and write tasks. The returned task
    /// resolves when the connection ends, with `true` for an unexpected end.
    async fn open(self: &Arc<Self>) -> Result<JoinHandle<bool>, TransportError> {
        self.set_state(ConnectionState::Connecting).await;

        let (ws_stream, _) = match connect_async(self.url.as_str()).await {
            Ok(connected) => connected,
            Err(e) => {
                tracing::error!(url = %self.url, error = %e, "Failed to connect to engine");
                self.set_state(ConnectionState::Failed).await;
                return Err(TransportError::Connect(e.to_string()));
            }
        };
        tracing::info!(url = %self.url, "Connected to engine");
        self.set_state(ConnectionState::Connected).await;

        let (mut write, read) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<ClientMessage>(OUTBOUND_BUFFER);
        *self.outbound.lock().await = Some(tx);

        let reader = {
            let inner = Arc::clone(self);
            tokio::spawn(async move { inner.read_loop(read).await })
        };

        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize WebSocket message");
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(json)).await {
                    tracing::error!(error = %e, "Failed to send message");
                    return;
                }
            }
            let _ = write.close().await;
        });

        Ok(tokio::spawn(async move {
            let mut reader = reader;
            let mut writer = writer;
            tokio::select! {
                result = &mut reader => {
                    writer.abort();
                    result.unwrap_or(true)
                }
                _ = &mut writer => {
                    tracing::debug!("Write task completed");
                    reader.abort();
                    true
                }
            }
        }))
    }

    /// Returns whether the connection ended unexpectedly.
    async fn read_loop(&self, mut read: SocketReader) -> bool {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(message) => self.route(message).await,
                    Err(e) => tracing::warn!(error = %e, "Failed to parse server message"),
                },
                Ok(Message::Close(frame)) => {
                    let code = frame.as_ref().map(|f| u16::from(f.code));
                    if code == Some(KICKED_CLOSE_CODE) {
                        tracing::info!("Removed from the session by the GM");
                        return false;
                    }
                    tracing::info!(?code, "Server closed connection");
                    return !self.intentional_disconnect.load(Ordering::SeqCst);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "WebSocket error");
                    return true;
                }
            }
        }
        !self.intentional_disconnect.load(Ordering::SeqCst)
    }

    async fn route(&self, message: ServerMessage) {
        match message {
            ServerMessage::Event { channel, event } => {
                self.deliver(&channel, ChannelDelivery::Event(event)).await;
            }
            ServerMessage::Subscribed { channel } => {
                if !self.resolve_pending(Some(&channel), Ok(())).await {
                    tracing::debug!(channel = %channel, "Re-subscribed");
                    self.deliver(&channel, ChannelDelivery::Resubscribed).await;
                }
            }
            ServerMessage::Error { code, message } => {
                let publish_error =
                    code == error_codes::FORBIDDEN || code == error_codes::NOT_SUBSCRIBED;
                if !publish_error {
                    let rejected = Err(TransportError::Rejected {
                        code: code.clone(),
                        message: message.clone(),
                    });
                    if self.resolve_pending(None, rejected).await {
                        return;
                    }
                }
                tracing::warn!(code = %code, message = %message, "Engine reported an error");
            }
            ServerMessage::Pong => tracing::trace!("Pong"),
            ServerMessage::Unknown => tracing::debug!("Ignoring unknown server message"),
        }
    }

    async fn deliver(&self, channel: &str, delivery: ChannelDelivery) {
        let sender = self
            .channels
            .lock()
            .await
            .get(channel)
            .map(|slot| slot.sender.clone());
        match sender {
            Some(sender) => {
                if sender.send(delivery).await.is_err() {
                    tracing::debug!(channel = %channel, "Event stream dropped by subscriber");
                }
            }
            None => tracing::debug!(channel = %channel, "Delivery for unknown channel"),
        }
    }

    /// Answer the in-flight subscribe, if there is one for `channel`.
    async fn resolve_pending(
        &self,
        channel: Option<&str>,
        result: Result<(), TransportError>,
    ) -> bool {
        let mut pending = self.pending.lock().await;
        match pending.take() {
            Some(p) if channel.map_or(true, |c| c == p.channel) => {
                let _ = p.reply.send(result);
                true
            }
            other => {
                *pending = other;
                false
            }
        }
    }

    async fn supervise(self: Arc<Self>, mut session: JoinHandle<bool>) {
        loop {
            let unexpected = session.await.unwrap_or(true);
            self.outbound.lock().await.take();

            if !unexpected || self.intentional_disconnect.load(Ordering::SeqCst) {
                self.set_state(ConnectionState::Disconnected).await;
                self.close_channels().await;
                return;
            }

            tracing::info!("Connection closed unexpectedly, initiating reconnection");
            match self.reconnect_with_backoff().await {
                Some(next) => session = next,
                None => {
                    self.close_channels().await;
                    return;
                }
            }
        }
    }

    /// Attempt to reconnect with exponential backoff
    async fn reconnect_with_backoff(self: &Arc<Self>) -> Option<JoinHandle<bool>> {
        let mut backoff = BackoffState::default();

        loop {
            self.set_state(ConnectionState::Reconnecting).await;
            let Some(delay) = backoff.next_delay() else {
                tracing::error!("Max reconnection attempts reached, giving up");
                self.set_state(ConnectionState::Failed).await;
                return None;
            };
            tracing::info!(
                attempt = backoff.attempts(),
                max_attempts = backoff.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                "Reconnecting to engine"
            );

            tokio::time::sleep(delay).await;

            if self.intentional_disconnect.load(Ordering::SeqCst) {
                tracing::info!("Reconnection cancelled - intentional disconnect");
                self.set_state(ConnectionState::Disconnected).await;
                return None;
            }

            match self.open().await {
                Ok(session) => {
                    self.resubscribe_all().await;
                    return Some(session);
                }
                Err(e) => {
                    tracing::warn!(attempt = backoff.attempts(), error = %e, "Reconnection attempt failed");
                }
            }
        }
    }

    async fn resubscribe_all(&self) {
        let subscriptions: Vec<(String, Identity)> = self
            .channels
            .lock()
            .await
            .iter()
            .map(|(channel, slot)| (channel.clone(), slot.identity.clone()))
            .collect();

        for (channel, identity) in subscriptions {
            if let Err(e) = self.send(subscribe_message(&channel, &identity)).await {
                tracing::warn!(channel = %channel, error = %e, "Failed to re-subscribe");
            }
        }
    }

    async fn close_channels(&self) {
        let closed = {
            let mut channels = self.channels.lock().await;
            let count = channels.len();
            channels.clear();
            count
        };
        if closed > 0 {
            tracing::debug!(channels = closed, "Closed event streams");
        }
    }
}

fn subscribe_message(channel: &str, identity: &Identity) -> ClientMessage {
    ClientMessage::Subscribe {
        channel: channel.to_string(),
        user_id: identity.user_id.to_string(),
        display_name: Some(identity.display_name.clone()),
        role: identity.role,
    }
}

#[async_trait]
impl ChannelTransport for WsTransport {
    async fn subscribe(
        &self,
        channel: &str,
        identity: &Identity,
    ) -> Result<EventStream, TransportError> {
        let _guard = self.inner.subscribe_lock.lock().await;

        let (sender, receiver) = mpsc::channel(EVENT_BUFFER);
        let (reply, ack) = oneshot::channel();
        // Register before asking so no event after `Subscribed` is missed.
        self.inner.channels.lock().await.insert(
            channel.to_string(),
            ChannelSlot {
                identity: identity.clone(),
                sender,
            },
        );
        *self.inner.pending.lock().await = Some(PendingSubscribe {
            channel: channel.to_string(),
            reply,
        });

        let result = match self.inner.send(subscribe_message(channel, identity)).await {
            Err(e) => Err(e),
            Ok(()) => match tokio::time::timeout(SUBSCRIBE_TIMEOUT, ack).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(TransportError::Closed),
                Err(_) => Err(TransportError::Timeout),
            },
        };

        if let Err(e) = result {
            self.inner.pending.lock().await.take();
            self.inner.channels.lock().await.remove(channel);
            tracing::warn!(channel = %channel, error = %e, "Subscribe failed");
            return Err(e);
        }
        Ok(EventStream::new(receiver))
    }

    async fn publish(&self, channel: &str, event: EventEnvelope) -> Result<(), TransportError> {
        self.inner
            .send(ClientMessage::Publish {
                channel: channel.to_string(),
                event,
            })
            .await
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError> {
        self.inner.channels.lock().await.remove(channel);
        self.inner
            .send(ClientMessage::Unsubscribe {
                channel: channel.to_string(),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tavern_domain::SessionRole;

    #[test]
    fn subscribe_message_carries_identity() {
        let message = subscribe_message("session-ABCD", &Identity::gm("gm-1"));
        assert_eq!(
            message,
            ClientMessage::Subscribe {
                channel: "session-ABCD".to_string(),
                user_id: "gm-1".to_string(),
                display_name: Some("Game Master".to_string()),
                role: SessionRole::Gm,
            }
        );
    }

    #[tokio::test]
    async fn publish_before_connect_is_not_connected() {
        let transport = WsTransport::new("ws://127.0.0.1:1/ws");
        let result = transport
            .publish("session-ABCD", EventEnvelope::default())
            .await;

        assert_eq!(result, Err(TransportError::NotConnected));
        assert_eq!(transport.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn error_reply_rejects_pending_subscribe() {
        let transport = WsTransport::new("ws://127.0.0.1:1/ws");
        let (reply, ack) = oneshot::channel();
        *transport.inner.pending.lock().await = Some(PendingSubscribe {
            channel: "session-ABCD".to_string(),
            reply,
        });

        transport
            .inner
            .route(ServerMessage::error(error_codes::SESSION_ENDED, "Session has ended"))
            .await;

        assert!(matches!(
            ack.await.unwrap(),
            Err(TransportError::Rejected { code, .. }) if code == "SESSION_ENDED"
        ));
    }

    #[tokio::test]
    async fn forbidden_publish_does_not_resolve_subscribe() {
        let transport = WsTransport::new("ws://127.0.0.1:1/ws");
        let (reply, _ack) = oneshot::channel();
        *transport.inner.pending.lock().await = Some(PendingSubscribe {
            channel: "session-ABCD".to_string(),
            reply,
        });

        transport
            .inner
            .route(ServerMessage::error(error_codes::FORBIDDEN, "GM only"))
            .await;

        assert!(transport.inner.pending.lock().await.is_some());
    }

    #[tokio::test]
    async fn events_are_routed_to_their_channel() {
        let transport = WsTransport::new("ws://127.0.0.1:1/ws");
        let (sender, mut receiver) = mpsc::channel(4);
        transport.inner.channels.lock().await.insert(
            "session-ABCD".to_string(),
            ChannelSlot {
                identity: Identity::player("p1", "Ana"),
                sender,
            },
        );

        transport
            .inner
            .route(ServerMessage::Event {
                channel: "session-ABCD".to_string(),
                event: EventEnvelope::default().with_id("e1"),
            })
            .await;

        assert!(matches!(
            receiver.recv().await,
            Some(ChannelDelivery::Event(event)) if event.id() == Some("e1")
        ));
    }

    #[tokio::test]
    async fn unsolicited_subscribed_marks_channel_resubscribed() {
        let transport = WsTransport::new("ws://127.0.0.1:1/ws");
        let (sender, mut receiver) = mpsc::channel(4);
        transport.inner.channels.lock().await.insert(
            "session-ABCD".to_string(),
            ChannelSlot {
                identity: Identity::player("p1", "Ana"),
                sender,
            },
        );

        // No subscribe in flight: this is the answer to a reconnect.
        transport
            .inner
            .route(ServerMessage::Subscribed {
                channel: "session-ABCD".to_string(),
            })
            .await;

        assert_eq!(receiver.recv().await, Some(ChannelDelivery::Resubscribed));
    }
}
