//! WebSocket handling for GM and player clients.
//!
//! A connection subscribes to session channels and publishes event
//! envelopes on them. Every publish goes through the event router; every
//! subscriber, the publisher included, gets the routed event back.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use tavern_domain::{Identity, PlayerId, SessionRole, GAME_MASTER_NAME};
use tavern_shared::{
    channel_name, classify, error_codes, join_code_from_channel, ClientMessage, EventEnvelope,
    ServerMessage, SessionEvent, KICKED_CLOSE_CODE,
};

use super::connections::{ConnectionManager, Outbound};
use crate::app::App;
use crate::infrastructure::channels::Subscription;
use crate::use_cases::relay::RouteError;

/// Buffer size for per-connection message channel.
const CONNECTION_CHANNEL_BUFFER: usize = 256;

/// Combined state for WebSocket handlers.
pub struct WsState {
    pub app: Arc<App>,
    pub connections: Arc<ConnectionManager>,
}

impl WsState {
    pub fn new(app: Arc<App>) -> Self {
        Self {
            app,
            connections: Arc::new(ConnectionManager::new()),
        }
    }
}

/// Per-connection channel forwarders, keyed by channel name.
type Forwarders = HashMap<String, JoinHandle<()>>;

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<WsState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<WsState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Create a unique client ID for this connection
    let connection_id = Uuid::new_v4();

    // Create a bounded channel for sending frames to this client
    let (tx, mut rx) = mpsc::channel::<Outbound>(CONNECTION_CHANNEL_BUFFER);

    state.connections.register(connection_id, tx.clone()).await;

    tracing::info!(connection_id = %connection_id, "WebSocket connection established");

    // Spawn a task to forward frames from the channel to the WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame {
                Outbound::Message(msg) => {
                    let json = match serde_json::to_string(&msg) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to serialize server message");
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    let _ = ws_sender.send(Message::Close(Some(frame))).await;
                    break;
                }
            }
        }
    });

    let mut forwarders = Forwarders::new();

    // Handle incoming messages. Requests from one connection are processed
    // in arrival order.
    loop {
        tokio::select! {
            incoming = ws_receiver.next() => {
                let Some(result) = incoming else { break };
                match result {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ClientMessage>(text.as_str()) {
                            Ok(msg) => {
                                if let Some(response) =
                                    handle_message(msg, &state, connection_id, &tx, &mut forwarders).await
                                {
                                    if tx.try_send(Outbound::Message(response)).is_err() {
                                        tracing::warn!(
                                            connection_id = %connection_id,
                                            "Failed to send response, channel full or closed"
                                        );
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::warn!(connection_id = %connection_id, error = %e, "Failed to parse message");
                                let error = ServerMessage::error(
                                    error_codes::INVALID_MESSAGE,
                                    format!("Invalid message format: {e}"),
                                );
                                let _ = tx.try_send(Outbound::Message(error));
                            }
                        }
                    }
                    Ok(Message::Ping(_)) => {
                        let _ = tx.try_send(Outbound::Message(ServerMessage::Pong));
                    }
                    Ok(Message::Close(_)) => {
                        tracing::info!(connection_id = %connection_id, "WebSocket closed by client");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(connection_id = %connection_id, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
            // Writer stopped: client gone or connection closed by us (kick).
            _ = &mut send_task => break,
        }
    }

    // Clean up
    for (_, forwarder) in forwarders.drain() {
        forwarder.abort();
    }
    if let Some(info) = state.connections.unregister(connection_id).await {
        if let Some(identity) = &info.identity {
            for channel in &info.channels {
                release_roster_slot(&state, connection_id, channel, identity).await;
            }
        }
    }
    send_task.abort();

    tracing::info!(connection_id = %connection_id, "WebSocket connection terminated");
}

/// Dispatch a parsed client message to the appropriate handler.
async fn handle_message(
    msg: ClientMessage,
    state: &WsState,
    connection_id: Uuid,
    tx: &mpsc::Sender<Outbound>,
    forwarders: &mut Forwarders,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Heartbeat => Some(ServerMessage::Pong),

        ClientMessage::Subscribe {
            channel,
            user_id,
            display_name,
            role,
        } => {
            handle_subscribe(
                state,
                connection_id,
                tx,
                forwarders,
                channel,
                user_id,
                display_name,
                role,
            )
            .await
        }

        ClientMessage::Unsubscribe { channel } => {
            let channel = canonical_channel(channel);
            if let Some(forwarder) = forwarders.remove(&channel) {
                forwarder.abort();
            }
            let identity = state
                .connections
                .get(connection_id)
                .await
                .and_then(|info| info.identity);
            if state.connections.unsubscribe(connection_id, &channel).await {
                tracing::info!(connection_id = %connection_id, channel = %channel, "Connection unsubscribed");
                if let Some(identity) = identity {
                    release_roster_slot(state, connection_id, &channel, &identity).await;
                }
            }
            None
        }

        ClientMessage::Publish { channel, event } => {
            handle_publish(state, connection_id, canonical_channel(channel), event).await
        }

        ClientMessage::Unknown => {
            tracing::warn!(connection_id = %connection_id, "Ignoring unknown client message type");
            None
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_subscribe(
    state: &WsState,
    connection_id: Uuid,
    tx: &mpsc::Sender<Outbound>,
    forwarders: &mut Forwarders,
    channel: String,
    user_id: String,
    display_name: Option<String>,
    role: SessionRole,
) -> Option<ServerMessage> {
    let join_code = match join_code_from_channel(&channel) {
        Ok(code) => code,
        Err(e) => {
            return Some(ServerMessage::error(
                error_codes::INVALID_CHANNEL,
                e.to_string(),
            ))
        }
    };
    // `Subscribed` and every forwarded event carry the canonical name.
    let channel = channel_name(&join_code);
    if user_id.trim().is_empty() {
        return Some(ServerMessage::error(
            error_codes::INVALID_MESSAGE,
            "user_id cannot be empty",
        ));
    }

    // Ad-hoc sessions without a record are allowed; ended ones are not.
    match state.app.repositories.session_state.load(&join_code).await {
        Ok(Some(session)) if session.is_archived() => {
            return Some(ServerMessage::error(
                error_codes::SESSION_ENDED,
                format!("Session {join_code} has ended"),
            ));
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(join_code = %join_code, error = %e, "Failed to load session on subscribe");
        }
    }

    let display_name = display_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| match role {
            SessionRole::Gm => GAME_MASTER_NAME.to_string(),
            SessionRole::Player => user_id.clone(),
        });
    let identity = Identity {
        user_id: PlayerId::new(user_id),
        display_name,
        role,
    };

    if let Err(e) = state
        .connections
        .subscribe(connection_id, &channel, identity.clone())
        .await
    {
        tracing::warn!(connection_id = %connection_id, error = %e, "Subscribe on unknown connection");
        return None;
    }

    if forwarders.contains_key(&channel) {
        return Some(ServerMessage::Subscribed { channel });
    }

    // Subscribe to the hub before confirming so nothing published after the
    // confirmation is missed.
    let subscription = state.app.hub.subscribe(&channel);
    if tx
        .send(Outbound::Message(ServerMessage::Subscribed {
            channel: channel.clone(),
        }))
        .await
        .is_err()
    {
        return None;
    }
    forwarders.insert(
        channel,
        spawn_forwarder(subscription, tx.clone(), identity),
    );
    None
}

async fn handle_publish(
    state: &WsState,
    connection_id: Uuid,
    channel: String,
    event: EventEnvelope,
) -> Option<ServerMessage> {
    let identity = match state.connections.get(connection_id).await {
        Some(info) if info.channels.contains(&channel) => info.identity,
        _ => None,
    };
    let Some(identity) = identity else {
        return Some(ServerMessage::error(
            error_codes::NOT_SUBSCRIBED,
            format!("Not subscribed to {channel}"),
        ));
    };

    match state
        .app
        .use_cases
        .relay
        .route
        .execute(&channel, &identity, event)
        .await
    {
        Ok(_) => None,
        Err(e @ RouteError::Forbidden { .. }) => {
            Some(ServerMessage::error(error_codes::FORBIDDEN, e.to_string()))
        }
        Err(e @ RouteError::InvalidChannel(_)) => {
            Some(ServerMessage::error(error_codes::INVALID_CHANNEL, e.to_string()))
        }
    }
}

/// Join codes are case-insensitive, so `session-abcd` and `session-ABCD`
/// name the same channel. Names that are not session channels are kept as
/// they are and rejected further down.
fn canonical_channel(channel: String) -> String {
    match join_code_from_channel(&channel) {
        Ok(join_code) => channel_name(&join_code),
        Err(_) => channel,
    }
}

/// Pump hub events for one channel into the connection's writer.
///
/// A player who receives their own kick gets the event first, then a close
/// frame.
fn spawn_forwarder(
    mut subscription: Subscription,
    tx: mpsc::Sender<Outbound>,
    viewer: Identity,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let channel = subscription.channel().to_string();
        while let Some(event) = subscription.recv().await {
            let kicked = !viewer.is_gm() && kicks(&event, &viewer.user_id);
            let msg = ServerMessage::Event {
                channel: channel.clone(),
                event: (*event).clone(),
            };
            if tx.send(Outbound::Message(msg)).await.is_err() {
                break;
            }
            if kicked {
                tracing::info!(channel = %channel, user_id = %viewer.user_id, "Closing kicked player's connection");
                let _ = tx
                    .send(Outbound::Close {
                        code: KICKED_CLOSE_CODE,
                        reason: "kicked".to_string(),
                    })
                    .await;
                break;
            }
        }
    })
}

fn kicks(event: &EventEnvelope, user_id: &PlayerId) -> bool {
    matches!(
        classify(event),
        Ok(classified) if matches!(
            &classified.event,
            SessionEvent::PlayerKicked { player_id } if player_id == user_id
        )
    )
}

/// Drop a player from the roster once their last connection on the channel
/// is gone.
async fn release_roster_slot(
    state: &WsState,
    connection_id: Uuid,
    channel: &str,
    identity: &Identity,
) {
    if identity.is_gm() {
        return;
    }
    if state
        .connections
        .has_user_on_channel(channel, &identity.user_id, connection_id)
        .await
    {
        return;
    }
    let Ok(join_code) = join_code_from_channel(channel) else {
        return;
    };
    if state.app.roster.remove(&join_code, &identity.user_id).is_some() {
        tracing::info!(
            join_code = %join_code,
            player_id = %identity.user_id,
            "Player left, removed from roster"
        );
    }
}
