//! WebSocket message types for Engine-Player communication
//!
//! The engine's websocket only carries channel membership and event
//! envelopes; what an event means is decided by [`crate::events::classify`].
//!
//! ## Versioning Policy
//!
//! - New variants can be added at the end (forward compatible)
//! - Renaming variants is a breaking change
//! - Unknown message types deserialize to `Unknown` for forward compatibility

use serde::{Deserialize, Serialize};

use tavern_domain::SessionRole;

use crate::envelope::EventEnvelope;

// =============================================================================
// Client Messages (Player → Engine)
// =============================================================================

/// Messages from client (Player or GM) to server (Engine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Join a session channel. `user_id` and `role` come from the external
    /// auth layer and are taken at face value.
    Subscribe {
        channel: String,
        user_id: String,
        #[serde(default)]
        display_name: Option<String>,
        #[serde(default)]
        role: SessionRole,
    },
    /// Leave a channel
    Unsubscribe { channel: String },
    /// Publish an event to every subscriber of a channel, sender included
    Publish {
        channel: String,
        event: EventEnvelope,
    },
    /// Keep-alive
    Heartbeat,
    /// Unknown message type for forward compatibility
    #[serde(other)]
    Unknown,
}

// =============================================================================
// Server Messages (Engine → Player)
// =============================================================================

/// Messages from server (Engine) to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Subscription is live; events published from now on will arrive
    Subscribed { channel: String },
    /// An event routed on a channel this connection is subscribed to
    Event {
        channel: String,
        event: EventEnvelope,
    },
    /// Request could not be handled
    Error { code: String, message: String },
    /// Heartbeat reply
    Pong,
    /// Unknown message type for forward compatibility
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Close code sent to a player removed by `PLAYER_KICKED`. Clients must not
/// reconnect after it.
pub const KICKED_CLOSE_CODE: u16 = 4001;

/// Error codes carried by [`ServerMessage::Error`].
pub mod error_codes {
    pub const INVALID_MESSAGE: &str = "INVALID_MESSAGE";
    pub const INVALID_CHANNEL: &str = "INVALID_CHANNEL";
    pub const NOT_SUBSCRIBED: &str = "NOT_SUBSCRIBED";
    pub const SESSION_ENDED: &str = "SESSION_ENDED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
}
