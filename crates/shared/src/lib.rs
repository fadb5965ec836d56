//! Tavern Shared - Wire protocol for Engine and Player communication
//!
//! This crate contains the types both sides of a session agree on:
//! - The event envelope and its `actionType`/`type` compatibility shim
//! - The typed [`SessionEvent`] view and the routing table in [`classify`]
//! - WebSocket message types (ClientMessage, ServerMessage)
//! - REST and persistence DTOs
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - serde, serde_json, chrono and thiserror
//! 2. **No I/O** - pure data types, serialization and classification
//! 3. **Forward compatible** - unknown tags and message types never fail decoding

pub mod channel;
pub mod dto;
pub mod envelope;
pub mod events;
pub mod messages;

pub use channel::{channel_name, join_code_from_channel, CHANNEL_PREFIX};
pub use dto::{
    BootstrapSnapshot, CampaignAssets, PlayerRecord, SessionRecord, StartSessionRequest,
    UpsertPlayerRequest,
};
pub use envelope::{ActionType, EnvelopeError, EventEnvelope};
pub use events::{
    classify, classify_or_passthrough, parse_npc_list, ClassifiedEvent, InventoryChange,
    RollOutcome, SceneChange, SessionEvent,
};
pub use messages::{error_codes, ClientMessage, ServerMessage, KICKED_CLOSE_CODE};
