//! WebSocket transport to the engine
//!
//! - `core`: reconnection backoff math, free of any runtime
//! - `client`: tokio-tungstenite [`WsTransport`]

mod client;
mod core;

pub use client::WsTransport;
pub use core::{
    BackoffState, BACKOFF_MULTIPLIER, INITIAL_RETRY_DELAY_MS, MAX_RETRY_ATTEMPTS,
    MAX_RETRY_DELAY_MS,
};
