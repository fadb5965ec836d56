//! Tavern Player - client side of a session channel.
//!
//! ## Structure
//!
//! - `ports/` - transport and bootstrap-source traits
//! - `application/` - the session adapter and the join sequence
//! - `state/` - local game state derived from the snapshot and events
//! - `infrastructure/` - WebSocket transport and HTTP bootstrap source
//! - `terminal` - command parsing and rendering for the CLI binary

pub mod application;
pub mod config;
pub mod infrastructure;
pub mod ports;
pub mod state;
pub mod terminal;

pub use application::{BootstrapLoader, BootstrapOutcome, SessionAdapter};
pub use config::{ConfigError, PlayerConfig};
pub use infrastructure::{HttpBootstrapSource, WsTransport};
