//! Client-side session state
//!
//! Everything here is plain data owned by one session adapter. Nothing is
//! shared across clients and nothing performs I/O.

mod game_state;
mod recent_ids;

pub use game_state::{GameState, LogEntry, LogKind, PrivateScene, LOG_CAPACITY};
pub use recent_ids::{RecentIds, RECENT_ID_CAPACITY};
