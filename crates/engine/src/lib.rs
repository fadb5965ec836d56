//! Tavern Engine library.
//!
//! This crate contains all server-side code for the tabletop session relay.
//!
//! ## Structure
//!
//! - `use_cases/` - Event routing and session lifecycle
//! - `infrastructure/` - Ports, storage adapters and the channel hub
//! - `stores/` - Runtime-only state (connected-player rosters)
//! - `api/` - HTTP and WebSocket entry points
//! - `app` - Application composition

pub mod api;
pub mod app;
pub mod config;
pub mod infrastructure;
pub mod stores;
pub mod use_cases;


pub use app::App;
pub use config::EngineConfig;
