//! Use cases - User story orchestration.
//!
//! Each module contains use cases for a specific area of the relay.
//! Use cases orchestrate across ports and runtime stores.

pub mod relay;
pub mod session;

// Re-export main types
pub use relay::RelayUseCases;
pub use session::SessionUseCases;
