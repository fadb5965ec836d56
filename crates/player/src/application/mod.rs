//! Application layer
//!
//! Services here depend on the port traits in [`crate::ports`], never on
//! concrete transports.

pub mod dto;
pub mod services;

pub use services::{BootstrapLoader, BootstrapOutcome, SessionAdapter};
