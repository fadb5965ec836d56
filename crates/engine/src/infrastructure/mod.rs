//! Infrastructure implementations.
//!
//! Contains port trait implementations for external dependencies.

pub mod campaigns;
pub mod channels;
pub mod clock;
pub mod memory;
pub mod ports;
pub mod sqlite;
