//! Player port definitions.
//!
//! The session adapter and bootstrap loader only talk to the outside world
//! through these traits, so tests can swap in the loopback transport or a
//! mock bootstrap source.

pub mod outbound;
