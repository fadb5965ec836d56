//! Port traits for the engine's storage and its sources of time and
//! randomness. Use cases depend on these; adapters live next door in
//! `infrastructure`.
//!
//! - [`SessionStateRepo`] and [`PlayerRepo`]: SQLite or in-memory
//! - [`CampaignRepo`]: read-only JSON catalog
//! - [`ClockPort`] and [`RandomPort`]: injected so tests are deterministic

mod error;
mod repos;
mod testing;

pub use error::RepoError;
pub use repos::{CampaignRepo, PlayerRepo, SessionStateRepo};
pub use testing::{ClockPort, RandomPort};

#[cfg(test)]
pub use repos::{MockCampaignRepo, MockPlayerRepo, MockSessionStateRepo};
#[cfg(test)]
pub use testing::{MockClockPort, MockRandomPort};
