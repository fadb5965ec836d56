//! Runtime state stores (in-memory, not persisted).

mod roster;

pub use roster::RosterStore;
