//! Tavern Domain - session relay value objects and invariants.
//!
//! Pure data and rules: no I/O, no async, no transport.

pub mod campaign;
pub mod character;
pub mod character_sheet;
pub mod dice;
pub mod error;
pub mod ids;
pub mod inventory;
pub mod participant;
pub mod roster;
pub mod session_state;

pub use campaign::{Campaign, GameSystem, NpcRef, PreGenCharacter, SceneRef};
pub use character::CharacterRuntimeState;
pub use character_sheet::{
    CharacterSheet, RoleAndRollSheet, RoleAndRollVitals, StandardSheet, StatsDelta, Vital,
};
pub use dice::{PooledRoll, RollRequest, RollStep, StandardRoll};
pub use error::DomainError;
pub use ids::{CampaignId, EventId, ItemId, JoinCode, NpcId, PlayerId, SceneId};
pub use inventory::{Inventory, ItemDescriptor, ItemType};
pub use participant::{Identity, SessionRole, Visibility, GAME_MASTER_NAME};
pub use roster::{Roster, RosterEntry};
pub use session_state::{SessionState, SessionStatePatch, SessionStatus};
