//! Data handed to session adapter callbacks.

mod session_events;

pub use session_events::{
    AnnouncementEvent, DiceResultEvent, EventOrigin, InventoryEvent, PlayerActionEvent,
    PrivateSceneEvent, RollRequestEvent, StatsEvent, WhisperEvent,
};
