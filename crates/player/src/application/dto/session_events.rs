//! Typed events delivered to UI callbacks after filtering and de-duplication.

use tavern_domain::{CharacterRuntimeState, PlayerId, RollRequest, StatsDelta};
use tavern_shared::{InventoryChange, RollOutcome};

use crate::state::PrivateScene;

/// Who sent an event, and under which id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventOrigin {
    pub id: String,
    /// Empty for pure GM broadcasts.
    pub actor_id: Option<PlayerId>,
    pub actor_name: Option<String>,
}

impl EventOrigin {
    /// Display name, falling back to the actor id.
    pub fn display_name(&self) -> String {
        self.actor_name
            .clone()
            .or_else(|| self.actor_id.as_ref().map(ToString::to_string))
            .unwrap_or_else(|| "Someone".to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerActionEvent {
    pub origin: EventOrigin,
    /// Wire tag, e.g. `talk` or `attack`.
    pub kind: String,
    pub text: Option<String>,
    pub is_private: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiceResultEvent {
    pub origin: EventOrigin,
    pub outcome: RollOutcome,
    /// `RNR_LIVE_UPDATE`: an in-progress pooled roll, not a final result.
    pub live: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhisperEvent {
    pub origin: EventOrigin,
    pub target: Option<PlayerId>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrivateSceneEvent {
    pub origin: EventOrigin,
    pub target: PlayerId,
    pub scene: PrivateScene,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnouncementEvent {
    pub origin: EventOrigin,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RollRequestEvent {
    pub origin: EventOrigin,
    /// `None` asks every player.
    pub target: Option<PlayerId>,
    pub request: RollRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InventoryEvent {
    pub origin: EventOrigin,
    pub target: PlayerId,
    pub change: InventoryChange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsEvent {
    pub origin: EventOrigin,
    pub target: PlayerId,
    pub delta: StatsDelta,
    /// The character after the delta, when this client tracks it.
    pub character: Option<CharacterRuntimeState>,
}
