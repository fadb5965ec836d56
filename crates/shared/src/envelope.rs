//! Event envelope - the JSON shape every producer publishes.
//!
//! Producers disagree on the name of the dispatch tag: some send
//! `actionType`, others `type`. Both are accepted here and folded into one
//! canonical [`ActionType`] before anything dispatches on it. Action-specific
//! fields may sit inside `payload` or at the top level of the envelope;
//! lookups check `payload` first.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use tavern_domain::PlayerId;

/// Errors decoding an envelope's action-specific fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error("Invalid payload for {action}: {message}")]
    InvalidPayload { action: String, message: String },
}

/// Closed set of known dispatch tags, plus a passthrough for everything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionType {
    GmUpdateScene,
    GmSetGlobalScene,
    PrivateSceneUpdate,
    Whisper,
    GmRequestRoll,
    DiceRoll,
    RnrRoll,
    RnrLiveUpdate,
    GmManageInventory,
    StatsUpdate,
    JoinGame,
    PlayerKicked,
    Move,
    Attack,
    Talk,
    Inspect,
    Custom,
    Announce,
    /// Tag not in the table; routed fallback-open.
    Unknown(String),
}

impl ActionType {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "GM_UPDATE_SCENE" => Self::GmUpdateScene,
            "GM_SET_GLOBAL_SCENE" => Self::GmSetGlobalScene,
            "PRIVATE_SCENE_UPDATE" => Self::PrivateSceneUpdate,
            "WHISPER" => Self::Whisper,
            "GM_REQUEST_ROLL" => Self::GmRequestRoll,
            "dice_roll" => Self::DiceRoll,
            "rnr_roll" => Self::RnrRoll,
            "RNR_LIVE_UPDATE" => Self::RnrLiveUpdate,
            "GM_MANAGE_INVENTORY" => Self::GmManageInventory,
            "STATS_UPDATE" => Self::StatsUpdate,
            "JOIN_GAME" => Self::JoinGame,
            "PLAYER_KICKED" => Self::PlayerKicked,
            "move" => Self::Move,
            "attack" => Self::Attack,
            "talk" => Self::Talk,
            "inspect" => Self::Inspect,
            "custom" => Self::Custom,
            "ANNOUNCE" => Self::Announce,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::GmUpdateScene => "GM_UPDATE_SCENE",
            Self::GmSetGlobalScene => "GM_SET_GLOBAL_SCENE",
            Self::PrivateSceneUpdate => "PRIVATE_SCENE_UPDATE",
            Self::Whisper => "WHISPER",
            Self::GmRequestRoll => "GM_REQUEST_ROLL",
            Self::DiceRoll => "dice_roll",
            Self::RnrRoll => "rnr_roll",
            Self::RnrLiveUpdate => "RNR_LIVE_UPDATE",
            Self::GmManageInventory => "GM_MANAGE_INVENTORY",
            Self::StatsUpdate => "STATS_UPDATE",
            Self::JoinGame => "JOIN_GAME",
            Self::PlayerKicked => "PLAYER_KICKED",
            Self::Move => "move",
            Self::Attack => "attack",
            Self::Talk => "talk",
            Self::Inspect => "inspect",
            Self::Custom => "custom",
            Self::Announce => "ANNOUNCE",
            Self::Unknown(tag) => tag,
        }
    }

    /// Tags only the GM may emit.
    pub fn is_gm_only(&self) -> bool {
        matches!(
            self,
            Self::GmUpdateScene
                | Self::GmSetGlobalScene
                | Self::GmRequestRoll
                | Self::GmManageInventory
                | Self::StatsUpdate
                | Self::PrivateSceneUpdate
                | Self::PlayerKicked
                | Self::Announce
        )
    }

    /// Tags that write the durable session record.
    pub fn mutates_session_state(&self) -> bool {
        matches!(self, Self::GmUpdateScene | Self::GmSetGlobalScene)
    }

    pub fn is_player_action(&self) -> bool {
        matches!(
            self,
            Self::Move | Self::Attack | Self::Talk | Self::Inspect | Self::Custom
        )
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire envelope. Unknown top-level keys are preserved in `extra` so a
/// passthrough re-emits exactly what the producer sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_player_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventEnvelope {
    pub fn new(action: &ActionType) -> Self {
        Self {
            action_type: Some(action.as_str().to_string()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_actor(mut self, actor_id: Option<&PlayerId>, actor_name: impl Into<String>) -> Self {
        self.actor_id = actor_id.map(|id| id.to_string());
        self.actor_name = Some(actor_name.into());
        self
    }

    pub fn with_target(mut self, target: Option<&PlayerId>) -> Self {
        self.target_player_id = target.map(|id| id.to_string());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Raw dispatch tag: `actionType` wins over `type`; blank values count
    /// as absent.
    pub fn tag(&self) -> Option<&str> {
        non_blank(self.action_type.as_deref()).or_else(|| non_blank(self.type_tag.as_deref()))
    }

    /// Canonical dispatch tag. A missing tag is an unknown (empty) tag.
    pub fn action(&self) -> ActionType {
        ActionType::parse(self.tag().unwrap_or_default())
    }

    /// Copy a `type`-only tag into `actionType` so downstream consumers see
    /// one canonical key. `type` is kept for producers that still read it.
    pub fn normalize_tag(&mut self) {
        if non_blank(self.action_type.as_deref()).is_none() {
            if let Some(tag) = non_blank(self.type_tag.as_deref()) {
                self.action_type = Some(tag.to_string());
            }
        }
    }

    pub fn id(&self) -> Option<&str> {
        non_blank(self.id.as_deref())
    }

    pub fn actor(&self) -> Option<PlayerId> {
        non_blank(self.actor_id.as_deref()).map(PlayerId::new)
    }

    pub fn target(&self) -> Option<PlayerId> {
        non_blank(self.target_player_id.as_deref()).map(PlayerId::new)
    }

    /// Look up an action field: `payload.<key>` first, then top-level.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload
            .as_ref()
            .and_then(Value::as_object)
            .and_then(|p| p.get(key))
            .or_else(|| self.extra.get(key))
            .filter(|v| !v.is_null())
    }

    /// First present field among `keys`, as a non-blank string.
    pub fn text_field(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|k| self.field(k))
            .filter_map(Value::as_str)
            .find(|s| !s.trim().is_empty())
            .map(str::to_string)
    }

    /// Decode the action fields into `T`.
    ///
    /// Top-level extra fields are merged first and then overlaid with the
    /// `payload` object, so a key in `payload` wins.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, EnvelopeError> {
        let mut merged = self.extra.clone();
        if let Some(Value::Object(payload)) = &self.payload {
            for (k, v) in payload {
                merged.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(Value::Object(merged)).map_err(|e| EnvelopeError::InvalidPayload {
            action: self.action().to_string(),
            message: e.to_string(),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_type_and_type_are_synonyms() {
        let a: EventEnvelope = serde_json::from_value(json!({"actionType": "WHISPER"})).unwrap();
        let b: EventEnvelope = serde_json::from_value(json!({"type": "WHISPER"})).unwrap();

        assert_eq!(a.action(), ActionType::Whisper);
        assert_eq!(b.action(), ActionType::Whisper);
    }

    #[test]
    fn action_type_key_wins_over_type_key() {
        let env: EventEnvelope =
            serde_json::from_value(json!({"actionType": "ANNOUNCE", "type": "talk"})).unwrap();
        assert_eq!(env.action(), ActionType::Announce);
    }

    #[test]
    fn normalize_copies_legacy_tag() {
        let mut env: EventEnvelope = serde_json::from_value(json!({"type": "dice_roll"})).unwrap();
        env.normalize_tag();

        assert_eq!(env.action_type.as_deref(), Some("dice_roll"));
        assert_eq!(env.type_tag.as_deref(), Some("dice_roll"));
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let raw = json!({"type": "EMOTE", "emoji": "wave", "intensity": 3});
        let env: EventEnvelope = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(env.action(), ActionType::Unknown("EMOTE".to_string()));
        assert_eq!(serde_json::to_value(&env).unwrap(), raw);
    }

    #[test]
    fn payload_fields_take_precedence_over_top_level() {
        let env: EventEnvelope = serde_json::from_value(json!({
            "actionType": "dice_roll",
            "checkType": "top",
            "roll": 3,
            "payload": {"checkType": "STR Check"}
        }))
        .unwrap();

        assert_eq!(env.text_field(&["checkType"]).as_deref(), Some("STR Check"));
        assert_eq!(env.field("roll"), Some(&json!(3)));
    }

    #[test]
    fn blank_target_is_treated_as_public() {
        let env: EventEnvelope =
            serde_json::from_value(json!({"actionType": "talk", "targetPlayerId": ""})).unwrap();
        assert!(env.target().is_none());
    }

    #[test]
    fn missing_tag_parses_as_unknown() {
        let env = EventEnvelope::default();
        assert!(env.action().is_unknown());
    }
}
