//! Typed view over an [`EventEnvelope`].
//!
//! [`classify`] turns the loosely-shaped wire envelope into a closed
//! [`SessionEvent`] plus the [`Visibility`] that receivers must apply. Both
//! the engine router and the player adapter dispatch on the result, so the
//! routing table lives in exactly one place.

use serde_json::Value;

use tavern_domain::{
    CharacterRuntimeState, CharacterSheet, Inventory, ItemDescriptor, ItemId, NpcId, PlayerId,
    PooledRoll, RollRequest, SceneId, SessionStatePatch, StandardRoll, StatsDelta, Visibility,
};

use crate::envelope::{ActionType, EnvelopeError, EventEnvelope};

/// Payload keys accepted for the scene id of a scene update.
const SCENE_KEYS: [&str; 3] = ["currentScene", "currentSceneId", "sceneId"];
/// Payload keys accepted for free text (whispers, announcements, actions).
const TEXT_KEYS: [&str; 3] = ["message", "text", "description"];

/// Scene and board change issued by the GM.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SceneChange {
    pub scene_id: Option<SceneId>,
    pub scene_image_url: Option<String>,
    /// `None` when the payload did not mention NPCs at all.
    pub active_npcs: Option<Vec<NpcId>>,
}

impl SceneChange {
    /// Merge patch for the durable session record.
    ///
    /// A new scene replaces the cached image too, even when the payload did
    /// not carry one. NPCs are only touched when the payload names them.
    pub fn to_patch(&self) -> SessionStatePatch {
        let mut patch = SessionStatePatch::new();
        if let Some(scene) = &self.scene_id {
            patch = patch
                .with_scene(Some(scene.clone()))
                .with_scene_image(self.scene_image_url.clone());
        } else if let Some(url) = &self.scene_image_url {
            patch = patch.with_scene_image(Some(url.clone()));
        }
        if let Some(npcs) = &self.active_npcs {
            patch = patch.with_active_npcs(npcs.clone());
        }
        patch
    }
}

/// Outcome of a check, in either of the two supported shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollOutcome {
    Standard(StandardRoll),
    Pooled(PooledRoll),
}

impl RollOutcome {
    pub fn total(&self) -> i32 {
        match self {
            Self::Standard(roll) => roll.resolved_total(),
            Self::Pooled(roll) => roll.total,
        }
    }

    pub fn check_type(&self) -> Option<&str> {
        match self {
            Self::Standard(roll) => Some(roll.check_type.as_str()),
            Self::Pooled(roll) => roll.check_type.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryChange {
    Add(ItemDescriptor),
    Remove(ItemId),
}

/// Closed set of session events after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SceneChanged(SceneChange),
    PrivateScene {
        target: PlayerId,
        scene_id: Option<SceneId>,
        scene_image_url: Option<String>,
    },
    Whisper {
        message: String,
    },
    RollRequested {
        request: RollRequest,
    },
    Rolled {
        outcome: RollOutcome,
        /// In-progress pooled roll; the final result follows.
        live: bool,
    },
    Inventory {
        target: PlayerId,
        change: InventoryChange,
    },
    Stats {
        target: PlayerId,
        delta: StatsDelta,
    },
    PlayerJoined {
        player_id: PlayerId,
        name: String,
        character: Option<CharacterRuntimeState>,
    },
    PlayerKicked {
        player_id: PlayerId,
    },
    PlayerAction {
        kind: String,
        text: Option<String>,
        is_private: bool,
    },
    Announcement {
        message: String,
    },
    /// Tag outside the table, or a known tag whose payload did not decode.
    Unrecognized,
}

/// Result of classifying one envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedEvent {
    pub action: ActionType,
    pub event: SessionEvent,
    pub visibility: Visibility,
}

impl ClassifiedEvent {
    /// Fallback-open classification: broadcast to everyone, touch nothing.
    pub fn passthrough(action: ActionType) -> Self {
        Self {
            action,
            event: SessionEvent::Unrecognized,
            visibility: Visibility::Public,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self.event, SessionEvent::Unrecognized)
    }
}

/// Classify an envelope.
///
/// Unknown tags classify as [`SessionEvent::Unrecognized`] with public
/// visibility. A known tag whose fields cannot be read returns an error;
/// callers route those with [`classify_or_passthrough`].
pub fn classify(envelope: &EventEnvelope) -> Result<ClassifiedEvent, EnvelopeError> {
    let action = envelope.action();
    let target = envelope.target();
    let targeted = |target: PlayerId| Visibility::Targeted {
        target,
        actor: envelope.actor(),
    };

    let (event, visibility) = match &action {
        ActionType::GmUpdateScene | ActionType::GmSetGlobalScene => {
            let change = SceneChange {
                scene_id: envelope.text_field(&SCENE_KEYS).map(SceneId::new),
                scene_image_url: envelope.text_field(&["sceneImageUrl", "imageUrl"]),
                active_npcs: envelope.field("activeNpcs").map(parse_npc_list),
            };
            if change.scene_id.is_none()
                && change.scene_image_url.is_none()
                && change.active_npcs.is_none()
            {
                return Err(EnvelopeError::MissingField("currentScene"));
            }
            (SessionEvent::SceneChanged(change), Visibility::Public)
        }
        ActionType::PrivateSceneUpdate => {
            let target = target.ok_or(EnvelopeError::MissingField("targetPlayerId"))?;
            let event = SessionEvent::PrivateScene {
                target: target.clone(),
                scene_id: envelope.text_field(&SCENE_KEYS).map(SceneId::new),
                scene_image_url: envelope.text_field(&["sceneImageUrl", "imageUrl"]),
            };
            (event, targeted(target))
        }
        ActionType::Whisper => {
            let message = envelope
                .text_field(&TEXT_KEYS)
                .ok_or(EnvelopeError::MissingField("message"))?;
            // A whisper without a target is addressed to the GM. The sender
            // sees their own line either way.
            let visibility = match (target, envelope.actor()) {
                (Some(target), _) => targeted(target),
                (None, Some(actor)) => Visibility::ActorOnly(actor),
                (None, None) => return Err(EnvelopeError::MissingField("targetPlayerId")),
            };
            (SessionEvent::Whisper { message }, visibility)
        }
        ActionType::GmRequestRoll => {
            let request: RollRequest = envelope.decode()?;
            let visibility = target.map_or(Visibility::Public, targeted);
            (SessionEvent::RollRequested { request }, visibility)
        }
        ActionType::DiceRoll | ActionType::RnrRoll | ActionType::RnrLiveUpdate => {
            let mut outcome = if envelope.field("details").is_some() {
                RollOutcome::Pooled(envelope.decode()?)
            } else {
                RollOutcome::Standard(envelope.decode()?)
            };
            fill_actor_name(&mut outcome, envelope.actor_name.as_deref());
            let live = action == ActionType::RnrLiveUpdate;
            (SessionEvent::Rolled { outcome, live }, Visibility::Public)
        }
        ActionType::GmManageInventory => {
            let target = target.ok_or(EnvelopeError::MissingField("targetPlayerId"))?;
            let change = inventory_change(envelope)?;
            let event = SessionEvent::Inventory {
                target: target.clone(),
                change,
            };
            (event, targeted(target))
        }
        ActionType::StatsUpdate => {
            let target = target.ok_or(EnvelopeError::MissingField("targetPlayerId"))?;
            let delta = stats_delta(envelope)?;
            let event = SessionEvent::Stats {
                target: target.clone(),
                delta,
            };
            (event, targeted(target))
        }
        ActionType::JoinGame => (player_joined(envelope)?, Visibility::Public),
        ActionType::PlayerKicked => {
            let player_id = target
                .or_else(|| envelope.text_field(&["playerId"]).map(PlayerId::new))
                .ok_or(EnvelopeError::MissingField("targetPlayerId"))?;
            (SessionEvent::PlayerKicked { player_id }, Visibility::Public)
        }
        ActionType::Move
        | ActionType::Attack
        | ActionType::Talk
        | ActionType::Inspect
        | ActionType::Custom => {
            let is_private = envelope
                .field("isPrivate")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let visibility = if is_private {
                envelope
                    .actor()
                    .map_or(Visibility::GmOnly, Visibility::ActorOnly)
            } else {
                Visibility::Public
            };
            let text = envelope
                .description
                .clone()
                .filter(|d| !d.trim().is_empty())
                .or_else(|| envelope.text_field(&TEXT_KEYS));
            let event = SessionEvent::PlayerAction {
                kind: action.as_str().to_string(),
                text,
                is_private,
            };
            (event, visibility)
        }
        ActionType::Announce => {
            let message = envelope
                .text_field(&TEXT_KEYS)
                .ok_or(EnvelopeError::MissingField("message"))?;
            (SessionEvent::Announcement { message }, Visibility::Public)
        }
        ActionType::Unknown(_) => return Ok(ClassifiedEvent::passthrough(action)),
    };

    Ok(ClassifiedEvent {
        action,
        event,
        visibility,
    })
}

/// Classify, treating an undecodable known tag like an unknown one.
///
/// Returns the classification and, when the payload was malformed, the
/// decode error for logging.
pub fn classify_or_passthrough(
    envelope: &EventEnvelope,
) -> (ClassifiedEvent, Option<EnvelopeError>) {
    match classify(envelope) {
        Ok(classified) => (classified, None),
        Err(err) => (ClassifiedEvent::passthrough(envelope.action()), Some(err)),
    }
}

/// Read an NPC list in any of the shapes producers send: an array of ids, an
/// array of `{id, ...}` objects, or a JSON-encoded string of either.
/// Anything unreadable is an empty list.
pub fn parse_npc_list(value: &Value) -> Vec<NpcId> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(id) => Some(id.as_str()),
                Value::Object(obj) => obj.get("id").and_then(Value::as_str),
                _ => None,
            })
            .filter(|id| !id.trim().is_empty())
            .map(NpcId::new)
            .collect(),
        Value::String(encoded) => serde_json::from_str::<Value>(encoded)
            .map(|decoded| match decoded {
                Value::Array(_) => parse_npc_list(&decoded),
                _ => Vec::new(),
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn fill_actor_name(outcome: &mut RollOutcome, actor_name: Option<&str>) {
    let Some(name) = actor_name.filter(|n| !n.trim().is_empty()) else {
        return;
    };
    let slot = match outcome {
        RollOutcome::Standard(roll) => &mut roll.actor_name,
        RollOutcome::Pooled(roll) => &mut roll.actor_name,
    };
    if slot.is_none() {
        *slot = Some(name.to_string());
    }
}

fn inventory_change(envelope: &EventEnvelope) -> Result<InventoryChange, EnvelopeError> {
    let op = envelope
        .text_field(&["action", "op", "operation"])
        .map(|op| op.to_ascii_lowercase());
    let item = envelope.field("item");

    match op.as_deref() {
        Some("add") | Some("give") | None => {
            let item = item.cloned().ok_or(EnvelopeError::MissingField("item"))?;
            let item: ItemDescriptor =
                serde_json::from_value(item).map_err(|e| EnvelopeError::InvalidPayload {
                    action: ActionType::GmManageInventory.to_string(),
                    message: e.to_string(),
                })?;
            Ok(InventoryChange::Add(item))
        }
        Some("remove") | Some("take") => envelope
            .text_field(&["itemId"])
            .or_else(|| {
                item.and_then(|i| i.get("id"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .map(|id| InventoryChange::Remove(ItemId::new(id)))
            .ok_or(EnvelopeError::MissingField("itemId")),
        Some(other) => Err(EnvelopeError::InvalidPayload {
            action: ActionType::GmManageInventory.to_string(),
            message: format!("unknown inventory operation: {other}"),
        }),
    }
}

fn stats_delta(envelope: &EventEnvelope) -> Result<StatsDelta, EnvelopeError> {
    let nested = envelope
        .field("delta")
        .or_else(|| envelope.field("stats"))
        .cloned();
    let delta: StatsDelta = match nested {
        Some(value) => serde_json::from_value(value).map_err(|e| EnvelopeError::InvalidPayload {
            action: ActionType::StatsUpdate.to_string(),
            message: e.to_string(),
        })?,
        None => envelope.decode()?,
    };
    if delta.is_empty() {
        return Err(EnvelopeError::MissingField("delta"));
    }
    Ok(delta)
}

fn player_joined(envelope: &EventEnvelope) -> Result<SessionEvent, EnvelopeError> {
    let player_id = envelope
        .actor()
        .or_else(|| envelope.text_field(&["playerId"]).map(PlayerId::new))
        .ok_or(EnvelopeError::MissingField("actorId"))?;
    let name = envelope
        .actor_name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .or_else(|| envelope.text_field(&["name", "playerName"]))
        .unwrap_or_else(|| player_id.to_string());

    let character = match envelope.field("character") {
        Some(value) => serde_json::from_value::<CharacterRuntimeState>(value.clone()).ok(),
        None => envelope
            .field("stats")
            .and_then(|v| serde_json::from_value::<CharacterSheet>(v.clone()).ok())
            .map(|sheet| {
                let inventory = envelope
                    .field("inventory")
                    .and_then(|v| serde_json::from_value::<Inventory>(v.clone()).ok())
                    .unwrap_or_default();
                CharacterRuntimeState::new(player_id.clone(), name.clone(), sheet)
                    .with_inventory(inventory)
            }),
    };

    Ok(SessionEvent::PlayerJoined {
        player_id,
        name,
        character,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tavern_domain::Identity;

    fn envelope(value: Value) -> EventEnvelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn scene_update_reads_scene_synonyms() {
        let classified = classify(&envelope(json!({
            "actionType": "GM_UPDATE_SCENE",
            "payload": {"currentScene": "scene-2", "sceneImageUrl": "x.jpg"}
        })))
        .unwrap();

        let SessionEvent::SceneChanged(change) = classified.event else {
            panic!("expected scene change");
        };
        assert_eq!(change.scene_id, Some(SceneId::new("scene-2")));
        assert_eq!(change.scene_image_url.as_deref(), Some("x.jpg"));
        assert_eq!(change.active_npcs, None);
        assert!(classified.visibility.is_public());
    }

    #[test]
    fn scene_patch_without_npcs_leaves_npcs_alone() {
        let change = SceneChange {
            scene_id: Some(SceneId::new("scene-2")),
            scene_image_url: None,
            active_npcs: None,
        };
        let patch = change.to_patch();

        assert_eq!(patch.current_scene_id, Some(Some(SceneId::new("scene-2"))));
        assert_eq!(patch.scene_image_url, Some(None));
        assert_eq!(patch.active_npcs, None);
    }

    #[test]
    fn whisper_is_targeted() {
        let classified = classify(&envelope(json!({
            "actionType": "WHISPER",
            "targetPlayerId": "p1",
            "payload": {"message": "you see a trap"}
        })))
        .unwrap();

        assert_eq!(
            classified.visibility,
            Visibility::Targeted {
                target: PlayerId::new("p1"),
                actor: None,
            }
        );
        assert_eq!(
            classified.event,
            SessionEvent::Whisper {
                message: "you see a trap".to_string()
            }
        );
    }

    #[test]
    fn player_whisper_to_gm_stays_visible_to_sender() {
        let classified = classify(&envelope(json!({
            "actionType": "WHISPER",
            "actorId": "p1",
            "targetPlayerId": "gm-1",
            "payload": {"message": "I palm the key"}
        })))
        .unwrap();

        assert!(classified
            .visibility
            .visible_to(&Identity::player("p1", "Ana")));
        assert!(!classified
            .visibility
            .visible_to(&Identity::player("p2", "Bo")));
    }

    #[test]
    fn whisper_without_target_goes_to_sender_and_gm() {
        let classified = classify(&envelope(json!({
            "type": "WHISPER", "actorId": "p2", "message": "psst"
        })))
        .unwrap();

        assert_eq!(
            classified.visibility,
            Visibility::ActorOnly(PlayerId::new("p2"))
        );
    }

    #[test]
    fn roll_request_without_target_is_public() {
        let classified = classify(&envelope(json!({
            "actionType": "GM_REQUEST_ROLL",
            "payload": {"checkType": "STR Check", "dc": 15}
        })))
        .unwrap();

        assert!(classified.visibility.is_public());
    }

    #[test]
    fn dice_roll_is_public_even_with_target() {
        let classified = classify(&envelope(json!({
            "actionType": "dice_roll",
            "actorName": "Ana",
            "targetPlayerId": "p1",
            "checkType": "STR Check", "dc": 15, "roll": 12, "mod": 3, "total": 15
        })))
        .unwrap();

        assert!(classified.visibility.is_public());
        let SessionEvent::Rolled { outcome, live } = classified.event else {
            panic!("expected roll");
        };
        assert!(!live);
        assert_eq!(outcome.total(), 15);
        let RollOutcome::Standard(roll) = outcome else {
            panic!("expected standard roll");
        };
        assert_eq!(roll.actor_name.as_deref(), Some("Ana"));
    }

    #[test]
    fn pooled_roll_reads_details() {
        let classified = classify(&envelope(json!({
            "actionType": "RNR_LIVE_UPDATE",
            "payload": {"total": 1, "details": [[{"value": 6, "success": true}]]}
        })))
        .unwrap();

        assert!(matches!(
            classified.event,
            SessionEvent::Rolled {
                outcome: RollOutcome::Pooled(_),
                live: true
            }
        ));
    }

    #[test]
    fn inventory_add_defaults_when_action_missing() {
        let classified = classify(&envelope(json!({
            "actionType": "GM_MANAGE_INVENTORY",
            "targetPlayerId": "p1",
            "payload": {"item": {"id": "sword-1", "name": "Sword", "type": "WEAPON"}}
        })))
        .unwrap();

        let SessionEvent::Inventory { target, change } = classified.event else {
            panic!("expected inventory change");
        };
        assert_eq!(target, PlayerId::new("p1"));
        assert!(matches!(change, InventoryChange::Add(item) if item.id == ItemId::new("sword-1")));
    }

    #[test]
    fn inventory_remove_reads_item_id() {
        let classified = classify(&envelope(json!({
            "actionType": "GM_MANAGE_INVENTORY",
            "targetPlayerId": "p1",
            "payload": {"action": "remove", "itemId": "sword-1"}
        })))
        .unwrap();

        assert!(matches!(
            classified.event,
            SessionEvent::Inventory { change: InventoryChange::Remove(id), .. } if id == ItemId::new("sword-1")
        ));
    }

    #[test]
    fn stats_update_requires_target() {
        let result = classify(&envelope(json!({
            "actionType": "STATS_UPDATE",
            "payload": {"hp": -3}
        })));

        assert_eq!(result, Err(EnvelopeError::MissingField("targetPlayerId")));
    }

    #[test]
    fn private_action_without_actor_is_gm_only() {
        let classified = classify(&envelope(json!({
            "actionType": "inspect",
            "payload": {"isPrivate": true, "text": "checks the altar"}
        })))
        .unwrap();

        assert_eq!(classified.visibility, Visibility::GmOnly);
    }

    #[test]
    fn join_game_builds_character_from_stats() {
        let classified = classify(&envelope(json!({
            "actionType": "JOIN_GAME",
            "actorId": "p1",
            "actorName": "Ana",
            "payload": {"stats": {"sheetType": "STANDARD", "hp": 10, "maxHp": 10}}
        })))
        .unwrap();

        let SessionEvent::PlayerJoined { player_id, character, .. } = classified.event else {
            panic!("expected join");
        };
        assert_eq!(player_id, PlayerId::new("p1"));
        assert_eq!(character.map(|c| c.name), Some("Ana".to_string()));
    }

    #[test]
    fn malformed_known_tag_falls_back_to_passthrough() {
        let (classified, error) = classify_or_passthrough(&envelope(json!({
            "actionType": "GM_REQUEST_ROLL",
            "payload": {"dc": "hard"}
        })));

        assert!(!classified.is_recognized());
        assert!(classified.visibility.is_public());
        assert!(error.is_some());
    }

    #[test]
    fn roll_request_with_blank_check_type_is_rejected() {
        let result = classify(&envelope(json!({
            "actionType": "GM_REQUEST_ROLL",
            "targetPlayerId": "p1",
            "payload": {"checkType": "", "dc": 12}
        })));

        assert!(result.is_err());
    }

    #[test]
    fn unknown_tag_is_public_passthrough() {
        let classified = classify(&envelope(json!({"type": "EMOTE"}))).unwrap();
        assert_eq!(classified.action, ActionType::Unknown("EMOTE".to_string()));
        assert!(classified.visibility.is_public());
    }

    #[test]
    fn npc_list_parses_every_shape() {
        assert_eq!(
            parse_npc_list(&json!(["npc-1", {"id": "npc-2", "name": "Bob"}])),
            vec![NpcId::new("npc-1"), NpcId::new("npc-2")]
        );
        assert_eq!(
            parse_npc_list(&json!("[\"npc-1\"]")),
            vec![NpcId::new("npc-1")]
        );
        assert!(parse_npc_list(&json!("")).is_empty());
        assert!(parse_npc_list(&json!("not json")).is_empty());
        assert!(parse_npc_list(&json!(42)).is_empty());
    }
}
