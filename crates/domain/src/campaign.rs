//! Static campaign reference data.
//!
//! Scenes, NPCs and pre-generated characters are read-only lookup tables for
//! the live session. They are owned by the campaign store and never mutated
//! by the relay.

use serde::{Deserialize, Serialize};

use crate::character_sheet::CharacterSheet;
use crate::ids::{CampaignId, NpcId, SceneId};

/// Which character sheet shape a campaign uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameSystem {
    #[default]
    Standard,
    RoleAndRoll,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneRef {
    pub id: SceneId,
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcRef {
    pub id: NpcId,
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// A ready-to-play character offered to players without their own sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreGenCharacter {
    pub id: String,
    pub name: String,
    pub sheet: CharacterSheet,
}

/// Campaign template a session is started from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    #[serde(default)]
    pub system: GameSystem,
    #[serde(default)]
    pub scenes: Vec<SceneRef>,
    #[serde(default)]
    pub npcs: Vec<NpcRef>,
    #[serde(default)]
    pub pre_gens: Vec<PreGenCharacter>,
}

impl Campaign {
    pub fn scene(&self, id: &SceneId) -> Option<&SceneRef> {
        self.scenes.iter().find(|s| &s.id == id)
    }

    pub fn npc(&self, id: &NpcId) -> Option<&NpcRef> {
        self.npcs.iter().find(|n| &n.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn campaign_deserializes_with_missing_collections() {
        let campaign: Campaign =
            serde_json::from_str(r#"{"id":"c1","name":"One Shot"}"#).unwrap();

        assert_eq!(campaign.system, GameSystem::Standard);
        assert!(campaign.scenes.is_empty());
        assert!(campaign.npcs.is_empty());
        assert!(campaign.pre_gens.is_empty());
    }

    #[test]
    fn lookup_by_id() {
        let campaign: Campaign = serde_json::from_str(
            r#"{
                "id": "c1",
                "name": "Crypt",
                "system": "ROLE_AND_ROLL",
                "scenes": [{"id": "s1", "name": "Gate", "imageUrl": "gate.png"}],
                "npcs": [{"id": "n1", "name": "Warden"}]
            }"#,
        )
        .unwrap();

        assert_eq!(campaign.system, GameSystem::RoleAndRoll);
        assert_eq!(
            campaign.scene(&SceneId::new("s1")).and_then(|s| s.image_url.as_deref()),
            Some("gate.png")
        );
        assert_eq!(
            campaign.npc(&NpcId::new("n1")).map(|n| n.name.as_str()),
            Some("Warden")
        );
        assert!(campaign.npc(&NpcId::new("missing")).is_none());
    }
}
