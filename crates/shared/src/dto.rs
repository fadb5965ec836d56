//! Data transfer objects for the REST surface and the persisted session row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tavern_domain::{
    Campaign, CampaignId, CharacterRuntimeState, CharacterSheet, DomainError, GameSystem,
    Inventory, JoinCode, NpcId, NpcRef, PlayerId, PreGenCharacter, RosterEntry, SceneId,
    SceneRef, SessionState, SessionStatus,
};

use crate::events::parse_npc_list;

/// Persisted shape of a session record.
///
/// `activeNpcs` is a JSON-encoded array at this boundary, not a native one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub join_code: String,
    #[serde(default)]
    pub campaign_id: Option<String>,
    pub current_scene_id: Option<String>,
    #[serde(default)]
    pub active_npcs: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_image_url: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

fn default_status() -> String {
    SessionStatus::Active.as_str().to_string()
}

impl SessionRecord {
    /// Decode `activeNpcs`; empty or invalid text is an empty list.
    pub fn npc_ids(&self) -> Vec<NpcId> {
        if self.active_npcs.trim().is_empty() {
            return Vec::new();
        }
        serde_json::from_str::<Value>(&self.active_npcs)
            .map(|value| parse_npc_list(&value))
            .unwrap_or_default()
    }

    pub fn encode_npcs(npcs: &[NpcId]) -> String {
        let ids: Vec<&str> = npcs.iter().map(NpcId::as_str).collect();
        serde_json::to_string(&ids).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn into_state(self) -> Result<SessionState, DomainError> {
        let active_npcs = self.npc_ids();
        let status = self.status.parse::<SessionStatus>().unwrap_or_default();
        Ok(SessionState::from_parts(
            JoinCode::new(&self.join_code)?,
            self.campaign_id.map(CampaignId::new),
            self.current_scene_id
                .filter(|s| !s.trim().is_empty())
                .map(SceneId::new),
            self.scene_image_url,
            active_npcs,
            status,
            self.updated_at,
        ))
    }
}

impl From<&SessionState> for SessionRecord {
    fn from(state: &SessionState) -> Self {
        Self {
            join_code: state.join_code().to_string(),
            campaign_id: state.campaign_id().map(ToString::to_string),
            current_scene_id: state.current_scene_id().map(ToString::to_string),
            active_npcs: Self::encode_npcs(state.active_npcs()),
            scene_image_url: state.scene_image_url().map(str::to_string),
            status: state.status().as_str().to_string(),
            updated_at: state.updated_at(),
        }
    }
}

/// A player's persisted character for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub player_id: PlayerId,
    pub name: String,
    #[serde(default)]
    pub sheet: Option<CharacterSheet>,
    #[serde(default)]
    pub inventory: Inventory,
}

impl PlayerRecord {
    /// Hydrate the runtime character. Players without a sheet have none yet.
    pub fn to_runtime(&self) -> Option<CharacterRuntimeState> {
        self.sheet.clone().map(|sheet| {
            CharacterRuntimeState::new(self.player_id.clone(), self.name.clone(), sheet)
                .with_inventory(self.inventory.clone())
        })
    }
}

/// Read-only campaign assets shipped with a bootstrap snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignAssets {
    #[serde(default)]
    pub system: GameSystem,
    #[serde(default)]
    pub scenes: Vec<SceneRef>,
    #[serde(default)]
    pub npcs: Vec<NpcRef>,
    #[serde(default)]
    pub pre_gens: Vec<PreGenCharacter>,
}

impl CampaignAssets {
    pub fn scene(&self, id: &SceneId) -> Option<&SceneRef> {
        self.scenes.iter().find(|s| &s.id == id)
    }
}

impl From<&Campaign> for CampaignAssets {
    fn from(campaign: &Campaign) -> Self {
        Self {
            system: campaign.system,
            scenes: campaign.scenes.clone(),
            npcs: campaign.npcs.clone(),
            pre_gens: campaign.pre_gens.clone(),
        }
    }
}

/// Everything a late joiner needs before trusting live events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapSnapshot {
    pub join_code: String,
    /// Every player with a stored record, connected or not.
    #[serde(default)]
    pub players: Vec<PlayerRecord>,
    /// Players currently at the table, in join order.
    #[serde(default)]
    pub roster: Vec<RosterEntry>,
    #[serde(default)]
    pub campaign: CampaignAssets,
    pub current_scene_id: Option<SceneId>,
    #[serde(default)]
    pub scene_image_url: Option<String>,
    #[serde(default)]
    pub active_npcs: Vec<NpcId>,
    #[serde(default)]
    pub status: SessionStatus,
}

impl BootstrapSnapshot {
    pub fn player(&self, player_id: &PlayerId) -> Option<&PlayerRecord> {
        self.players.iter().find(|p| &p.player_id == player_id)
    }
}

/// `POST /api/sessions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub campaign_id: String,
    #[serde(default)]
    pub join_code: Option<String>,
}

/// `PUT /api/sessions/{joinCode}/players/{playerId}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertPlayerRequest {
    pub name: String,
    #[serde(default)]
    pub sheet: Option<CharacterSheet>,
    #[serde(default)]
    pub inventory: Inventory,
}
