//! Authoritative board state for one live session.
//!
//! `SessionState` is the single source of truth for "what does the board look
//! like right now". It is written only through [`SessionStatePatch`], a
//! merge-patch: fields absent from the patch are left untouched, so an event
//! that only changes the scene can never clobber `active_npcs`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::campaign::Campaign;
use crate::ids::{CampaignId, JoinCode, NpcId, SceneId};

/// Lifecycle of a session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Session is live; GM mutations are persisted.
    #[default]
    Active,
    /// Session has ended; the record is kept for reference only.
    Archived,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Archived => "ARCHIVED",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = crate::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "ARCHIVED" => Ok(Self::Archived),
            other => Err(crate::DomainError::parse(format!(
                "Unknown session status: {other}"
            ))),
        }
    }
}

/// Durable board state, one per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    join_code: JoinCode,
    campaign_id: Option<CampaignId>,
    current_scene_id: Option<SceneId>,
    scene_image_url: Option<String>,
    active_npcs: Vec<NpcId>,
    status: SessionStatus,
    updated_at: DateTime<Utc>,
}

impl SessionState {
    /// Empty board for a join code, not tied to any campaign.
    pub fn new(join_code: JoinCode, now: DateTime<Utc>) -> Self {
        Self {
            join_code,
            campaign_id: None,
            current_scene_id: None,
            scene_image_url: None,
            active_npcs: Vec::new(),
            status: SessionStatus::Active,
            updated_at: now,
        }
    }

    /// Start a session from a campaign template.
    ///
    /// The campaign's first scene becomes the default scene; no NPCs are on
    /// the board yet.
    pub fn start(join_code: JoinCode, campaign: &Campaign, now: DateTime<Utc>) -> Self {
        let first_scene = campaign.scenes.first();
        Self {
            join_code,
            campaign_id: Some(campaign.id.clone()),
            current_scene_id: first_scene.map(|s| s.id.clone()),
            scene_image_url: first_scene.and_then(|s| s.image_url.clone()),
            active_npcs: Vec::new(),
            status: SessionStatus::Active,
            updated_at: now,
        }
    }

    /// Rebuild a record from storage. Used by persistence adapters only.
    pub fn from_parts(
        join_code: JoinCode,
        campaign_id: Option<CampaignId>,
        current_scene_id: Option<SceneId>,
        scene_image_url: Option<String>,
        active_npcs: Vec<NpcId>,
        status: SessionStatus,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            join_code,
            campaign_id,
            current_scene_id,
            scene_image_url,
            active_npcs,
            status,
            updated_at,
        }
    }

    pub fn join_code(&self) -> &JoinCode {
        &self.join_code
    }

    pub fn campaign_id(&self) -> Option<&CampaignId> {
        self.campaign_id.as_ref()
    }

    pub fn current_scene_id(&self) -> Option<&SceneId> {
        self.current_scene_id.as_ref()
    }

    pub fn scene_image_url(&self) -> Option<&str> {
        self.scene_image_url.as_deref()
    }

    pub fn active_npcs(&self) -> &[NpcId] {
        &self.active_npcs
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_archived(&self) -> bool {
        self.status == SessionStatus::Archived
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Merge a patch into the record. Returns whether anything changed.
    pub fn apply(&mut self, patch: &SessionStatePatch, now: DateTime<Utc>) -> bool {
        let mut changed = false;

        if let Some(scene) = &patch.current_scene_id {
            if &self.current_scene_id != scene {
                self.current_scene_id = scene.clone();
                changed = true;
            }
        }
        if let Some(image) = &patch.scene_image_url {
            if &self.scene_image_url != image {
                self.scene_image_url = image.clone();
                changed = true;
            }
        }
        if let Some(npcs) = &patch.active_npcs {
            if &self.active_npcs != npcs {
                self.active_npcs = npcs.clone();
                changed = true;
            }
        }

        if changed {
            self.updated_at = now;
        }
        changed
    }

    /// End the session. Archiving twice is a no-op.
    pub fn archive(&mut self, now: DateTime<Utc>) {
        if self.status != SessionStatus::Archived {
            self.status = SessionStatus::Archived;
            self.updated_at = now;
        }
    }
}

/// Partial update of a [`SessionState`].
///
/// `None` means "leave as is". For the nullable fields, `Some(None)` clears
/// the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStatePatch {
    pub current_scene_id: Option<Option<SceneId>>,
    pub scene_image_url: Option<Option<String>>,
    pub active_npcs: Option<Vec<NpcId>>,
}

impl SessionStatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scene(mut self, scene_id: Option<SceneId>) -> Self {
        self.current_scene_id = Some(scene_id);
        self
    }

    pub fn with_scene_image(mut self, url: Option<String>) -> Self {
        self.scene_image_url = Some(url);
        self
    }

    pub fn with_active_npcs(mut self, npcs: Vec<NpcId>) -> Self {
        self.active_npcs = Some(npcs);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.current_scene_id.is_none()
            && self.scene_image_url.is_none()
            && self.active_npcs.is_none()
    }
}
