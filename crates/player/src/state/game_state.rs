//! Local derived view of a live session.

use std::collections::{BTreeMap, VecDeque};

use tavern_domain::{
    CharacterRuntimeState, Identity, NpcId, PlayerId, RollRequest, Roster, RosterEntry, SceneId,
    SessionStatus, StatsDelta,
};
use tavern_shared::{BootstrapSnapshot, CampaignAssets, InventoryChange, PlayerRecord, SceneChange};

/// Number of log entries kept; older entries are dropped first.
pub const LOG_CAPACITY: usize = 200;

/// Scene shown to one player instead of the shared board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateScene {
    pub scene_id: Option<SceneId>,
    pub scene_image_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Action,
    Whisper,
    Roll,
    Announcement,
    Scene,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Id of the event that produced the entry.
    pub id: String,
    pub kind: LogKind,
    pub actor_name: Option<String>,
    pub text: String,
    pub private: bool,
}

/// What this client currently believes about the session.
///
/// Seeded from the bootstrap snapshot, then kept current by live events.
/// Players track only their own character; the GM tracks every character
/// it has seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameState {
    pub current_scene: Option<SceneId>,
    pub scene_image_url: Option<String>,
    pub active_npcs: Vec<NpcId>,
    pub private_scene: Option<PrivateScene>,
    pub roster: Roster,
    pub characters: BTreeMap<PlayerId, CharacterRuntimeState>,
    pub pending_roll: Option<RollRequest>,
    pub campaign: CampaignAssets,
    pub status: SessionStatus,
    log: VecDeque<LogEntry>,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the board with a bootstrap snapshot.
    ///
    /// A missing scene falls back to the campaign's first scene, a missing
    /// image to the campaign's image for the current scene. The roster is
    /// replaced by the snapshot's; the log, the private scene and any pending
    /// roll are kept.
    pub fn hydrate(&mut self, snapshot: &BootstrapSnapshot, viewer: &Identity) {
        self.campaign = snapshot.campaign.clone();
        self.status = snapshot.status;
        self.active_npcs = snapshot.active_npcs.clone();
        self.current_scene = snapshot
            .current_scene_id
            .clone()
            .or_else(|| self.campaign.scenes.first().map(|scene| scene.id.clone()));
        self.scene_image_url = snapshot.scene_image_url.clone().or_else(|| {
            self.current_scene
                .as_ref()
                .and_then(|id| self.campaign_image(id))
        });

        self.roster = Roster::new();
        for entry in &snapshot.roster {
            self.roster.join(entry.clone());
        }

        let tracked = |player_id: &PlayerId| viewer.is_gm() || player_id == &viewer.user_id;
        let stored = snapshot
            .players
            .iter()
            .filter(|player| tracked(&player.player_id))
            .filter_map(PlayerRecord::to_runtime);
        // A character announced at the table supersedes the stored sheet.
        let announced = snapshot
            .roster
            .iter()
            .filter(|entry| tracked(&entry.player_id))
            .filter_map(|entry| entry.character.clone());
        self.characters = stored
            .chain(announced)
            .map(|character| (character.player_id.clone(), character))
            .collect();
    }

    pub fn campaign_image(&self, scene_id: &SceneId) -> Option<String> {
        self.campaign
            .scene(scene_id)
            .and_then(|scene| scene.image_url.clone())
    }

    /// Merge a scene change. Fields the change leaves out keep their values.
    pub fn apply_scene(&mut self, change: &SceneChange, reset_private: bool) {
        if let Some(scene_id) = &change.scene_id {
            self.scene_image_url = change
                .scene_image_url
                .clone()
                .or_else(|| self.campaign_image(scene_id));
            self.current_scene = Some(scene_id.clone());
        } else if let Some(url) = &change.scene_image_url {
            self.scene_image_url = Some(url.clone());
        }
        if let Some(npcs) = &change.active_npcs {
            self.active_npcs = npcs.clone();
        }
        if reset_private {
            self.private_scene = None;
        }
    }

    pub fn set_private_scene(&mut self, scene_id: Option<SceneId>, scene_image_url: Option<String>) {
        let scene_image_url =
            scene_image_url.or_else(|| scene_id.as_ref().and_then(|id| self.campaign_image(id)));
        self.private_scene = Some(PrivateScene {
            scene_id,
            scene_image_url,
        });
    }

    /// Scene to render: the private override when there is one.
    pub fn visible_scene(&self) -> (Option<&SceneId>, Option<&str>) {
        match &self.private_scene {
            Some(private) => (
                private.scene_id.as_ref().or(self.current_scene.as_ref()),
                private.scene_image_url.as_deref(),
            ),
            None => (self.current_scene.as_ref(), self.scene_image_url.as_deref()),
        }
    }

    /// Add a player to the roster. Returns `false` for a repeated join.
    pub fn join(&mut self, entry: RosterEntry, track_character: bool) -> bool {
        if track_character {
            if let Some(character) = &entry.character {
                self.characters
                    .entry(entry.player_id.clone())
                    .or_insert_with(|| character.clone());
            }
        }
        self.roster.join(entry)
    }

    pub fn remove_player(&mut self, player_id: &PlayerId) -> bool {
        self.characters.remove(player_id);
        self.roster.remove(player_id).is_some()
    }

    pub fn character(&self, player_id: &PlayerId) -> Option<&CharacterRuntimeState> {
        self.characters.get(player_id)
    }

    /// Returns whether the inventory changed.
    pub fn apply_inventory(&mut self, target: &PlayerId, change: &InventoryChange) -> bool {
        let Some(character) = self.characters.get_mut(target) else {
            return false;
        };
        match change {
            InventoryChange::Add(item) => character.give_item(item.clone()),
            InventoryChange::Remove(item_id) => character.remove_item(item_id).is_some(),
        }
    }

    /// Returns whether any vital changed.
    pub fn apply_stats(&mut self, target: &PlayerId, delta: &StatsDelta) -> bool {
        self.characters
            .get_mut(target)
            .is_some_and(|character| character.apply_stats(delta))
    }

    /// Append a log entry unless one with the same id is already there.
    pub fn push_log(&mut self, entry: LogEntry) -> bool {
        if self.log.iter().any(|existing| existing.id == entry.id) {
            return false;
        }
        if self.log.len() == LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(entry);
        true
    }

    pub fn log(&self) -> impl Iterator<Item = &LogEntry> {
        self.log.iter()
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }
}
