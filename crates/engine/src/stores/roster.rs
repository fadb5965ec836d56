//! Per-session roster of connected players.
//!
//! Runtime-only; fed by `JOIN_GAME` and `PLAYER_KICKED` events and by
//! websocket disconnects.

use dashmap::DashMap;

use tavern_domain::{CharacterRuntimeState, JoinCode, PlayerId, Roster, RosterEntry};

#[derive(Default)]
pub struct RosterStore {
    rosters: DashMap<JoinCode, Roster>,
}

impl RosterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a player. Returns false when the player was already listed.
    pub fn join(&self, join_code: &JoinCode, entry: RosterEntry) -> bool {
        self.rosters
            .entry(join_code.clone())
            .or_default()
            .join(entry)
    }

    pub fn remove(&self, join_code: &JoinCode, player_id: &PlayerId) -> Option<RosterEntry> {
        let removed = self
            .rosters
            .get_mut(join_code)
            .and_then(|mut roster| roster.remove(player_id));
        self.rosters.remove_if(join_code, |_, roster| roster.is_empty());
        removed
    }

    /// Mutate a listed player's character. Returns false when the player is
    /// not listed or has no character.
    pub fn update_character(
        &self,
        join_code: &JoinCode,
        player_id: &PlayerId,
        update: impl FnOnce(&mut CharacterRuntimeState) -> bool,
    ) -> bool {
        self.rosters
            .get_mut(join_code)
            .and_then(|mut roster| {
                roster
                    .get_mut(player_id)
                    .and_then(|entry| entry.character.as_mut().map(update))
            })
            .unwrap_or(false)
    }

    pub fn list(&self, join_code: &JoinCode) -> Vec<RosterEntry> {
        self.rosters
            .get(join_code)
            .map(|roster| roster.entries().to_vec())
            .unwrap_or_default()
    }

    pub fn contains(&self, join_code: &JoinCode, player_id: &PlayerId) -> bool {
        self.rosters
            .get(join_code)
            .is_some_and(|roster| roster.contains(player_id))
    }

    pub fn clear(&self, join_code: &JoinCode) {
        self.rosters.remove(join_code);
    }
}
