//! Connected-player roster.

use serde::{Deserialize, Serialize};

use crate::character::CharacterRuntimeState;
use crate::ids::PlayerId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub player_id: PlayerId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character: Option<CharacterRuntimeState>,
}

/// Ordered list of players currently in the session.
///
/// `JOIN_GAME` may be delivered more than once, so joins are idempotent by
/// player id: a second join for the same id is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the player is already on the roster.
    pub fn join(&mut self, entry: RosterEntry) -> bool {
        if self.contains(&entry.player_id) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn remove(&mut self, player_id: &PlayerId) -> Option<RosterEntry> {
        let index = self
            .entries
            .iter()
            .position(|e| &e.player_id == player_id)?;
        Some(self.entries.remove(index))
    }

    pub fn contains(&self, player_id: &PlayerId) -> bool {
        self.entries.iter().any(|e| &e.player_id == player_id)
    }

    pub fn get(&self, player_id: &PlayerId) -> Option<&RosterEntry> {
        self.entries.iter().find(|e| &e.player_id == player_id)
    }

    pub fn get_mut(&mut self, player_id: &PlayerId) -> Option<&mut RosterEntry> {
        self.entries.iter_mut().find(|e| &e.player_id == player_id)
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
