//! Per-player character state held during a live session.

use serde::{Deserialize, Serialize};

use crate::character_sheet::{CharacterSheet, StatsDelta};
use crate::ids::{ItemId, PlayerId};
use crate::inventory::{Inventory, ItemDescriptor};

/// A player's character as mirrored by session events.
///
/// Only the GM issues stat and inventory changes; the owning player holds the
/// authoritative copy for the duration of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterRuntimeState {
    pub player_id: PlayerId,
    pub name: String,
    pub sheet: CharacterSheet,
    #[serde(default)]
    pub inventory: Inventory,
}

impl CharacterRuntimeState {
    pub fn new(player_id: PlayerId, name: impl Into<String>, sheet: CharacterSheet) -> Self {
        Self {
            player_id,
            name: name.into(),
            sheet,
            inventory: Inventory::new(),
        }
    }

    pub fn with_inventory(mut self, inventory: Inventory) -> Self {
        self.inventory = inventory;
        self
    }

    pub fn apply_stats(&mut self, delta: &StatsDelta) -> bool {
        self.sheet.apply_delta(delta)
    }

    pub fn give_item(&mut self, item: ItemDescriptor) -> bool {
        self.inventory.add(item)
    }

    pub fn remove_item(&mut self, item_id: &ItemId) -> Option<ItemDescriptor> {
        self.inventory.remove(item_id)
    }
}
