//! Items handed out by the GM and the per-player inventory that holds them.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::ItemId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    Weapon,
    Consumable,
    Key,
    Armor,
    #[default]
    #[serde(other)]
    Misc,
}

/// Item created ad hoc by the GM. Immutable once given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDescriptor {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub item_type: ItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl ItemDescriptor {
    pub fn new(
        id: impl Into<ItemId>,
        name: impl Into<String>,
        item_type: ItemType,
    ) -> Result<Self, DomainError> {
        let id = id.into();
        let name = name.into();
        if id.as_str().trim().is_empty() {
            return Err(DomainError::validation("Item id cannot be empty"));
        }
        if name.trim().is_empty() {
            return Err(DomainError::validation("Item name cannot be empty"));
        }
        Ok(Self {
            id,
            name,
            description: String::new(),
            item_type,
            icon: None,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

/// Ordered item list with unique ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory {
    items: Vec<ItemDescriptor>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item. Giving an id that is already held is a no-op, so
    /// redelivered grants never duplicate an entry.
    pub fn add(&mut self, item: ItemDescriptor) -> bool {
        if self.contains(&item.id) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn remove(&mut self, id: &ItemId) -> Option<ItemDescriptor> {
        let index = self.items.iter().position(|i| &i.id == id)?;
        Some(self.items.remove(index))
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.items.iter().any(|i| &i.id == id)
    }

    pub fn items(&self) -> &[ItemDescriptor] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<ItemDescriptor> for Inventory {
    fn from_iter<T: IntoIterator<Item = ItemDescriptor>>(iter: T) -> Self {
        let mut inventory = Inventory::new();
        for item in iter {
            inventory.add(item);
        }
        inventory
    }
}
