use serde::{Deserialize, Serialize};

use super::Coins;

pub type ItemId = i64;

/// A catalog entry. The catalog is seeded by migrations and never mutated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub price: Coins,
}

/// One line of a user's inventory: how many of an item they bought.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    #[serde(rename = "type")]
    pub item_type: String,
    pub quantity: i64,
}
