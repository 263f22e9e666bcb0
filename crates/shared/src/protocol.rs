use serde::{Deserialize, Serialize};

use crate::domain::{FoodItem, ShoppingItem, ShoppingItemId};

/// Every API response is wrapped in this envelope; `code == 0` means success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    pub body: Option<T>,
    #[serde(default)]
    pub message: String,
}

impl<T> Envelope<T> {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// One page of a filtered list, as reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPage<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodListBody {
    pub items: Vec<FoodItem>,
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub per_page: u32,
    #[serde(default)]
    pub pages: u32,
    #[serde(default)]
    pub has_prev: bool,
    #[serde(default)]
    pub has_next: bool,
}

impl From<FoodListBody> for ItemPage<FoodItem> {
    fn from(value: FoodListBody) -> Self {
        Self {
            items: value.items,
            total: value.total,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShoppingListBody {
    pub items: Vec<ShoppingItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<ShoppingStatsBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShoppingStatsBody {
    pub total: usize,
    pub checked: usize,
    pub unchecked: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckedUpdate {
    pub id: ShoppingItemId,
    pub is_checked: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShoppingBatchRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updates: Vec<CheckedUpdate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deletions: Vec<ShoppingItemId>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ShoppingBatchResult {
    #[serde(default)]
    pub updated_count: usize,
    #[serde(default)]
    pub deleted_count: usize,
}
