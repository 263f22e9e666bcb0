use chrono::{Duration, NaiveDate};
use serde::{de, Deserialize, Deserializer, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);
    };
}

id_newtype!(ItemId);
id_newtype!(ShoppingItemId);
id_newtype!(CategoryId);
id_newtype!(LocationId);

/// Days ahead of today that still count as "expiring soon".
pub const EXPIRING_SOON_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Category,
    Location,
}

impl EntityKind {
    pub fn collection_path(self) -> &'static str {
        match self {
            Self::Category => "categories",
            Self::Location => "locations",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryStatus {
    Normal,
    ExpiringSoon,
    Expired,
}

impl ExpiryStatus {
    pub fn for_date(expiry_date: NaiveDate, today: NaiveDate) -> Self {
        if expiry_date < today {
            Self::Expired
        } else if expiry_date <= today + Duration::days(EXPIRING_SOON_DAYS) {
            Self::ExpiringSoon
        } else {
            Self::Normal
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::ExpiringSoon => "expiring_soon",
            Self::Expired => "expired",
        }
    }
}

/// A record that lives in a paginated view and is addressed by a stable id.
pub trait Resource: Clone + PartialEq + Send + Sync + 'static {
    type Id: Copy + Eq + Ord + std::hash::Hash + std::fmt::Debug + Send + Sync + 'static;

    fn resource_id(&self) -> Self::Id;
}

/// A resource carrying a boolean "done" flag that can be flipped optimistically.
pub trait Completable: Resource {
    fn is_completed(&self) -> bool;
    fn set_completed(&mut self, completed: bool);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    pub id: ItemId,
    pub name: String,
    /// Decimal columns arrive as strings such as `"2.00"`.
    #[serde(deserialize_with = "decimal_quantity")]
    pub quantity: f64,
    pub unit: String,
    pub category_id: Option<CategoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
    #[serde(default)]
    pub location_id: Option<LocationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    pub expiry_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_date: Option<NaiveDate>,
}

fn decimal_quantity<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Quantity {
        Number(f64),
        Text(String),
    }

    match Quantity::deserialize(deserializer)? {
        Quantity::Number(value) => Ok(value),
        Quantity::Text(raw) => raw
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid quantity '{raw}'"))),
    }
}

impl FoodItem {
    pub fn status(&self, today: NaiveDate) -> ExpiryStatus {
        ExpiryStatus::for_date(self.expiry_date, today)
    }
}

impl Resource for FoodItem {
    type Id = ItemId;

    fn resource_id(&self) -> ItemId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoppingItem {
    pub id: ShoppingItemId,
    pub item_name: String,
    pub is_checked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_from_food_id: Option<ItemId>,
}

impl Resource for ShoppingItem {
    type Id = ShoppingItemId;

    fn resource_id(&self) -> ShoppingItemId {
        self.id
    }
}

impl Completable for ShoppingItem {
    fn is_completed(&self) -> bool {
        self.is_checked
    }

    fn set_completed(&mut self, completed: bool) {
        self.is_checked = completed;
    }
}

/// Parent record (category or location) that inventory items are filed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_system: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFields {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewShoppingItem {
    pub item_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_from_food_id: Option<ItemId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShoppingStats {
    pub total: usize,
    pub checked: usize,
    pub unchecked: usize,
    pub completion_rate: f64,
}

impl ShoppingStats {
    pub fn from_items(items: &[ShoppingItem]) -> Self {
        let total = items.len();
        let checked = items.iter().filter(|item| item.is_checked).count();
        let completion_rate = if total == 0 {
            0.0
        } else {
            (checked as f64 / total as f64 * 1000.0).round() / 10.0
        };
        Self {
            total,
            checked,
            unchecked: total - checked,
            completion_rate,
        }
    }
}
