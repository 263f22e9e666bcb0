use async_trait::async_trait;
use shared::{
    domain::{
        Entity, EntityFields, EntityKind, FoodItem, ItemId, NewShoppingItem, ShoppingItem,
        ShoppingItemId,
    },
    protocol::ItemPage,
};

pub mod aggregation;
pub mod config;
pub mod coordinator;
pub mod error;
mod gate;
pub mod mutation;
pub mod pagination;
pub mod query;
pub mod remote;
pub mod sources;

pub use aggregation::{aggregate_counts, load_entities_with_counts, EntityCount};
pub use coordinator::{FetchOutcome, PageSource, QueryCoordinator, ViewState};
pub use error::SyncError;
pub use mutation::{
    CompletionRemote, MutationEvent, MutationExecutor, MutationKind, MutationPhase, RemovalRemote,
};
pub use pagination::{PaginationWindow, SharedWindow};
pub use query::{QueryChanges, QueryDescriptor, SortBy, SortOrder};
pub use remote::HttpResourceClient;
pub use sources::{InventorySource, ShoppingListSource};

pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Remote side of every list view. Implementations talk to the server; the
/// sync layer only ever sees this trait.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn list_items(&self, query: &QueryDescriptor) -> SyncResult<ItemPage<FoodItem>>;
    async fn delete_item(&self, id: ItemId) -> SyncResult<()>;

    async fn list_entities(&self, kind: EntityKind) -> SyncResult<Vec<Entity>>;
    async fn create_entity(&self, kind: EntityKind, fields: &EntityFields) -> SyncResult<Entity>;
    async fn update_entity(
        &self,
        kind: EntityKind,
        id: i64,
        fields: &EntityFields,
    ) -> SyncResult<Entity>;
    async fn delete_entity(&self, kind: EntityKind, id: i64) -> SyncResult<()>;

    async fn list_shopping_items(&self) -> SyncResult<Vec<ShoppingItem>>;
    async fn add_shopping_item(&self, fields: &NewShoppingItem) -> SyncResult<ShoppingItem>;
    async fn update_shopping_items(&self, updates: &[(ShoppingItemId, bool)]) -> SyncResult<()>;
    async fn delete_shopping_item(&self, id: ShoppingItemId) -> SyncResult<()>;
    async fn delete_shopping_items(&self, ids: &[ShoppingItemId]) -> SyncResult<()>;
}

pub struct MissingResourceClient;

fn unavailable() -> SyncError {
    SyncError::Network("resource client is unavailable".into())
}

#[async_trait]
impl ResourceClient for MissingResourceClient {
    async fn list_items(&self, _query: &QueryDescriptor) -> SyncResult<ItemPage<FoodItem>> {
        Err(unavailable())
    }

    async fn delete_item(&self, _id: ItemId) -> SyncResult<()> {
        Err(unavailable())
    }

    async fn list_entities(&self, _kind: EntityKind) -> SyncResult<Vec<Entity>> {
        Err(unavailable())
    }

    async fn create_entity(
        &self,
        _kind: EntityKind,
        _fields: &EntityFields,
    ) -> SyncResult<Entity> {
        Err(unavailable())
    }

    async fn update_entity(
        &self,
        _kind: EntityKind,
        _id: i64,
        _fields: &EntityFields,
    ) -> SyncResult<Entity> {
        Err(unavailable())
    }

    async fn delete_entity(&self, _kind: EntityKind, _id: i64) -> SyncResult<()> {
        Err(unavailable())
    }

    async fn list_shopping_items(&self) -> SyncResult<Vec<ShoppingItem>> {
        Err(unavailable())
    }

    async fn add_shopping_item(&self, _fields: &NewShoppingItem) -> SyncResult<ShoppingItem> {
        Err(unavailable())
    }

    async fn update_shopping_items(&self, _updates: &[(ShoppingItemId, bool)]) -> SyncResult<()> {
        Err(unavailable())
    }

    async fn delete_shopping_item(&self, _id: ShoppingItemId) -> SyncResult<()> {
        Err(unavailable())
    }

    async fn delete_shopping_items(&self, _ids: &[ShoppingItemId]) -> SyncResult<()> {
        Err(unavailable())
    }
}

/// Change notifications for a view, published on a broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    WindowReplaced {
        epoch: u64,
        len: usize,
        total: u64,
    },
    PageAppended {
        epoch: u64,
        page: u32,
        len: usize,
    },
    FetchDiscarded {
        epoch: u64,
    },
    FetchFailed {
        message: String,
    },
    MutationCommitted {
        kind: MutationKind,
        targets: usize,
    },
    MutationRolledBack {
        kind: MutationKind,
        targets: usize,
        message: String,
    },
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
