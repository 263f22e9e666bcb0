use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::{FoodItem, ItemId, ShoppingItem, ShoppingItemId},
    protocol::ItemPage,
};

use crate::{
    coordinator::PageSource,
    mutation::{CompletionRemote, RemovalRemote},
    query::QueryDescriptor,
    ResourceClient, SyncResult,
};

/// Inventory view: paginated, filtered and sorted server-side.
#[derive(Clone)]
pub struct InventorySource {
    client: Arc<dyn ResourceClient>,
}

impl InventorySource {
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageSource<FoodItem> for InventorySource {
    async fn fetch_page(&self, query: &QueryDescriptor) -> SyncResult<ItemPage<FoodItem>> {
        self.client.list_items(query).await
    }
}

#[async_trait]
impl RemovalRemote<FoodItem> for InventorySource {
    async fn remove(&self, id: ItemId) -> SyncResult<()> {
        self.client.delete_item(id).await
    }
}

/// Shopping list view. The server returns the whole list at once, so it is
/// served as a single page and never has more to load.
#[derive(Clone)]
pub struct ShoppingListSource {
    client: Arc<dyn ResourceClient>,
}

impl ShoppingListSource {
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageSource<ShoppingItem> for ShoppingListSource {
    async fn fetch_page(&self, query: &QueryDescriptor) -> SyncResult<ItemPage<ShoppingItem>> {
        let needle = query.search_query().to_lowercase();
        let items: Vec<ShoppingItem> = self
            .client
            .list_shopping_items()
            .await?
            .into_iter()
            .filter(|item| needle.is_empty() || item.item_name.to_lowercase().contains(&needle))
            .collect();
        Ok(ItemPage {
            total: items.len() as u64,
            items,
        })
    }
}

#[async_trait]
impl RemovalRemote<ShoppingItem> for ShoppingListSource {
    async fn remove(&self, id: ShoppingItemId) -> SyncResult<()> {
        self.client.delete_shopping_item(id).await
    }
}

#[async_trait]
impl CompletionRemote<ShoppingItem> for ShoppingListSource {
    async fn set_completed(&self, updates: &[(ShoppingItemId, bool)]) -> SyncResult<()> {
        self.client.update_shopping_items(updates).await
    }

    async fn remove_many(&self, ids: &[ShoppingItemId]) -> SyncResult<()> {
        self.client.delete_shopping_items(ids).await
    }
}
