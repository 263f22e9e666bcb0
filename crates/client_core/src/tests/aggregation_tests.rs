use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::{
    test_support::{entity, FakeClient},
    MissingResourceClient, SyncError,
};
use async_trait::async_trait;
use shared::{
    domain::{EntityFields, FoodItem, ItemId, NewShoppingItem, ShoppingItem, ShoppingItemId},
    protocol::ItemPage,
};

fn pantry() -> FakeClient {
    FakeClient {
        entities: vec![entity(1), entity(2), entity(3)],
        ..FakeClient::with_foods(30)
    }
}

fn counts(result: &[EntityCount]) -> Vec<(i64, u64)> {
    result
        .iter()
        .map(|count| (count.entity.id, count.item_count))
        .collect()
}

#[tokio::test]
async fn failing_sub_query_counts_as_zero() {
    let client = FakeClient {
        failing_parents: [2].into_iter().collect(),
        ..pantry()
    };

    let result = aggregate_counts(
        &client,
        EntityKind::Category,
        vec![entity(1), entity(2), entity(3)],
        4,
    )
    .await;

    assert_eq!(counts(&result), vec![(1, 10), (2, 0), (3, 10)]);
}

#[tokio::test]
async fn count_queries_ask_for_a_single_row_per_parent() {
    let client = pantry();
    aggregate_counts(&client, EntityKind::Location, vec![entity(1), entity(2)], 2).await;

    let calls = client.list_calls.lock().await;
    assert_eq!(calls.len(), 2);
    for (call, parent) in calls.iter().zip([1, 2]) {
        assert_eq!(call.page_size(), 1);
        assert_eq!(call.location_filter(), Some(LocationId(parent)));
        assert_eq!(call.category_filter(), None);
    }
}

#[tokio::test]
async fn load_attaches_counts_in_parent_order() {
    let client = pantry();
    let result = load_entities_with_counts(&client, EntityKind::Location, 1)
        .await
        .expect("parents listed");
    assert_eq!(counts(&result), vec![(1, 15), (2, 15), (3, 0)]);
}

#[tokio::test]
async fn parent_listing_failure_is_returned() {
    let err = load_entities_with_counts(&MissingResourceClient, EntityKind::Category, 4)
        .await
        .expect_err("no client");
    assert!(matches!(err, SyncError::Network(_)));
}

#[tokio::test]
async fn empty_parent_list_sends_no_requests() {
    let client = FakeClient::default();
    let result = load_entities_with_counts(&client, EntityKind::Category, 4)
        .await
        .expect("parents listed");
    assert!(result.is_empty());
    assert_eq!(client.list_call_count().await, 0);
}

/// Counts how many list calls overlap.
#[derive(Default)]
struct ConcurrencyProbe {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl ResourceClient for ConcurrencyProbe {
    async fn list_items(&self, query: &QueryDescriptor) -> SyncResult<ItemPage<FoodItem>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let total = query.category_filter().map_or(0, |id| id.0 as u64);
        Ok(ItemPage {
            items: Vec::new(),
            total,
        })
    }

    async fn delete_item(&self, id: ItemId) -> SyncResult<()> {
        MissingResourceClient.delete_item(id).await
    }

    async fn list_entities(&self, kind: EntityKind) -> SyncResult<Vec<Entity>> {
        MissingResourceClient.list_entities(kind).await
    }

    async fn create_entity(&self, kind: EntityKind, fields: &EntityFields) -> SyncResult<Entity> {
        MissingResourceClient.create_entity(kind, fields).await
    }

    async fn update_entity(
        &self,
        kind: EntityKind,
        id: i64,
        fields: &EntityFields,
    ) -> SyncResult<Entity> {
        MissingResourceClient.update_entity(kind, id, fields).await
    }

    async fn delete_entity(&self, kind: EntityKind, id: i64) -> SyncResult<()> {
        MissingResourceClient.delete_entity(kind, id).await
    }

    async fn list_shopping_items(&self) -> SyncResult<Vec<ShoppingItem>> {
        MissingResourceClient.list_shopping_items().await
    }

    async fn add_shopping_item(&self, fields: &NewShoppingItem) -> SyncResult<ShoppingItem> {
        MissingResourceClient.add_shopping_item(fields).await
    }

    async fn update_shopping_items(&self, updates: &[(ShoppingItemId, bool)]) -> SyncResult<()> {
        MissingResourceClient.update_shopping_items(updates).await
    }

    async fn delete_shopping_item(&self, id: ShoppingItemId) -> SyncResult<()> {
        MissingResourceClient.delete_shopping_item(id).await
    }

    async fn delete_shopping_items(&self, ids: &[ShoppingItemId]) -> SyncResult<()> {
        MissingResourceClient.delete_shopping_items(ids).await
    }
}

#[tokio::test]
async fn in_flight_sub_queries_stay_within_width() {
    let probe = ConcurrencyProbe::default();
    let parents: Vec<Entity> = (1..=6).map(entity).collect();

    let result = aggregate_counts(&probe, EntityKind::Category, parents, 2).await;

    assert_eq!(probe.peak.load(Ordering::SeqCst), 2);
    assert_eq!(
        counts(&result),
        vec![(1, 1), (2, 2), (3, 3), (4, 4), (5, 5), (6, 6)]
    );
}
