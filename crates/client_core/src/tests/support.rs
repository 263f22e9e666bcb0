use std::{
    collections::{HashSet, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::NaiveDate;
use shared::{
    domain::{
        CategoryId, Entity, EntityFields, EntityKind, FoodItem, ItemId, LocationId,
        NewShoppingItem, Resource, ShoppingItem, ShoppingItemId,
    },
    protocol::ItemPage,
};
use tokio::sync::{oneshot, Mutex};

use crate::{
    coordinator::PageSource,
    mutation::{CompletionRemote, RemovalRemote},
    query::QueryDescriptor,
    ResourceClient, SyncError, SyncResult,
};

pub(crate) fn food(id: i64) -> FoodItem {
    FoodItem {
        id: ItemId(id),
        name: format!("food-{id}"),
        quantity: 1.0,
        unit: "pcs".into(),
        category_id: Some(CategoryId(id % 3 + 1)),
        category_name: None,
        location_id: Some(LocationId(id % 2 + 1)),
        location_name: None,
        expiry_date: NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date"),
        production_date: None,
    }
}

pub(crate) fn foods(ids: impl IntoIterator<Item = i64>) -> Vec<FoodItem> {
    ids.into_iter().map(food).collect()
}

pub(crate) fn shopping(id: i64, checked: bool) -> ShoppingItem {
    ShoppingItem {
        id: ShoppingItemId(id),
        item_name: format!("item-{id}"),
        is_checked: checked,
        created_from_food_id: None,
    }
}

pub(crate) fn entity(id: i64) -> Entity {
    Entity {
        id,
        name: format!("entity-{id}"),
        description: None,
        is_system: false,
    }
}

/// In-memory stand-in for the server; pages and filters like the real one.
#[derive(Default)]
pub(crate) struct FakeClient {
    pub foods: Vec<FoodItem>,
    pub entities: Vec<Entity>,
    pub shopping: Mutex<Vec<ShoppingItem>>,
    pub failing_parents: HashSet<i64>,
    pub fail_lists: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub list_calls: Mutex<Vec<QueryDescriptor>>,
    pub deleted_items: Mutex<Vec<ItemId>>,
}

impl FakeClient {
    pub(crate) fn with_foods(count: i64) -> Self {
        Self {
            foods: foods(1..=count),
            ..Self::default()
        }
    }

    pub(crate) async fn list_call_count(&self) -> usize {
        self.list_calls.lock().await.len()
    }
}

#[async_trait]
impl ResourceClient for FakeClient {
    async fn list_items(&self, query: &QueryDescriptor) -> SyncResult<ItemPage<FoodItem>> {
        self.list_calls.lock().await.push(query.clone());
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(SyncError::Network("connection refused".into()));
        }
        let parent = query
            .category_filter()
            .map(|id| id.0)
            .or(query.location_filter().map(|id| id.0));
        if let Some(parent) = parent {
            if self.failing_parents.contains(&parent) {
                return Err(SyncError::Unknown(format!("boom for parent {parent}")));
            }
        }

        let matching: Vec<FoodItem> = self
            .foods
            .iter()
            .filter(|item| {
                query
                    .category_filter()
                    .map_or(true, |id| item.category_id == Some(id))
            })
            .filter(|item| {
                query
                    .location_filter()
                    .map_or(true, |id| item.location_id == Some(id))
            })
            .filter(|item| item.name.contains(query.search_query()))
            .cloned()
            .collect();
        let size = query.page_size() as usize;
        let start = (query.page() as usize - 1) * size;
        Ok(ItemPage {
            total: matching.len() as u64,
            items: matching.into_iter().skip(start).take(size).collect(),
        })
    }

    async fn delete_item(&self, id: ItemId) -> SyncResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(SyncError::Network("connection reset".into()));
        }
        self.deleted_items.lock().await.push(id);
        Ok(())
    }

    async fn list_entities(&self, _kind: EntityKind) -> SyncResult<Vec<Entity>> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(SyncError::Network("connection refused".into()));
        }
        Ok(self.entities.clone())
    }

    async fn create_entity(&self, _kind: EntityKind, fields: &EntityFields) -> SyncResult<Entity> {
        Ok(Entity {
            id: 99,
            name: fields.name.clone(),
            description: fields.description.clone(),
            is_system: false,
        })
    }

    async fn update_entity(
        &self,
        _kind: EntityKind,
        id: i64,
        fields: &EntityFields,
    ) -> SyncResult<Entity> {
        Ok(Entity {
            id,
            name: fields.name.clone(),
            description: fields.description.clone(),
            is_system: false,
        })
    }

    async fn delete_entity(&self, _kind: EntityKind, _id: i64) -> SyncResult<()> {
        Ok(())
    }

    async fn list_shopping_items(&self) -> SyncResult<Vec<ShoppingItem>> {
        Ok(self.shopping.lock().await.clone())
    }

    async fn add_shopping_item(&self, fields: &NewShoppingItem) -> SyncResult<ShoppingItem> {
        let mut shopping = self.shopping.lock().await;
        let item = ShoppingItem {
            id: ShoppingItemId(shopping.len() as i64 + 1),
            item_name: fields.item_name.clone(),
            is_checked: false,
            created_from_food_id: fields.created_from_food_id,
        };
        shopping.push(item.clone());
        Ok(item)
    }

    async fn update_shopping_items(&self, updates: &[(ShoppingItemId, bool)]) -> SyncResult<()> {
        let mut shopping = self.shopping.lock().await;
        for (id, checked) in updates {
            if let Some(item) = shopping.iter_mut().find(|item| item.id == *id) {
                item.is_checked = *checked;
            }
        }
        Ok(())
    }

    async fn delete_shopping_item(&self, id: ShoppingItemId) -> SyncResult<()> {
        self.shopping.lock().await.retain(|item| item.id != id);
        Ok(())
    }

    async fn delete_shopping_items(&self, ids: &[ShoppingItemId]) -> SyncResult<()> {
        self.shopping
            .lock()
            .await
            .retain(|item| !ids.contains(&item.id));
        Ok(())
    }
}

/// Holds every request until the test answers it.
pub(crate) struct Gate<Req, Resp> {
    pending: Mutex<VecDeque<(Req, oneshot::Sender<Resp>)>>,
    started: AtomicUsize,
}

impl<Req: Send, Resp: Send> Gate<Req, Resp> {
    pub(crate) fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            started: AtomicUsize::new(0),
        }
    }

    async fn call(&self, request: Req) -> Option<Resp> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.push_back((request, tx));
        self.started.fetch_add(1, Ordering::SeqCst);
        rx.await.ok()
    }

    pub(crate) fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Yields until `count` requests have been issued in total.
    pub(crate) async fn wait_started(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.started() < count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("requests were not issued in time");
    }

    pub(crate) async fn next(&self) -> (Req, oneshot::Sender<Resp>) {
        self.pending
            .lock()
            .await
            .pop_front()
            .expect("a pending request")
    }
}

pub(crate) struct GatedSource<T> {
    pub gate: Gate<QueryDescriptor, SyncResult<ItemPage<T>>>,
}

impl<T: Resource> GatedSource<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self { gate: Gate::new() })
    }
}

#[async_trait]
impl<T: Resource> PageSource<T> for GatedSource<T> {
    async fn fetch_page(&self, query: &QueryDescriptor) -> SyncResult<ItemPage<T>> {
        self.gate
            .call(query.clone())
            .await
            .unwrap_or_else(|| Err(SyncError::Network("gate closed".into())))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RemoteCall<Id> {
    SetCompleted(Vec<(Id, bool)>),
    Remove(Id),
    RemoveMany(Vec<Id>),
}

pub(crate) struct GatedRemote<T: Resource> {
    pub gate: Gate<RemoteCall<T::Id>, SyncResult<()>>,
}

impl<T: Resource> GatedRemote<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self { gate: Gate::new() })
    }

    async fn forward(&self, call: RemoteCall<T::Id>) -> SyncResult<()> {
        self.gate
            .call(call)
            .await
            .unwrap_or_else(|| Err(SyncError::Network("gate closed".into())))
    }
}

#[async_trait]
impl<T: Resource> RemovalRemote<T> for GatedRemote<T> {
    async fn remove(&self, id: T::Id) -> SyncResult<()> {
        self.forward(RemoteCall::Remove(id)).await
    }
}

#[async_trait]
impl<T: Resource> CompletionRemote<T> for GatedRemote<T> {
    async fn set_completed(&self, updates: &[(T::Id, bool)]) -> SyncResult<()> {
        self.forward(RemoteCall::SetCompleted(updates.to_vec()))
            .await
    }

    async fn remove_many(&self, ids: &[T::Id]) -> SyncResult<()> {
        self.forward(RemoteCall::RemoveMany(ids.to_vec())).await
    }
}

/// Answers immediately; fails every call while `failing` is set.
pub(crate) struct ScriptedRemote<T: Resource> {
    pub failing: AtomicBool,
    pub calls: Mutex<Vec<RemoteCall<T::Id>>>,
}

impl<T: Resource> ScriptedRemote<T> {
    pub(crate) fn ok() -> Arc<Self> {
        Arc::new(Self {
            failing: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn failing() -> Arc<Self> {
        let remote = Self::ok();
        remote.failing.store(true, Ordering::SeqCst);
        remote
    }

    pub(crate) async fn calls(&self) -> Vec<RemoteCall<T::Id>> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: RemoteCall<T::Id>) -> SyncResult<()> {
        self.calls.lock().await.push(call);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SyncError::Network("request timed out".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Resource> RemovalRemote<T> for ScriptedRemote<T> {
    async fn remove(&self, id: T::Id) -> SyncResult<()> {
        self.record(RemoteCall::Remove(id)).await
    }
}

#[async_trait]
impl<T: Resource> CompletionRemote<T> for ScriptedRemote<T> {
    async fn set_completed(&self, updates: &[(T::Id, bool)]) -> SyncResult<()> {
        self.record(RemoteCall::SetCompleted(updates.to_vec()))
            .await
    }

    async fn remove_many(&self, ids: &[T::Id]) -> SyncResult<()> {
        self.record(RemoteCall::RemoveMany(ids.to_vec())).await
    }
}
