//! Per-parent item counts derived from the paginated item endpoint.
//!
//! There is no count endpoint, so each parent costs one `limit = 1` list
//! query whose reported `total` is the count. That is N requests for N
//! parents, fine at household scale; a batched count endpoint should replace
//! it if parent lists ever grow. In-flight sub-queries are capped by `width`.

use futures::{stream, StreamExt};
use shared::domain::{CategoryId, Entity, EntityKind, LocationId};
use tracing::{info, warn};

use crate::{
    query::{QueryChanges, QueryDescriptor},
    ResourceClient, SyncResult,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityCount {
    pub entity: Entity,
    pub item_count: u64,
}

fn count_query(kind: EntityKind, parent_id: i64) -> QueryDescriptor {
    let base = QueryDescriptor::with_page_size(1);
    let changes = match kind {
        EntityKind::Category => QueryChanges::default().category(Some(CategoryId(parent_id))),
        EntityKind::Location => QueryChanges::default().location(Some(LocationId(parent_id))),
    };
    base.apply(&changes).unwrap_or(base)
}

/// Returns one count per parent, in input order. A failing sub-query counts
/// as 0 and never fails the batch; nothing is retried.
pub async fn aggregate_counts(
    client: &dyn ResourceClient,
    kind: EntityKind,
    parents: Vec<Entity>,
    width: usize,
) -> Vec<EntityCount> {
    stream::iter(parents)
        .map(|entity| async move {
            let query = count_query(kind, entity.id);
            let item_count = match client.list_items(&query).await {
                Ok(page) => page.total,
                Err(err) => {
                    warn!(
                        "aggregation: count failed kind={kind:?} id={} name={}: {err}",
                        entity.id, entity.name
                    );
                    0
                }
            };
            EntityCount { entity, item_count }
        })
        .buffered(width.max(1))
        .collect()
        .await
}

/// Lists the parents of `kind` and attaches a fresh count to each.
pub async fn load_entities_with_counts(
    client: &dyn ResourceClient,
    kind: EntityKind,
    width: usize,
) -> SyncResult<Vec<EntityCount>> {
    let parents = client.list_entities(kind).await?;
    info!(
        "aggregation: counting items for {} {}",
        parents.len(),
        kind.collection_path()
    );
    Ok(aggregate_counts(client, kind, parents, width).await)
}

#[cfg(test)]
#[path = "tests/aggregation_tests.rs"]
mod tests;
