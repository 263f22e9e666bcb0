use std::{
    collections::{BTreeSet, HashMap},
    hash::Hash,
    sync::{Arc, Mutex as StdMutex, PoisonError},
};

use tokio::sync::{Mutex, OwnedMutexGuard};

type Slots<K> = StdMutex<HashMap<K, Arc<Mutex<()>>>>;

/// Per-id mutual exclusion. Holding a [`GatePass`] for an id means no other
/// mutation on that id is between its snapshot and its commit/rollback.
pub(crate) struct IdGate<K> {
    slots: Arc<Slots<K>>,
}

impl<K> Default for IdGate<K> {
    fn default() -> Self {
        Self {
            slots: Arc::new(StdMutex::new(HashMap::new())),
        }
    }
}

impl<K: Copy + Eq + Ord + Hash> IdGate<K> {
    /// Waits until every id in `ids` is free. Ids are taken in sorted order so
    /// overlapping multi-id passes cannot deadlock.
    pub(crate) async fn acquire(&self, ids: impl IntoIterator<Item = K>) -> GatePass<K> {
        let ids: BTreeSet<K> = ids.into_iter().collect();
        let mut guards = Vec::with_capacity(ids.len());
        for id in &ids {
            let slot = {
                let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
                Arc::clone(slots.entry(*id).or_default())
            };
            guards.push(slot.lock_owned().await);
        }
        GatePass {
            slots: Arc::clone(&self.slots),
            ids: ids.into_iter().collect(),
            guards,
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

pub(crate) struct GatePass<K: Eq + Hash> {
    slots: Arc<Slots<K>>,
    ids: Vec<K>,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash> Drop for GatePass<K> {
    fn drop(&mut self) {
        self.guards.clear();
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        for id in &self.ids {
            // Only the map still references an idle slot.
            if slots.get(id).is_some_and(|slot| Arc::strong_count(slot) == 1) {
                slots.remove(id);
            }
        }
    }
}
