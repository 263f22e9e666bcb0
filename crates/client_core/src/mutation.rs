use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use async_trait::async_trait;
use shared::domain::{Completable, Resource, ShoppingItem, ShoppingStats};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    error::{InvalidTransition, SyncError},
    gate::IdGate,
    pagination::{PaginationWindow, SharedWindow},
    SyncEvent, SyncResult,
};

#[async_trait]
pub trait RemovalRemote<T: Resource>: Send + Sync {
    async fn remove(&self, id: T::Id) -> SyncResult<()>;
}

#[async_trait]
pub trait CompletionRemote<T: Resource>: Send + Sync {
    /// One call for the whole set of updates.
    async fn set_completed(&self, updates: &[(T::Id, bool)]) -> SyncResult<()>;
    async fn remove_many(&self, ids: &[T::Id]) -> SyncResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Toggle,
    BatchUpdate,
    ToggleAll,
    Delete,
    ClearCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    Idle,
    Applying,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationEvent {
    Apply,
    RemoteSucceeded,
    RemoteFailed,
}

impl MutationPhase {
    pub fn transition(self, event: MutationEvent) -> Result<Self, InvalidTransition> {
        match (self, event) {
            (Self::Idle, MutationEvent::Apply) => Ok(Self::Applying),
            (Self::Applying, MutationEvent::RemoteSucceeded) => Ok(Self::Committed),
            (Self::Applying, MutationEvent::RemoteFailed) => Ok(Self::RolledBack),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

enum Undo<T: Resource> {
    Replaced {
        id: T::Id,
        previous: T,
        optimistic: T,
    },
    Removed {
        index: usize,
        /// Item that preceded the removed one; `None` if it was first.
        anchor: Option<T::Id>,
        item: T,
    },
}

struct MutationRecord<T: Resource> {
    kind: MutationKind,
    phase: MutationPhase,
    generation: u64,
    undo: Vec<Undo<T>>,
}

impl<T: Resource> MutationRecord<T> {
    fn new(kind: MutationKind) -> Self {
        Self {
            kind,
            phase: MutationPhase::Idle,
            generation: 0,
            undo: Vec::new(),
        }
    }

    fn advance(&mut self, event: MutationEvent) -> Result<(), InvalidTransition> {
        self.phase = self.phase.transition(event)?;
        Ok(())
    }

    fn applied(&mut self, generation: u64, undo: Vec<Undo<T>>) -> Result<(), InvalidTransition> {
        self.generation = generation;
        self.undo = undo;
        self.advance(MutationEvent::Apply)?;
        debug!(
            "mutation: applied kind={:?} targets={} generation={generation}",
            self.kind,
            self.undo.len()
        );
        Ok(())
    }

    fn targets(&self) -> usize {
        self.undo.len()
    }

    /// Puts back what this mutation changed without touching anything it did
    /// not change, so a page appended meanwhile survives the rollback.
    fn restore(self, window: &mut PaginationWindow<T>) {
        let same_generation = window.generation() == self.generation;
        let mut removed = Vec::new();
        for undo in self.undo {
            match undo {
                Undo::Replaced {
                    id,
                    previous,
                    optimistic,
                } => {
                    if let Some(index) = window.position(id) {
                        let items = window.items_mut();
                        if items[index] == optimistic {
                            items[index] = previous;
                        }
                    }
                }
                Undo::Removed {
                    index,
                    anchor,
                    item,
                } => removed.push((index, anchor, item)),
            }
        }

        if !same_generation {
            // The window was reloaded from the server; its contents win.
            return;
        }
        removed.sort_by_key(|(index, _, _)| *index);
        for (index, anchor, item) in removed {
            if window.position(item.resource_id()).is_some() {
                continue;
            }
            let at = match anchor {
                None => 0,
                Some(anchor) => window
                    .position(anchor)
                    .map(|position| position + 1)
                    .unwrap_or_else(|| index.min(window.len())),
            };
            window.items_mut().insert(at, item);
        }
    }
}

/// Applies local changes immediately and reconciles them with the server.
/// Mutations touching the same id run one after another.
pub struct MutationExecutor<T: Resource, R: ?Sized> {
    window: SharedWindow<T>,
    remote: Arc<R>,
    gate: IdGate<T::Id>,
    events: broadcast::Sender<SyncEvent>,
}

impl<T: Resource, R: ?Sized + Send + Sync> MutationExecutor<T, R> {
    pub fn new(window: SharedWindow<T>, remote: Arc<R>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self::with_events(window, remote, events)
    }

    /// Shares an event channel, typically the coordinator's.
    pub fn with_events(
        window: SharedWindow<T>,
        remote: Arc<R>,
        events: broadcast::Sender<SyncEvent>,
    ) -> Self {
        Self {
            window,
            remote,
            gate: IdGate::default(),
            events,
        }
    }

    pub fn window(&self) -> SharedWindow<T> {
        self.window.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    async fn settle(
        &self,
        mut record: MutationRecord<T>,
        result: SyncResult<()>,
    ) -> SyncResult<()> {
        match result {
            Ok(()) => {
                record.advance(MutationEvent::RemoteSucceeded)?;
                info!(
                    "mutation: committed kind={:?} targets={}",
                    record.kind,
                    record.targets()
                );
                let _ = self.events.send(SyncEvent::MutationCommitted {
                    kind: record.kind,
                    targets: record.targets(),
                });
                Ok(())
            }
            Err(err) => {
                record.advance(MutationEvent::RemoteFailed)?;
                let kind = record.kind;
                let targets = record.targets();
                record.restore(&mut *self.window.lock().await);
                warn!("mutation: rolled back kind={kind:?} targets={targets}: {err}");
                let _ = self.events.send(SyncEvent::MutationRolledBack {
                    kind,
                    targets,
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn gated_ids(&self) -> usize {
        self.gate.tracked()
    }
}

impl<T, R> MutationExecutor<T, R>
where
    T: Resource,
    R: RemovalRemote<T> + ?Sized,
{
    pub async fn delete_item(&self, id: T::Id) -> SyncResult<()> {
        let _pass = self.gate.acquire([id]).await;
        let mut record = MutationRecord::new(MutationKind::Delete);
        {
            let mut window = self.window.lock().await;
            let index = window.position(id).ok_or_else(|| missing(id))?;
            let anchor = index
                .checked_sub(1)
                .map(|before| window.items()[before].resource_id());
            let generation = window.generation();
            let item = window.items_mut().remove(index);
            record.applied(generation, vec![Undo::Removed { index, anchor, item }])?;
        }
        let result = self.remote.remove(id).await;
        self.settle(record, result).await
    }
}

impl<T, R> MutationExecutor<T, R>
where
    T: Completable,
    R: CompletionRemote<T> + ?Sized,
{
    pub async fn toggle_item(&self, id: T::Id, completed: bool) -> SyncResult<()> {
        self.apply_completion(MutationKind::Toggle, &[(id, completed)])
            .await
    }

    /// All updates land locally in one step or none do; a single remote call
    /// confirms them.
    pub async fn batch_update(&self, updates: &[(T::Id, bool)]) -> SyncResult<()> {
        self.apply_completion(MutationKind::BatchUpdate, updates)
            .await
    }

    /// Sets every item to `completed`. Returns how many items changed.
    pub async fn toggle_all(&self, completed: bool) -> SyncResult<usize> {
        let updates: Vec<(T::Id, bool)> = self
            .window
            .lock()
            .await
            .items()
            .iter()
            .filter(|item| item.is_completed() != completed)
            .map(|item| (item.resource_id(), completed))
            .collect();
        if updates.is_empty() {
            return Ok(0);
        }
        self.apply_completion(MutationKind::ToggleAll, &updates)
            .await?;
        Ok(updates.len())
    }

    /// Removes the items completed at call time. Returns how many were removed;
    /// zero means no request was sent.
    pub async fn clear_completed(&self) -> SyncResult<usize> {
        let candidates = self.completed_ids().await;
        if candidates.is_empty() {
            return Ok(0);
        }

        let _pass = self.gate.acquire(candidates.iter().copied()).await;
        let mut record = MutationRecord::new(MutationKind::ClearCompleted);
        let ids = {
            let mut window = self.window.lock().await;
            let generation = window.generation();
            let mut undo = Vec::new();
            let mut kept = Vec::with_capacity(window.len());
            let mut previous_id = None;
            for (index, item) in window.items_mut().drain(..).enumerate() {
                let id = item.resource_id();
                // An earlier in-flight toggle may have been rolled back while we
                // waited, so the predicate is checked again under the gate.
                if candidates.contains(&id) && item.is_completed() {
                    undo.push(Undo::Removed {
                        index,
                        anchor: previous_id,
                        item,
                    });
                } else {
                    kept.push(item);
                }
                previous_id = Some(id);
            }
            *window.items_mut() = kept;
            if undo.is_empty() {
                return Ok(0);
            }
            let ids: Vec<T::Id> = undo
                .iter()
                .filter_map(|undo| match undo {
                    Undo::Removed { item, .. } => Some(item.resource_id()),
                    Undo::Replaced { .. } => None,
                })
                .collect();
            record.applied(generation, undo)?;
            ids
        };

        let result = self.remote.remove_many(&ids).await;
        self.settle(record, result).await?;
        Ok(ids.len())
    }

    async fn completed_ids(&self) -> BTreeSet<T::Id> {
        self.window
            .lock()
            .await
            .items()
            .iter()
            .filter(|item| item.is_completed())
            .map(|item| item.resource_id())
            .collect()
    }

    async fn apply_completion(
        &self,
        kind: MutationKind,
        updates: &[(T::Id, bool)],
    ) -> SyncResult<()> {
        // Later entries for the same id win.
        let updates: BTreeMap<T::Id, bool> = updates.iter().copied().collect();
        if updates.is_empty() {
            return Ok(());
        }

        let _pass = self.gate.acquire(updates.keys().copied()).await;
        let mut record = MutationRecord::new(kind);
        {
            let mut window = self.window.lock().await;
            let mut positions = Vec::with_capacity(updates.len());
            for (&id, &completed) in &updates {
                let index = window.position(id).ok_or_else(|| missing(id))?;
                positions.push((id, index, completed));
            }

            let generation = window.generation();
            let items = window.items_mut();
            let mut undo = Vec::with_capacity(positions.len());
            for (id, index, completed) in positions {
                let previous = items[index].clone();
                items[index].set_completed(completed);
                undo.push(Undo::Replaced {
                    id,
                    previous,
                    optimistic: items[index].clone(),
                });
            }
            record.applied(generation, undo)?;
        }

        let payload: Vec<(T::Id, bool)> = updates.into_iter().collect();
        let result = self.remote.set_completed(&payload).await;
        self.settle(record, result).await
    }
}

impl<R: ?Sized + Send + Sync> MutationExecutor<ShoppingItem, R> {
    /// Stats over the live list, optimistic changes included.
    pub async fn stats(&self) -> ShoppingStats {
        ShoppingStats::from_items(self.window.lock().await.items())
    }
}

fn missing<Id: std::fmt::Debug>(id: Id) -> SyncError {
    SyncError::NotFound(format!("item {id:?} is not in the current view"))
}

#[cfg(test)]
#[path = "tests/mutation_tests.rs"]
mod tests;
