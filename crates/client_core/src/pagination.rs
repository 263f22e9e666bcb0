use std::{collections::HashSet, sync::Arc};

use shared::domain::Resource;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Accumulated, ordered items of a paginated view plus its paging metadata.
///
/// `has_more` is derived only from the page that was just received and the
/// `total` the server reported with it.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationWindow<T> {
    items: Vec<T>,
    current_page: u32,
    total_count: u64,
    has_more: bool,
    generation: u64,
}

impl<T> Default for PaginationWindow<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            current_page: 0,
            total_count: 0,
            has_more: false,
            generation: 0,
        }
    }
}

impl<T: Resource> PaginationWindow<T> {
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Bumped on every wholesale replacement so that pending rollbacks can
    /// tell whether the items they captured are still the ones on screen.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn position(&self, id: T::Id) -> Option<usize> {
        self.items.iter().position(|item| item.resource_id() == id)
    }

    pub fn replace(&mut self, page: u32, items: Vec<T>, total: u64, page_size: u32) {
        let fetched = items.len();
        self.items = items;
        self.generation = self.generation.wrapping_add(1);
        self.finish_page(page, fetched, total, page_size);
    }

    pub fn append(&mut self, page: u32, items: Vec<T>, total: u64, page_size: u32) {
        let fetched = items.len();
        let known: HashSet<T::Id> = self.items.iter().map(|item| item.resource_id()).collect();
        for item in items {
            if known.contains(&item.resource_id()) {
                debug!(
                    "pagination: skipping duplicate id={:?} on page={page}",
                    item.resource_id()
                );
                continue;
            }
            self.items.push(item);
        }
        self.finish_page(page, fetched, total, page_size);
    }

    fn finish_page(&mut self, page: u32, fetched: usize, total: u64, page_size: u32) {
        self.current_page = page;
        self.total_count = total;
        self.has_more = fetched as u64 == u64::from(page_size) && (self.items.len() as u64) < total;
    }

    pub(crate) fn items_mut(&mut self) -> &mut Vec<T> {
        &mut self.items
    }
}

/// The single authoritative collection behind a view. The query coordinator
/// and the mutation executor hold clones of the same handle.
pub struct SharedWindow<T> {
    inner: Arc<Mutex<PaginationWindow<T>>>,
}

impl<T> Clone for SharedWindow<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for SharedWindow<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PaginationWindow::default())),
        }
    }
}

impl<T: Resource> SharedWindow<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> MutexGuard<'_, PaginationWindow<T>> {
        self.inner.lock().await
    }

    pub async fn snapshot(&self) -> PaginationWindow<T> {
        self.inner.lock().await.clone()
    }

    pub async fn items(&self) -> Vec<T> {
        self.inner.lock().await.items().to_vec()
    }

    pub fn same_collection(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
#[path = "tests/pagination_tests.rs"]
mod tests;
