use std::sync::Arc;

use async_trait::async_trait;
use shared::{domain::Resource, protocol::ItemPage};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    pagination::SharedWindow,
    query::{QueryChanges, QueryDescriptor},
    SyncEvent, SyncResult,
};

/// Where a coordinator gets its pages from.
#[async_trait]
pub trait PageSource<T: Resource>: Send + Sync {
    async fn fetch_page(&self, query: &QueryDescriptor) -> SyncResult<ItemPage<T>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchMode {
    Replace,
    Refresh,
    Append,
}

/// What happened to a fetch the coordinator issued (or declined to issue).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    /// Resolved after a newer descriptor or refresh took over.
    Discarded,
    Failed,
    /// No request was sent.
    Skipped,
}

/// Everything a list screen renders from.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState<T> {
    pub items: Vec<T>,
    pub descriptor: QueryDescriptor,
    pub current_page: u32,
    pub total_count: u64,
    pub has_more: bool,
    pub loading: bool,
    pub loading_more: bool,
    pub refreshing: bool,
    pub error: Option<String>,
}

struct FetchTicket {
    epoch: u64,
    query: QueryDescriptor,
    mode: FetchMode,
}

struct CoordinatorState {
    descriptor: QueryDescriptor,
    /// Supersession token: bumped by every descriptor change and refresh.
    epoch: u64,
    /// Epoch whose results the window currently holds.
    window_epoch: Option<u64>,
    loading: bool,
    loading_more: bool,
    refreshing: bool,
    error: Option<String>,
}

impl CoordinatorState {
    fn begin_replace(&mut self, mode: FetchMode) -> FetchTicket {
        // With nothing loaded yet, or a load still pending, a refresh has no
        // items to keep on screen and stays a load.
        let nothing_shown = self.loading || self.window_epoch.is_none();
        let mode = if mode == FetchMode::Refresh && nothing_shown {
            FetchMode::Replace
        } else {
            mode
        };
        self.epoch += 1;
        self.loading = mode == FetchMode::Replace;
        self.refreshing = mode == FetchMode::Refresh;
        self.loading_more = false;
        self.error = None;
        FetchTicket {
            epoch: self.epoch,
            query: self.descriptor.first_page(),
            mode,
        }
    }

    fn is_current(&self, ticket: &FetchTicket) -> bool {
        self.epoch == ticket.epoch && self.descriptor.same_query(&ticket.query)
    }

    fn finish(&mut self, mode: FetchMode) {
        match mode {
            FetchMode::Replace => self.loading = false,
            FetchMode::Refresh => self.refreshing = false,
            FetchMode::Append => self.loading_more = false,
        }
    }
}

/// Keeps a view's [`SharedWindow`] consistent with its current descriptor.
pub struct QueryCoordinator<T: Resource> {
    source: Arc<dyn PageSource<T>>,
    window: SharedWindow<T>,
    state: Mutex<CoordinatorState>,
    events: broadcast::Sender<SyncEvent>,
}

impl<T: Resource> QueryCoordinator<T> {
    pub fn new(source: Arc<dyn PageSource<T>>, descriptor: QueryDescriptor) -> Self {
        Self::with_window(source, descriptor, SharedWindow::new())
    }

    pub fn with_window(
        source: Arc<dyn PageSource<T>>,
        descriptor: QueryDescriptor,
        window: SharedWindow<T>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            source,
            window,
            state: Mutex::new(CoordinatorState {
                descriptor: descriptor.first_page(),
                epoch: 0,
                window_epoch: None,
                loading: false,
                loading_more: false,
                refreshing: false,
                error: None,
            }),
            events,
        }
    }

    /// Handle to the collection this coordinator fills; hand it to a
    /// [`crate::MutationExecutor`] so both work on the same items.
    pub fn window(&self) -> SharedWindow<T> {
        self.window.clone()
    }

    pub fn event_sender(&self) -> broadcast::Sender<SyncEvent> {
        self.events.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub async fn descriptor(&self) -> QueryDescriptor {
        self.state.lock().await.descriptor.clone()
    }

    pub async fn view(&self) -> ViewState<T> {
        let state = self.state.lock().await;
        let window = self.window.lock().await;
        ViewState {
            items: window.items().to_vec(),
            descriptor: state.descriptor.clone(),
            current_page: window.current_page(),
            total_count: window.total_count(),
            has_more: window.has_more(),
            loading: state.loading,
            loading_more: state.loading_more,
            refreshing: state.refreshing,
            error: state.error.clone(),
        }
    }

    /// Initial load of page 1 for the current descriptor.
    pub async fn load(&self) -> FetchOutcome {
        let ticket = self.state.lock().await.begin_replace(FetchMode::Replace);
        self.execute(ticket).await
    }

    /// Merges `changes` into the descriptor. Any effective change moves back
    /// to page 1 and replaces the window once the new page arrives.
    pub async fn set_descriptor_field(&self, changes: QueryChanges) -> FetchOutcome {
        let ticket = {
            let mut state = self.state.lock().await;
            let Some(next) = state.descriptor.apply(&changes) else {
                debug!("query: descriptor unchanged, no refetch");
                return FetchOutcome::Skipped;
            };
            state.descriptor = next;
            state.begin_replace(FetchMode::Replace)
        };
        self.execute(ticket).await
    }

    /// Fetches the page after the last one received and appends it.
    pub async fn load_more(&self) -> FetchOutcome {
        let ticket = {
            let mut state = self.state.lock().await;
            if state.loading || state.refreshing || state.loading_more {
                debug!("query: load_more rejected, fetch in flight");
                return FetchOutcome::Skipped;
            }
            let window = self.window.lock().await;
            if !window.has_more() || state.window_epoch != Some(state.epoch) {
                debug!("query: load_more rejected, nothing more for current descriptor");
                return FetchOutcome::Skipped;
            }
            let page = window.current_page() + 1;
            drop(window);
            state.loading_more = true;
            state.error = None;
            FetchTicket {
                epoch: state.epoch,
                query: state.descriptor.at_page(page),
                mode: FetchMode::Append,
            }
        };
        self.execute(ticket).await
    }

    /// Re-fetches page 1 of the current descriptor. Displayed items stay in
    /// place until the response lands.
    pub async fn refresh(&self) -> FetchOutcome {
        let ticket = self.state.lock().await.begin_replace(FetchMode::Refresh);
        self.execute(ticket).await
    }

    async fn execute(&self, ticket: FetchTicket) -> FetchOutcome {
        info!(
            "query: fetch epoch={} page={} mode={:?}",
            ticket.epoch,
            ticket.query.page(),
            ticket.mode
        );
        let result = self.source.fetch_page(&ticket.query).await;

        let mut state = self.state.lock().await;
        if !state.is_current(&ticket) {
            info!(
                "query: discarding stale response epoch={} latest={}",
                ticket.epoch, state.epoch
            );
            let _ = self.events.send(SyncEvent::FetchDiscarded {
                epoch: ticket.epoch,
            });
            return FetchOutcome::Discarded;
        }
        state.finish(ticket.mode);

        let page = match result {
            Ok(page) => page,
            Err(err) => {
                warn!("query: fetch epoch={} failed: {err}", ticket.epoch);
                let message = err.to_string();
                state.error = Some(message.clone());
                let _ = self.events.send(SyncEvent::FetchFailed { message });
                return FetchOutcome::Failed;
            }
        };

        let page_number = ticket.query.page();
        let page_size = ticket.query.page_size();
        let mut window = self.window.lock().await;
        let event = match ticket.mode {
            FetchMode::Replace | FetchMode::Refresh => {
                window.replace(page_number, page.items, page.total, page_size);
                SyncEvent::WindowReplaced {
                    epoch: ticket.epoch,
                    len: window.len(),
                    total: window.total_count(),
                }
            }
            FetchMode::Append => {
                window.append(page_number, page.items, page.total, page_size);
                SyncEvent::PageAppended {
                    epoch: ticket.epoch,
                    page: page_number,
                    len: window.len(),
                }
            }
        };
        state.window_epoch = Some(ticket.epoch);
        state.descriptor = ticket.query;
        state.error = None;
        drop(window);
        drop(state);

        debug!("query: applied {event:?}");
        let _ = self.events.send(event);
        FetchOutcome::Applied
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
