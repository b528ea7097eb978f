use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    error::RequestError,
    protocol::{CollectionQuery, Filter, FilterValue, PageResult, SortDirection},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

pub mod columns;
pub mod mutation;
pub mod query;
pub mod rest;

pub use columns::{ColumnSpec, FilterKind, SelectOption};
pub use mutation::{EntityRecord, ListEntry, MutationCoordinator, MutationEvent, RecordKey};
pub use query::{PageSize, QueryState, QueryStateError};

pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 64;

/// One backend query for one list view. Implementations issue exactly one
/// request per call and never retry; retry policy belongs to the user.
#[async_trait]
pub trait CollectionFetcher<T>: Send + Sync {
    async fn fetch(&self, query: &CollectionQuery) -> Result<PageResult<T>, RequestError>;
}

pub struct MissingCollectionFetcher;

#[async_trait]
impl<T> CollectionFetcher<T> for MissingCollectionFetcher {
    async fn fetch(&self, _query: &CollectionQuery) -> Result<PageResult<T>, RequestError> {
        Err(RequestError::Transport(
            "collection fetcher is unavailable".to_string(),
        ))
    }
}

#[derive(Debug, Clone)]
pub enum ListViewEvent {
    PageLoaded { total_count: u64 },
    FetchFailed { message: String },
}

struct ListViewState<T> {
    query: QueryState,
    page: Option<PageResult<T>>,
    last_error: Option<RequestError>,
    last_dispatched: Option<CollectionQuery>,
    dispatch_seq: u64,
    inflight: Option<u64>,
    detached: bool,
}

/// Owns pagination, column filters, and sort order for one collection view
/// and turns them into backend queries.
///
/// Setters only record state. The owning view calls [`sync`] once per
/// settled batch of changes, so rapid edits coalesce into a single outbound
/// request instead of one per keystroke.
///
/// [`sync`]: ListViewController::sync
pub struct ListViewController<T> {
    fetcher: Arc<dyn CollectionFetcher<T>>,
    default_filters: Vec<Filter>,
    inner: Mutex<ListViewState<T>>,
    events: broadcast::Sender<ListViewEvent>,
}

impl<T: Clone + Send + Sync + 'static> ListViewController<T> {
    pub fn new(fetcher: Arc<dyn CollectionFetcher<T>>) -> Arc<Self> {
        Self::with_default_filters(fetcher, Vec::new())
    }

    /// `default_filters` scope every outbound query (e.g. "completed =
    /// false" for a pending-only view). They are not user-editable and win
    /// over a user filter with the same key.
    pub fn with_default_filters(
        fetcher: Arc<dyn CollectionFetcher<T>>,
        default_filters: Vec<Filter>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            fetcher,
            default_filters,
            inner: Mutex::new(ListViewState {
                query: QueryState::new(),
                page: None,
                last_error: None,
                last_dispatched: None,
                dispatch_seq: 0,
                inflight: None,
                detached: false,
            }),
            events,
        })
    }

    pub async fn set_filter(&self, key: impl Into<String>, value: Option<FilterValue>) {
        self.inner.lock().await.query.set_filter(key, value);
    }

    pub async fn set_sort(&self, column_id: impl Into<String>, direction: SortDirection) {
        self.inner.lock().await.query.set_sort(column_id, direction);
    }

    pub async fn clear_sort(&self) {
        self.inner.lock().await.query.clear_sort();
    }

    pub async fn set_page(&self, page_index: u32) {
        self.inner.lock().await.query.set_page(page_index);
    }

    pub async fn set_page_size(&self, page_size: PageSize) {
        self.inner.lock().await.query.set_page_size(page_size);
    }

    /// Unsets every filter key the column contributes (a date range owns
    /// two).
    pub async fn clear_column_filters(&self, column: &ColumnSpec) {
        let mut state = self.inner.lock().await;
        for key in column.filter_keys() {
            state.query.set_filter(key.to_string(), None);
        }
    }

    /// The normalized query the next dispatch would send.
    pub async fn current_query(&self) -> CollectionQuery {
        self.inner
            .lock()
            .await
            .query
            .normalized(&self.default_filters)
    }

    /// Last successfully loaded page. Kept through failed fetches so the
    /// view shows stale-but-valid rows instead of a blank table.
    pub async fn page(&self) -> Option<PageResult<T>> {
        self.inner.lock().await.page.clone()
    }

    pub async fn last_error(&self) -> Option<RequestError> {
        self.inner.lock().await.last_error.clone()
    }

    /// Called on view unmount: any still-pending fetch settles as a no-op.
    pub async fn detach(&self) {
        self.inner.lock().await.detached = true;
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ListViewEvent> {
        self.events.subscribe()
    }

    /// Dispatches a fetch for the current settled query state, unless the
    /// displayed page already answers it or an identical fetch is on the
    /// wire.
    pub async fn sync(&self) -> Result<(), RequestError> {
        self.dispatch(false).await
    }

    /// Re-issues the current query even when its result is already
    /// displayed (explicit refresh button, user-initiated retry after a
    /// failure). Still deduplicates against an identical in-flight fetch.
    pub async fn refresh(&self) -> Result<(), RequestError> {
        self.dispatch(true).await
    }

    async fn dispatch(&self, force: bool) -> Result<(), RequestError> {
        let (token, query) = {
            let mut state = self.inner.lock().await;
            if state.detached {
                return Ok(());
            }
            let query = state.query.normalized(&self.default_filters);
            let same_as_dispatched = state.last_dispatched.as_ref() == Some(&query);
            if same_as_dispatched && state.inflight.is_some() {
                // An identical fetch is already on the wire.
                return Ok(());
            }
            if same_as_dispatched && !force && state.last_error.is_none() {
                return Ok(());
            }
            state.dispatch_seq += 1;
            state.inflight = Some(state.dispatch_seq);
            state.last_dispatched = Some(query.clone());
            (state.dispatch_seq, query)
        };

        let result = self.fetcher.fetch(&query).await;

        let mut state = self.inner.lock().await;
        if state.detached {
            return Ok(());
        }
        if state.dispatch_seq != token {
            // A newer query was dispatched while this one was on the wire;
            // only the newest response is authoritative.
            debug!(token, "list view: discarding late fetch result");
            return Ok(());
        }
        state.inflight = None;
        match result {
            Ok(mut page) => {
                if page.items.len() as u64 > u64::from(query.page_size) {
                    warn!(
                        rows = page.items.len(),
                        page_size = query.page_size,
                        "list view: server returned more rows than the page size; truncating"
                    );
                    page.items.truncate(query.page_size as usize);
                }
                let total_count = page.total_count;
                state.page = Some(page);
                state.last_error = None;
                drop(state);
                let _ = self.events.send(ListViewEvent::PageLoaded { total_count });
                Ok(())
            }
            Err(err) => {
                // Keep the previous page; the view shows it with an error
                // indicator instead of clearing the table.
                state.last_error = Some(err.clone());
                drop(state);
                let _ = self.events.send(ListViewEvent::FetchFailed {
                    message: err.user_message().to_string(),
                });
                Err(err)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
