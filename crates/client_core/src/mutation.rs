use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use shared::{
    domain::{ClientSummary, ExpenseSummary, ProductSummary, SaleSummary, TaskSummary},
    error::RequestError,
};
use tokio::sync::{broadcast, Mutex, Notify};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::EVENT_CHANNEL_CAPACITY;

/// A row the coordinator can address by its server-assigned id.
pub trait EntityRecord: Clone + Send + Sync + 'static {
    fn entity_id(&self) -> i64;
}

impl EntityRecord for TaskSummary {
    fn entity_id(&self) -> i64 {
        self.id.0
    }
}

impl EntityRecord for ClientSummary {
    fn entity_id(&self) -> i64 {
        self.id.0
    }
}

impl EntityRecord for ProductSummary {
    fn entity_id(&self) -> i64 {
        self.id.0
    }
}

impl EntityRecord for SaleSummary {
    fn entity_id(&self) -> i64 {
        self.id.0
    }
}

impl EntityRecord for ExpenseSummary {
    fn entity_id(&self) -> i64 {
        self.id.0
    }
}

/// Identity of a visible row: either confirmed by the server, or a local
/// draft still waiting for the server to assign a real id. Pending ids never
/// reach the server and cannot collide with real ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Committed(i64),
    Pending(Uuid),
}

#[derive(Debug, Clone)]
pub enum ListEntry<T> {
    Committed(T),
    Pending { mutation_id: Uuid, draft: T },
}

impl<T: EntityRecord> ListEntry<T> {
    pub fn key(&self) -> RecordKey {
        match self {
            ListEntry::Committed(record) => RecordKey::Committed(record.entity_id()),
            ListEntry::Pending { mutation_id, .. } => RecordKey::Pending(*mutation_id),
        }
    }

    pub fn record(&self) -> &T {
        match self {
            ListEntry::Committed(record) => record,
            ListEntry::Pending { draft, .. } => draft,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ListEntry::Pending { .. })
    }
}

#[derive(Debug, Clone)]
pub enum MutationEvent {
    ListChanged,
    MutationFailed { message: String },
}

struct CoordinatorState<T> {
    entries: Vec<ListEntry<T>>,
    inflight: HashSet<RecordKey>,
    canceled_creates: HashSet<Uuid>,
    detached: bool,
}

/// Applies local-first mutations to one view's in-memory list and
/// reconciles them against the server's answer.
///
/// Every operation leaves the list in either the confirmed server state or
/// the exact pre-mutation state: rollback always completes before the error
/// is handed back to the caller. Mutations targeting the same record id are
/// serialized through a per-id in-flight marker; unrelated records proceed
/// concurrently.
pub struct MutationCoordinator<T> {
    inner: Mutex<CoordinatorState<T>>,
    settled: Notify,
    events: broadcast::Sender<MutationEvent>,
}

impl<T: EntityRecord> MutationCoordinator<T> {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            inner: Mutex::new(CoordinatorState {
                entries: Vec::new(),
                inflight: HashSet::new(),
                canceled_creates: HashSet::new(),
                detached: false,
            }),
            settled: Notify::new(),
            events,
        })
    }

    /// Loads a freshly fetched page, replacing whatever was displayed.
    pub async fn replace_all(&self, records: Vec<T>) {
        {
            let mut state = self.inner.lock().await;
            state.entries = records.into_iter().map(ListEntry::Committed).collect();
        }
        self.changed();
    }

    pub async fn entries(&self) -> Vec<ListEntry<T>> {
        self.inner.lock().await.entries.clone()
    }

    pub async fn records(&self) -> Vec<T> {
        self.inner
            .lock()
            .await
            .entries
            .iter()
            .map(|entry| entry.record().clone())
            .collect()
    }

    /// Called on view unmount: mutations settling afterwards stop touching
    /// the list, and queued same-id waiters are released.
    pub async fn detach(&self) {
        self.inner.lock().await.detached = true;
        self.settled.notify_waiters();
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<MutationEvent> {
        self.events.subscribe()
    }

    /// Shows `draft` immediately as a pending row, then awaits the create
    /// call. On success the pending row is swapped in place for the
    /// server's canonical record; on failure it is removed again before the
    /// error is returned. Returns `Ok(None)` when the create was canceled
    /// by a local delete or the view went away.
    pub async fn create<F, Fut>(&self, draft: T, send: F) -> Result<Option<T>, RequestError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RequestError>> + Send,
    {
        let mutation_id = Uuid::new_v4();
        let key = RecordKey::Pending(mutation_id);
        {
            let mut state = self.inner.lock().await;
            if state.detached {
                return Ok(None);
            }
            state.inflight.insert(key);
            state.entries.push(ListEntry::Pending { mutation_id, draft });
        }
        self.changed();

        let result = send().await;

        let mut state = self.inner.lock().await;
        state.inflight.remove(&key);
        let canceled = state.canceled_creates.remove(&mutation_id);
        if state.detached {
            drop(state);
            self.settled.notify_waiters();
            return Ok(None);
        }
        if canceled {
            // The user already deleted the row while the create was on the
            // wire; whatever the server answered is dropped locally.
            if let Ok(record) = &result {
                warn!(
                    entity_id = record.entity_id(),
                    "mutation: create confirmed after local cancel; discarding server record"
                );
            }
            drop(state);
            self.settled.notify_waiters();
            return Ok(None);
        }
        match result {
            Ok(record) => {
                match state.entries.iter().position(|entry| entry.key() == key) {
                    Some(index) => state.entries[index] = ListEntry::Committed(record.clone()),
                    None => state.entries.push(ListEntry::Committed(record.clone())),
                }
                drop(state);
                self.settled.notify_waiters();
                self.changed();
                Ok(Some(record))
            }
            Err(err) => {
                state.entries.retain(|entry| entry.key() != key);
                drop(state);
                self.settled.notify_waiters();
                self.changed();
                self.failed(&err);
                Err(err)
            }
        }
    }

    /// Patches record `id` locally, sends the patched record to the server,
    /// and reconciles. The patch runs against the record's current state at
    /// apply time, after any earlier mutation of the same id has settled, so
    /// queued toggles compound instead of replaying stale values.
    ///
    /// Returns `Ok(None)` when the record no longer exists locally; the
    /// network call is skipped entirely in that case.
    pub async fn update<P, F, Fut>(
        &self,
        id: i64,
        patch: P,
        send: F,
    ) -> Result<Option<T>, RequestError>
    where
        P: FnOnce(&mut T),
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<Option<T>, RequestError>> + Send,
    {
        let key = RecordKey::Committed(id);
        if !self.acquire(key).await {
            return Ok(None);
        }

        let (snapshot, patched) = {
            let mut state = self.inner.lock().await;
            let Some(index) = state.entries.iter().position(|entry| entry.key() == key) else {
                drop(state);
                self.release(key).await;
                debug!(id, "mutation: record vanished before update; skipping");
                return Ok(None);
            };
            let snapshot = state.entries[index].record().clone();
            let mut record = snapshot.clone();
            patch(&mut record);
            state.entries[index] = ListEntry::Committed(record.clone());
            (snapshot, record)
        };
        self.changed();

        let result = send(patched.clone()).await;

        let mut state = self.inner.lock().await;
        state.inflight.remove(&key);
        if state.detached {
            drop(state);
            self.settled.notify_waiters();
            return Ok(None);
        }
        match result {
            Ok(confirmation) => {
                let confirmed = match confirmation {
                    // The server's canonical version wins whenever it
                    // disagrees with the optimistic one.
                    Some(server_record) => {
                        if let Some(index) =
                            state.entries.iter().position(|entry| entry.key() == key)
                        {
                            state.entries[index] = ListEntry::Committed(server_record.clone());
                        }
                        server_record
                    }
                    None => patched,
                };
                drop(state);
                self.settled.notify_waiters();
                self.changed();
                Ok(Some(confirmed))
            }
            Err(err) => {
                // Snap the row back to its exact pre-mutation value.
                if let Some(index) = state.entries.iter().position(|entry| entry.key() == key) {
                    state.entries[index] = ListEntry::Committed(snapshot);
                }
                drop(state);
                self.settled.notify_waiters();
                self.changed();
                self.failed(&err);
                Err(err)
            }
        }
    }

    /// Removes a row optimistically. A still-pending create is canceled
    /// locally and the server is never asked to delete it; there is nothing
    /// to delete server-side yet. Returns whether a row was actually
    /// removed.
    pub async fn remove<F, Fut>(&self, key: RecordKey, send: F) -> Result<bool, RequestError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), RequestError>> + Send,
    {
        if let RecordKey::Pending(mutation_id) = key {
            let existed = {
                let mut state = self.inner.lock().await;
                if state.detached {
                    return Ok(false);
                }
                let existed = state.entries.iter().any(|entry| entry.key() == key);
                state.entries.retain(|entry| entry.key() != key);
                if state.inflight.contains(&key) {
                    state.canceled_creates.insert(mutation_id);
                }
                existed
            };
            if existed {
                self.changed();
            }
            return Ok(existed);
        }

        if !self.acquire(key).await {
            return Ok(false);
        }
        let (snapshot, index) = {
            let mut state = self.inner.lock().await;
            let Some(index) = state.entries.iter().position(|entry| entry.key() == key) else {
                drop(state);
                self.release(key).await;
                debug!(?key, "mutation: record vanished before delete; skipping");
                return Ok(false);
            };
            (state.entries.remove(index), index)
        };
        self.changed();

        let result = send().await;

        let mut state = self.inner.lock().await;
        state.inflight.remove(&key);
        if state.detached {
            drop(state);
            self.settled.notify_waiters();
            return Ok(false);
        }
        match result {
            Ok(()) => {
                drop(state);
                self.settled.notify_waiters();
                Ok(true)
            }
            Err(err) => {
                // The row snaps back to its prior position.
                let at = index.min(state.entries.len());
                state.entries.insert(at, snapshot);
                drop(state);
                self.settled.notify_waiters();
                self.changed();
                self.failed(&err);
                Err(err)
            }
        }
    }

    /// Holds off until no other mutation for `key` is in flight, then marks
    /// `key` in flight. Returns false when the coordinator was detached
    /// while waiting.
    async fn acquire(&self, key: RecordKey) -> bool {
        loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.inner.lock().await;
                if state.detached {
                    return false;
                }
                if !state.inflight.contains(&key) {
                    state.inflight.insert(key);
                    return true;
                }
            }
            notified.await;
        }
    }

    async fn release(&self, key: RecordKey) {
        self.inner.lock().await.inflight.remove(&key);
        self.settled.notify_waiters();
    }

    fn changed(&self) {
        let _ = self.events.send(MutationEvent::ListChanged);
    }

    fn failed(&self, err: &RequestError) {
        let _ = self.events.send(MutationEvent::MutationFailed {
            message: err.user_message().to_string(),
        });
    }
}

#[cfg(test)]
#[path = "tests/mutation_tests.rs"]
mod tests;
