use std::{collections::HashMap, fmt::Debug, sync::Arc};

use futures::{channel::oneshot, future::AbortHandle};
use any_spawner::Executor;
use leptos::prelude::{ArcReadSignal, ArcRwSignal, GetUntracked, Set};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    MutationKind, RecordStore, ResourceApi, SyncError, SyncOptions, TableResource, TokenCache,
    events::{Events, SyncEvent, SyncEventVariant},
    utils::{OnDrop, new_table_id, new_task_id},
};

/// The [`RecordStore`] holding a resource's records and states.
pub type StoreFor<R> = RecordStore<
    <R as TableResource>::Key,
    <R as TableResource>::Record,
    <R as TableResource>::State,
>;

/// What the rendering layer receives for every resolved [`PaginatedTable::fetch_page`].
#[derive(Debug, Clone, PartialEq)]
pub struct TablePage<Row> {
    /// The rows of the page, in server order.
    pub rows: Vec<Row>,
    /// The page actually shown, after clamping.
    pub page: usize,
    /// The configured estimate of the total record count, only meant for the page count display.
    pub total_count: usize,
}

struct StateTask<K> {
    key: K,
    page: usize,
    abort: AbortHandle,
}

struct TableState<R: TableResource> {
    tokens: TokenCache,
    current_page: usize,
    page_size: usize,
    keys: Vec<R::Key>,
    rows: HashMap<R::Key, ArcRwSignal<R::Row>>,
    tasks: HashMap<u64, StateTask<R::Key>>,
    pending: Vec<oneshot::Receiver<()>>,
    events: Events,
}

impl<R: TableResource> TableState<R> {
    fn abort_tasks_where(&mut self, should_abort: impl Fn(&StateTask<R::Key>) -> bool) -> usize {
        let task_ids = self
            .tasks
            .iter()
            .filter(|(_, task)| should_abort(task))
            .map(|(task_id, _)| *task_id)
            .collect::<Vec<_>>();
        for task_id in &task_ids {
            if let Some(task) = self.tasks.remove(task_id) {
                task.abort.abort();
            }
        }
        if !task_ids.is_empty() {
            self.events.push(SyncEventVariant::StateFetchesCancelled {
                count: task_ids.len(),
            });
        }
        task_ids.len()
    }
}

struct TableInner<R: TableResource, A> {
    table_id: u64,
    network_id: Arc<str>,
    resource: R,
    api: Arc<A>,
    store: StoreFor<R>,
    options: SyncOptions,
    state: Mutex<TableState<R>>,
    // One primary fetch at a time, token cache updates must not interleave.
    fetch_lock: futures::lock::Mutex<()>,
}

impl<R: TableResource, A> Drop for TableInner<R, A> {
    fn drop(&mut self) {
        for (_, task) in self.state.get_mut().tasks.drain() {
            task.abort.abort();
        }
    }
}

/// Turns a token-paginated listing endpoint into a page-addressable table model.
///
/// Owns the token cache for one table session, dispatches listing calls, merges per-record supplementary state as
/// it arrives and keeps the shared [`RecordStore`] up to date across mutations issued from the same view.
///
/// Cheap to clone, all clones drive the same table. Outstanding supplementary fetches are aborted once the last
/// clone is dropped.
///
/// # Example
///
/// ```rust,ignore
/// use nms_pager::{PaginatedTable, SubscriberResource, SubscriberStore, SyncOptions};
///
/// let table = PaginatedTable::new(
///     "network_1",
///     SubscriberResource::new(),
///     MyMagmaApi::new(),
///     SubscriberStore::expect(),
///     SyncOptions::new(),
/// );
///
/// let first = table.fetch_page(0, 10).await?;
/// // Pages must be walked in order, page 1 uses the token learned by page 0:
/// let second = table.fetch_page(1, 10).await?;
///
/// // Row level updates as session state arrives:
/// let row = table.row_signal(&"IMSI001010000000001".to_string());
/// ```
pub struct PaginatedTable<R: TableResource, A> {
    inner: Arc<TableInner<R, A>>,
}

impl<R: TableResource, A> Clone for PaginatedTable<R, A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R: TableResource, A> Debug for PaginatedTable<R, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginatedTable")
            .field("table_id", &self.inner.table_id)
            .field("network_id", &self.inner.network_id)
            .finish()
    }
}

impl<R, A> PaginatedTable<R, A>
where
    R: TableResource,
    A: ResourceApi<R>,
{
    /// Create a table for `network_id` with an empty token cache.
    pub fn new(
        network_id: impl Into<Arc<str>>,
        resource: R,
        api: A,
        store: StoreFor<R>,
        options: SyncOptions,
    ) -> Self {
        let table_id = new_table_id();
        let network_id = network_id.into();
        debug!(table_id, %network_id, ?options, "table created");
        Self {
            inner: Arc::new(TableInner {
                table_id,
                network_id,
                resource,
                api: Arc::new(api),
                store,
                options,
                state: Mutex::new(TableState {
                    tokens: TokenCache::new(),
                    current_page: 0,
                    page_size: options.request_page_size(),
                    keys: vec![],
                    rows: HashMap::new(),
                    tasks: HashMap::new(),
                    pending: vec![],
                    events: Events::new(options.event_history()),
                }),
                fetch_lock: futures::lock::Mutex::new(()),
            }),
        }
    }

    /// The network the table lists records for.
    pub fn network_id(&self) -> &str {
        &self.inner.network_id
    }

    /// The shared store the table writes to.
    pub fn store(&self) -> &StoreFor<R> {
        &self.inner.store
    }

    /// The resource description used to project rows.
    pub fn resource(&self) -> &R {
        &self.inner.resource
    }

    /// The remote endpoints.
    pub fn api(&self) -> &A {
        &self.inner.api
    }

    /// The options the table was created with.
    pub fn options(&self) -> SyncOptions {
        self.inner.options
    }

    /// The page most recently shown.
    pub fn current_page(&self) -> usize {
        self.inner.state.lock().current_page
    }

    /// The learned continuation tokens in page order.
    pub fn tokens(&self) -> Vec<String> {
        self.inner.state.lock().tokens.tokens()
    }

    /// Snapshot of the token cache.
    pub fn token_cache(&self) -> TokenCache {
        self.inner.state.lock().tokens.clone()
    }

    /// The token cache generation, bumped on every successful mutation.
    pub fn generation(&self) -> u64 {
        self.inner.state.lock().tokens.generation()
    }

    /// Recent diagnostic events, oldest first.
    pub fn events(&self) -> Vec<SyncEvent> {
        self.inner.state.lock().events.snapshot()
    }

    /// The rows of the current page as currently displayed, including supplementary merges since the fetch.
    pub fn rows(&self) -> Vec<R::Row> {
        let state = self.inner.state.lock();
        state
            .keys
            .iter()
            .filter_map(|key| state.rows.get(key).map(|signal| signal.get_untracked()))
            .collect()
    }

    /// A live handle on a row of the current page, updated in place as supplementary state is merged.
    pub fn row_signal(&self, key: &R::Key) -> Option<ArcReadSignal<R::Row>> {
        self.inner
            .state
            .lock()
            .rows
            .get(key)
            .map(|signal| signal.read_only())
    }

    /// Number of supplementary fetches still running.
    pub fn in_flight_state_fetches(&self) -> usize {
        self.inner.state.lock().tasks.len()
    }

    /// Fetch page `page_index` for a view showing `page_size` rows per page.
    ///
    /// Pages past the configured record ceiling are clamped to the last reachable page. Page `p > 0` can only be
    /// fetched once page `p - 1` has been, otherwise [`SyncError::OutOfOrderPage`] is returned. The page right after
    /// the last one is served empty without a remote call, anything further is out of order.
    ///
    /// Resolves as soon as the listing call has; supplementary state for each record is fetched in the background
    /// and published through [`PaginatedTable::row_signal`].
    pub async fn fetch_page(
        &self,
        page_index: usize,
        page_size: usize,
    ) -> Result<TablePage<R::Row>, SyncError> {
        if page_size == 0 {
            return Err(SyncError::InvalidPageSize(page_size));
        }
        let inner = &self.inner;
        let page = inner.options.effective_page(page_index, page_size);
        if page != page_index {
            debug!(
                table_id = inner.table_id,
                page_index, page_size, page, "page clamped to record ceiling"
            );
        }

        let _fetch_guard = inner.fetch_lock.lock().await;

        let rewalk_from = inner.state.lock().tokens.rewalk_from(page);
        if let Some(from) = rewalk_from {
            debug!(
                table_id = inner.table_id,
                from,
                to = page,
                "re-walking pages behind suspect tokens"
            );
            for walk_page in from..page {
                if inner.state.lock().tokens.ends_before(walk_page) {
                    break;
                }
                self.list_page(walk_page).await?;
            }
            inner
                .state
                .lock()
                .events
                .push(SyncEventVariant::Rewalked { from, to: page });
        }

        let past_end = inner.state.lock().tokens.is_past_end(page);
        let records = if past_end {
            trace!(table_id = inner.table_id, page, "page past end of list");
            inner
                .state
                .lock()
                .events
                .push(SyncEventVariant::PastEnd { page });
            vec![]
        } else {
            self.list_page(page).await?
        };

        let rows = self.publish_page(page, page_size, &records);
        if R::HAS_SUPPLEMENTARY_STATE {
            for (key, _) in records {
                self.spawn_state_fetch(key, page);
            }
        }

        Ok(TablePage {
            rows,
            page,
            total_count: inner.options.total_count_estimate(),
        })
    }

    /// Fetch the current page again with the last page size.
    pub async fn refresh(&self) -> Result<TablePage<R::Row>, SyncError> {
        let (page, page_size) = {
            let state = self.inner.state.lock();
            (state.current_page, state.page_size)
        };
        self.fetch_page(page, page_size).await
    }

    /// Remove a record from the shared store and fetch the current page again, reusing the learned tokens.
    ///
    /// Under [`crate::InvalidationPolicy::RefetchAffected`] the tokens from the current page onwards are marked
    /// suspect, so later pages get re-walked before being shown.
    pub async fn invalidate_record(&self, key: &R::Key) -> Result<TablePage<R::Row>, SyncError> {
        let inner = &self.inner;
        inner.store.remove(key);
        let (page, page_size) = {
            let mut state = inner.state.lock();
            let page = state.current_page;
            state.tokens.mark_mutation(page, inner.options.invalidation());
            let generation = state.tokens.generation();
            state.events.push(SyncEventVariant::Invalidated {
                key: key.to_string(),
                generation,
            });
            (page, state.page_size)
        };
        debug!(table_id = inner.table_id, %key, page, "record invalidated, refetching current page");
        self.fetch_page(page, page_size).await
    }

    /// Delete a record remotely, then [`PaginatedTable::invalidate_record`] it.
    ///
    /// If the remote rejects the delete nothing local changes and the error is returned, there's no retry.
    pub async fn delete_record(&self, key: &R::Key) -> Result<TablePage<R::Row>, SyncError> {
        let inner = &self.inner;
        if let Err(e) = inner.api.delete(&inner.network_id, key).await {
            warn!(table_id = inner.table_id, %key, error = %e, "delete rejected");
            return Err(SyncError::mutation(MutationKind::Delete, key, e));
        }
        inner.state.lock().events.push(SyncEventVariant::Mutated {
            operation: MutationKind::Delete,
            key: key.to_string(),
        });
        self.invalidate_record(key).await
    }

    /// Create a record remotely and add it to the shared store.
    ///
    /// Where the record lands in the list is unknown, so every learned token becomes suspect under
    /// [`crate::InvalidationPolicy::RefetchAffected`].
    pub async fn create_record(&self, key: R::Key, record: R::Record) -> Result<(), SyncError> {
        let inner = &self.inner;
        if let Err(e) = inner.api.create(&inner.network_id, &key, &record).await {
            warn!(table_id = inner.table_id, %key, error = %e, "create rejected");
            return Err(SyncError::mutation(MutationKind::Create, &key, e));
        }
        inner.store.upsert_record(key.clone(), record);
        {
            let mut state = inner.state.lock();
            state.tokens.mark_mutation(0, inner.options.invalidation());
            state.events.push(SyncEventVariant::Mutated {
                operation: MutationKind::Create,
                key: key.to_string(),
            });
        }
        debug!(table_id = inner.table_id, %key, "record created");
        Ok(())
    }

    /// Replace a record remotely, then in the shared store and on the current page.
    pub async fn update_record(&self, key: R::Key, record: R::Record) -> Result<(), SyncError> {
        let inner = &self.inner;
        if let Err(e) = inner.api.update(&inner.network_id, &key, &record).await {
            warn!(table_id = inner.table_id, %key, error = %e, "update rejected");
            return Err(SyncError::mutation(MutationKind::Update, &key, e));
        }
        inner.store.upsert_record(key.clone(), record);
        {
            let mut state = inner.state.lock();
            state.tokens.bump_generation();
            state.events.push(SyncEventVariant::Mutated {
                operation: MutationKind::Update,
                key: key.to_string(),
            });
        }
        self.republish_row(&key);
        debug!(table_id = inner.table_id, %key, "record updated");
        Ok(())
    }

    /// Merge supplementary state for a key into the shared store, updating only that row if it's displayed.
    ///
    /// Returns whether the displayed row changed, merging the same state twice leaves the row untouched.
    pub fn merge_supplementary(&self, key: R::Key, state: R::State) -> bool {
        let inner = &self.inner;
        let seq = inner.store.merge_state(key.clone(), state);
        let row_changed = self.republish_row(&key);
        trace!(table_id = inner.table_id, %key, seq, row_changed, "supplementary state merged");
        inner
            .state
            .lock()
            .events
            .push(SyncEventVariant::StateMerged {
                key: key.to_string(),
                row_changed,
            });
        row_changed
    }

    /// Wait for every supplementary fetch spawned so far (and any spawned meanwhile) to complete or be aborted.
    pub async fn settled(&self) {
        loop {
            let pending = std::mem::take(&mut self.inner.state.lock().pending);
            if pending.is_empty() {
                break;
            }
            // Aborted tasks drop their sender, that's fine too:
            futures::future::join_all(pending).await;
        }
    }

    /// Abort every outstanding supplementary fetch. Returns how many were aborted.
    pub fn cancel_state_fetches(&self) -> usize {
        let cancelled = self.inner.state.lock().abort_tasks_where(|_| true);
        if cancelled > 0 {
            debug!(table_id = self.inner.table_id, cancelled, "state fetches cancelled");
        }
        cancelled
    }

    /// Discard the token cache and abort outstanding supplementary fetches, the next fetch starts from page 0.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.tokens = TokenCache::new();
        state.current_page = 0;
        state.abort_tasks_where(|_| true);
        state.events.push(SyncEventVariant::Reset);
        debug!(table_id = self.inner.table_id, "token cache reset");
    }

    async fn list_page(&self, page: usize) -> Result<Vec<(R::Key, R::Record)>, SyncError> {
        let inner = &self.inner;
        let page_token = inner.state.lock().tokens.token_for_page(page)?.to_string();

        let started_at = chrono::Utc::now();
        let listed = inner
            .api
            .list(
                &inner.network_id,
                inner.options.request_page_size(),
                &page_token,
            )
            .await
            .map_err(|e| {
                warn!(table_id = inner.table_id, page, error = %e, "listing failed");
                SyncError::fetch(e)
            })?;
        let elapsed_ms = (chrono::Utc::now() - started_at).num_milliseconds();

        {
            let mut state = inner.state.lock();
            state
                .tokens
                .record_next(page, &listed.next_page_token, inner.options.invalidation());
            state.events.push(SyncEventVariant::Fetched {
                page,
                records: listed.records.len(),
                elapsed_ms,
            });
        }
        debug!(
            table_id = inner.table_id,
            page,
            records = listed.records.len(),
            next_page_token = %listed.next_page_token,
            elapsed_ms,
            "page listed"
        );

        inner.store.upsert_records(listed.records.iter().cloned());
        Ok(listed.records)
    }

    fn publish_page(
        &self,
        page: usize,
        page_size: usize,
        records: &[(R::Key, R::Record)],
    ) -> Vec<R::Row> {
        let inner = &self.inner;
        // Whatever state is already known for a record is shown until its fetch completes:
        let rows = records
            .iter()
            .map(|(key, record)| {
                let state = inner.store.state(key);
                (key.clone(), inner.resource.to_row(key, record, state.as_ref()))
            })
            .collect::<Vec<_>>();

        let mut changed_signals = vec![];
        {
            let mut state = inner.state.lock();
            let navigated = state.current_page != page;
            state.current_page = page;
            state.page_size = page_size;
            if navigated && inner.options.cancel_superseded_state_fetches() {
                let cancelled = state.abort_tasks_where(|task| task.page != page);
                if cancelled > 0 {
                    debug!(
                        table_id = inner.table_id,
                        cancelled, page, "state fetches for superseded page cancelled"
                    );
                }
            }

            let mut next_rows = HashMap::with_capacity(rows.len());
            for (key, row) in &rows {
                let signal = match state.rows.remove(key) {
                    Some(signal) => {
                        changed_signals.push((signal.clone(), row.clone()));
                        signal
                    }
                    None => ArcRwSignal::new(row.clone()),
                };
                next_rows.insert(key.clone(), signal);
            }
            state.rows = next_rows;
            state.keys = rows.iter().map(|(key, _)| key.clone()).collect();
        }

        // Notify outside the table lock, subscribers may read the table back:
        for (signal, row) in changed_signals {
            if signal.get_untracked() != row {
                signal.set(row);
            }
        }

        rows.into_iter().map(|(_, row)| row).collect()
    }

    fn republish_row(&self, key: &R::Key) -> bool {
        let inner = &self.inner;
        let signal = inner.state.lock().rows.get(key).cloned();
        let Some(signal) = signal else {
            return false;
        };
        let row = inner.store.with_entry(key, |entry| {
            entry.and_then(|entry| {
                entry
                    .record
                    .as_ref()
                    .map(|record| inner.resource.to_row(key, record, entry.state.as_ref()))
            })
        });
        match row {
            Some(row) if signal.get_untracked() != row => {
                signal.set(row);
                true
            }
            _ => false,
        }
    }

    fn spawn_state_fetch(&self, key: R::Key, page: usize) {
        let inner = &self.inner;
        let task_id = new_task_id();
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let weak = Arc::downgrade(&self.inner);

        let fetch = {
            let api = inner.api.clone();
            let network_id = inner.network_id.clone();
            let key = key.clone();
            let weak = weak.clone();
            async move {
                let result = api.get_state(&network_id, &key).await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let table = PaginatedTable { inner };
                match result {
                    Ok(state) => {
                        table.merge_supplementary(key, state);
                    }
                    Err(e) => {
                        warn!(
                            table_id = table.inner.table_id,
                            %key,
                            error = %e,
                            "supplementary fetch failed, keeping prior state"
                        );
                        table
                            .inner
                            .state
                            .lock()
                            .events
                            .push(SyncEventVariant::StateFetchFailed {
                                key: key.to_string(),
                            });
                    }
                }
            }
        };
        let (fetch, abort) = futures::future::abortable(fetch);

        {
            let mut state = inner.state.lock();
            let max_per_key = inner.options.max_state_fetches_per_key();
            let mut same_key = state
                .tasks
                .iter()
                .filter(|(_, task)| task.key == key)
                .map(|(task_id, _)| *task_id)
                .collect::<Vec<_>>();
            if same_key.len() >= max_per_key {
                // Ids are increasing, so the lowest are the oldest:
                same_key.sort_unstable();
                let excess = same_key.len() + 1 - max_per_key;
                for task_id in &same_key[..excess] {
                    if let Some(task) = state.tasks.remove(task_id) {
                        task.abort.abort();
                    }
                }
                state
                    .events
                    .push(SyncEventVariant::StateFetchesCancelled { count: excess });
            }
            state.tasks.insert(task_id, StateTask { key, page, abort });
            state
                .pending
                .retain_mut(|done_rx| matches!(done_rx.try_recv(), Ok(None)));
            state.pending.push(done_rx);
        }

        // Also runs if the executor drops the task before polling it:
        let cleanup = OnDrop::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.state.lock().tasks.remove(&task_id);
            }
            let _ = done_tx.send(());
        });
        Executor::spawn(async move {
            let _cleanup = cleanup;
            if fetch.await.is_err() {
                trace!(task_id, "supplementary fetch aborted");
            }
        });
    }
}
