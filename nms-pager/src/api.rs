use std::{fmt, future::Future, hash::Hash};

/// A kind of remotely owned entity shown in a [`crate::PaginatedTable`], e.g. subscribers keyed by IMSI.
///
/// Describes the types involved and how a record (plus its supplementary state, if any) projects into a table row.
pub trait TableResource: Send + Sync + 'static {
    /// Stable identifier of a record.
    type Key: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;
    /// The remotely owned record.
    type Record: Clone + fmt::Debug + Send + Sync + 'static;
    /// Auxiliary per-record data fetched separately from the listing.
    type State: Clone + fmt::Debug + Send + Sync + 'static;
    /// The display projection of a record.
    type Row: Clone + fmt::Debug + PartialEq + Send + Sync + 'static;

    /// Whether [`ResourceApi::get_state`] should be called for each listed record.
    const HAS_SUPPLEMENTARY_STATE: bool = true;

    /// Project a record into its row. `state` is `None` until a supplementary fetch for the key has completed.
    fn to_row(&self, key: &Self::Key, record: &Self::Record, state: Option<&Self::State>) -> Self::Row;
}

/// One response of the remote listing endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage<K, V> {
    /// The records of the page, in server order.
    pub records: Vec<(K, V)>,
    /// Where the next page starts, empty when there is none.
    pub next_page_token: String,
}

impl<K, V> Default for ListPage<K, V> {
    fn default() -> Self {
        Self {
            records: vec![],
            next_page_token: String::new(),
        }
    }
}

/// The remote endpoints a [`crate::PaginatedTable`] consumes for a resource.
///
/// Timeouts and retries belong to the implementation, the table never retries on its own.
pub trait ResourceApi<R: TableResource>: Send + Sync + 'static {
    /// The transport error, only its message is surfaced.
    type Error: fmt::Display + Send;

    /// List up to `page_size` records starting at `page_token` (empty for the start of the list).
    fn list(
        &self,
        network_id: &str,
        page_size: usize,
        page_token: &str,
    ) -> impl Future<Output = Result<ListPage<R::Key, R::Record>, Self::Error>> + Send;

    /// Fetch the supplementary state of a single record.
    fn get_state(
        &self,
        network_id: &str,
        key: &R::Key,
    ) -> impl Future<Output = Result<R::State, Self::Error>> + Send;

    /// Create a record.
    fn create(
        &self,
        network_id: &str,
        key: &R::Key,
        record: &R::Record,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Replace an existing record.
    fn update(
        &self,
        network_id: &str,
        key: &R::Key,
        record: &R::Record,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Delete a record.
    fn delete(
        &self,
        network_id: &str,
        key: &R::Key,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
