pub(crate) const DEFAULT_REQUEST_PAGE_SIZE: usize = 10;
pub(crate) const DEFAULT_MAX_RECORD_INDEX: usize = 100;
pub(crate) const DEFAULT_TOTAL_COUNT_ESTIMATE: usize = 200;
pub(crate) const DEFAULT_MAX_STATE_FETCHES_PER_KEY: usize = 4;
pub(crate) const DEFAULT_EVENT_HISTORY: usize = 64;

/// What a successful mutation does to the continuation tokens already learned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidationPolicy {
    /// Tag the token cache with a new generation and treat every token from the mutated page onwards as suspect.
    ///
    /// Fetching a page behind a suspect token first re-walks the pages in between, so records shifted across a
    /// page boundary by the mutation show up where they now belong.
    #[default]
    RefetchAffected,
    /// Keep every learned token as is, new tokens are only appended when their value hasn't been seen before.
    ///
    /// After a delete this can cause boundary drift: a record that moved onto the current page from the next one
    /// won't appear until that page is fetched again, and may show up on both pages.
    KeepTokens,
}

/// Configuration for a [`crate::PaginatedTable`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    request_page_size: Option<usize>,
    max_record_index: Option<usize>,
    total_count_estimate: Option<usize>,
    invalidation: Option<InvalidationPolicy>,
    cancel_superseded_state_fetches: Option<bool>,
    max_state_fetches_per_key: Option<usize>,
    event_history: Option<usize>,
}

impl SyncOptions {
    /// Create new [`SyncOptions`] with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options reproducing the console's older table behaviour: learned tokens are never revisited after a
    /// mutation and supplementary fetches from a page the user navigated away from still land in the store.
    pub fn legacy() -> Self {
        Self::default()
            .set_invalidation(InvalidationPolicy::KeepTokens)
            .set_cancel_superseded_state_fetches(false)
    }

    /// Set the number of records requested from the listing endpoint on every call.
    ///
    /// This is independent of the page size the rendering layer asks for.
    ///
    /// Default: `10`
    #[track_caller]
    pub fn set_request_page_size(mut self, request_page_size: usize) -> Self {
        // A zero sized request would never advance the cursor:
        self.request_page_size = Some(request_page_size.max(1));
        self
    }

    /// Set the ceiling on `page_index * page_size`.
    ///
    /// Requests past it are clamped to page `max_record_index / page_size` rather than rejected, bounding the token cache.
    ///
    /// Default: `100`
    #[track_caller]
    pub fn set_max_record_index(mut self, max_record_index: usize) -> Self {
        self.max_record_index = Some(max_record_index);
        self
    }

    /// Set the total record count reported with every page. Only drives the page count display, never verified.
    ///
    /// Default: `200`
    #[track_caller]
    pub fn set_total_count_estimate(mut self, total_count_estimate: usize) -> Self {
        self.total_count_estimate = Some(total_count_estimate);
        self
    }

    /// Set how learned tokens are treated after a successful mutation.
    ///
    /// Default: [`InvalidationPolicy::RefetchAffected`]
    #[track_caller]
    pub fn set_invalidation(mut self, invalidation: InvalidationPolicy) -> Self {
        self.invalidation = Some(invalidation);
        self
    }

    /// Set whether supplementary fetches spawned for a page are aborted once a different page is shown.
    ///
    /// Default: `true`
    #[track_caller]
    pub fn set_cancel_superseded_state_fetches(mut self, cancel: bool) -> Self {
        self.cancel_superseded_state_fetches = Some(cancel);
        self
    }

    /// Set how many supplementary fetches may be in flight for a single key, the oldest is aborted past this.
    ///
    /// Default: `4`
    #[track_caller]
    pub fn set_max_state_fetches_per_key(mut self, max: usize) -> Self {
        self.max_state_fetches_per_key = Some(max.max(1));
        self
    }

    /// Set how many diagnostic events are kept per table.
    ///
    /// Default: `64`
    #[track_caller]
    pub fn set_event_history(mut self, event_history: usize) -> Self {
        self.event_history = Some(event_history);
        self
    }

    /// The number of records requested from the listing endpoint on every call.
    ///
    /// Default: `10`
    pub fn request_page_size(&self) -> usize {
        self.request_page_size.unwrap_or(DEFAULT_REQUEST_PAGE_SIZE)
    }

    /// The ceiling on `page_index * page_size`.
    ///
    /// Default: `100`
    pub fn max_record_index(&self) -> usize {
        self.max_record_index.unwrap_or(DEFAULT_MAX_RECORD_INDEX)
    }

    /// The total record count reported with every page.
    ///
    /// Default: `200`
    pub fn total_count_estimate(&self) -> usize {
        self.total_count_estimate
            .unwrap_or(DEFAULT_TOTAL_COUNT_ESTIMATE)
    }

    /// How learned tokens are treated after a successful mutation.
    ///
    /// Default: [`InvalidationPolicy::RefetchAffected`]
    pub fn invalidation(&self) -> InvalidationPolicy {
        self.invalidation.unwrap_or_default()
    }

    /// Whether supplementary fetches for a superseded page are aborted.
    ///
    /// Default: `true`
    pub fn cancel_superseded_state_fetches(&self) -> bool {
        self.cancel_superseded_state_fetches.unwrap_or(true)
    }

    /// The per-key cap on in-flight supplementary fetches.
    ///
    /// Default: `4`
    pub fn max_state_fetches_per_key(&self) -> usize {
        self.max_state_fetches_per_key
            .unwrap_or(DEFAULT_MAX_STATE_FETCHES_PER_KEY)
    }

    /// How many diagnostic events are kept per table.
    ///
    /// Default: `64`
    pub fn event_history(&self) -> usize {
        self.event_history.unwrap_or(DEFAULT_EVENT_HISTORY)
    }

    /// The page actually used for token lookup once the record ceiling is applied.
    ///
    /// `page_size` must be non-zero.
    pub fn effective_page(&self, page_index: usize, page_size: usize) -> usize {
        let max_record_index = self.max_record_index();
        if page_index.saturating_mul(page_size) > max_record_index {
            max_record_index / page_size
        } else {
            page_index
        }
    }
}
