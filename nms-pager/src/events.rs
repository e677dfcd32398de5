use core::fmt;
use std::collections::VecDeque;

/// Bounded history of what a table did, newest last.
#[derive(Debug)]
pub(crate) struct Events {
    capacity: usize,
    events: VecDeque<SyncEvent>,
}

impl Events {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity.min(64)),
        }
    }

    pub fn push(&mut self, variant: SyncEventVariant) {
        if self.capacity == 0 {
            return;
        }
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(SyncEvent::new(variant));
    }

    pub fn snapshot(&self) -> Vec<SyncEvent> {
        self.events.iter().cloned().collect()
    }
}

/// Something a [`crate::PaginatedTable`] did, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncEvent {
    /// When it happened.
    pub recorded_at: chrono::DateTime<chrono::Utc>,
    /// What happened.
    pub variant: SyncEventVariant,
}

impl SyncEvent {
    fn new(variant: SyncEventVariant) -> Self {
        Self {
            recorded_at: chrono::Utc::now(),
            variant,
        }
    }
}

/// The kinds of [`SyncEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SyncEventVariant {
    /// A listing call for `page` completed.
    Fetched {
        /// The page fetched.
        page: usize,
        /// Records returned.
        records: usize,
        /// Time spent in the listing call.
        elapsed_ms: i64,
    },
    /// A page past the end of the list was served without a remote call.
    PastEnd {
        /// The page requested.
        page: usize,
    },
    /// Pages `from..to` were re-fetched to re-learn tokens after a mutation.
    Rewalked {
        /// First page re-fetched.
        from: usize,
        /// The page that was requested.
        to: usize,
    },
    /// Supplementary state was merged for a key.
    StateMerged {
        /// The record key.
        key: String,
        /// Whether the displayed row changed.
        row_changed: bool,
    },
    /// A supplementary fetch failed, the row keeps its prior state.
    StateFetchFailed {
        /// The record key.
        key: String,
    },
    /// Supplementary fetches were aborted.
    StateFetchesCancelled {
        /// How many.
        count: usize,
    },
    /// A record was removed and the current page scheduled for refetch.
    Invalidated {
        /// The record key.
        key: String,
        /// Token cache generation after the invalidation.
        generation: u64,
    },
    /// A remote mutation succeeded.
    Mutated {
        /// The mutation.
        operation: crate::MutationKind,
        /// The record key.
        key: String,
    },
    /// The token cache was discarded.
    Reset,
}

impl fmt::Display for SyncEventVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEventVariant::Fetched {
                page,
                records,
                elapsed_ms,
            } => write!(f, "fetched page {page} ({records} records) in {elapsed_ms}ms"),
            SyncEventVariant::PastEnd { page } => write!(f, "page {page} past end of list"),
            SyncEventVariant::Rewalked { from, to } => {
                write!(f, "re-walked pages {from}..{to}")
            }
            SyncEventVariant::StateMerged { key, row_changed } => {
                write!(f, "state merged for {key} (row changed: {row_changed})")
            }
            SyncEventVariant::StateFetchFailed { key } => write!(f, "state fetch failed for {key}"),
            SyncEventVariant::StateFetchesCancelled { count } => {
                write!(f, "{count} state fetch(es) cancelled")
            }
            SyncEventVariant::Invalidated { key, generation } => {
                write!(f, "invalidated {key} (generation {generation})")
            }
            SyncEventVariant::Mutated { operation, key } => write!(f, "{operation} {key}"),
            SyncEventVariant::Reset => write!(f, "reset"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bounded() {
        let mut events = Events::new(2);
        events.push(SyncEventVariant::Reset);
        events.push(SyncEventVariant::PastEnd { page: 1 });
        events.push(SyncEventVariant::PastEnd { page: 2 });
        let variants = events
            .snapshot()
            .into_iter()
            .map(|event| event.variant)
            .collect::<Vec<_>>();
        assert_eq!(
            variants,
            vec![
                SyncEventVariant::PastEnd { page: 1 },
                SyncEventVariant::PastEnd { page: 2 }
            ]
        );

        let mut disabled = Events::new(0);
        disabled.push(SyncEventVariant::Reset);
        assert!(disabled.snapshot().is_empty());
    }
}
