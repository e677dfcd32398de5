use std::{collections::HashMap, fmt::Debug, hash::Hash, sync::Arc};

use leptos::prelude::{expect_context, provide_context, use_context};
use parking_lot::RwLock;

/// What the store holds for a single key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEntry<R, S> {
    /// The last record written, `None` when only state has arrived so far.
    pub record: Option<R>,
    /// The last supplementary state written.
    pub state: Option<S>,
    /// Sequence number of the write that set `record`.
    pub record_seq: u64,
    /// Sequence number of the write that set `state`.
    pub state_seq: u64,
}

impl<R, S> Default for StoreEntry<R, S> {
    fn default() -> Self {
        Self {
            record: None,
            state: None,
            record_seq: 0,
            state_seq: 0,
        }
    }
}

#[derive(Debug)]
struct StoreInner<K, R, S> {
    entries: HashMap<K, StoreEntry<R, S>>,
    next_seq: u64,
}

impl<K, R, S> StoreInner<K, R, S> {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// The process-wide record store, shared by every view showing the same kind of record.
///
/// Cloning is cheap and shares the underlying map. Writes only happen through the update functions below, each
/// stamped with a sequence number taken when the write is applied, so the last completed write always wins
/// and can be audited via [`StoreEntry::record_seq`]/[`StoreEntry::state_seq`].
///
/// Can be shared through leptos context:
///
/// ```
/// use leptos::prelude::*;
/// use nms_pager::SubscriberStore;
///
/// let owner = Owner::new();
/// owner.set();
///
/// let store = SubscriberStore::provide();
/// // ...in any child view:
/// let same_store = SubscriberStore::expect();
/// assert!(store.ptr_eq(&same_store));
/// ```
#[derive(Debug)]
pub struct RecordStore<K, R, S> {
    inner: Arc<RwLock<StoreInner<K, R, S>>>,
}

impl<K, R, S> Clone for RecordStore<K, R, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, R, S> Default for RecordStore<K, R, S> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner {
                entries: HashMap::new(),
                next_seq: 0,
            })),
        }
    }
}

impl<K, R, S> RecordStore<K, R, S>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
{
    /// Creates a new, empty [`RecordStore`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new [`RecordStore`] and provide it via leptos context.
    ///
    /// Returns the provided store, which can also be accessed with [`RecordStore::expect()`] from any child owner.
    pub fn provide() -> Self {
        let store = Self::new();
        provide_context(store.clone());
        store
    }

    /// Extract the [`RecordStore`] out of leptos context.
    ///
    /// # Panics
    ///
    /// Panics if a store of this type has not been provided by a parent owner.
    #[track_caller]
    pub fn expect() -> Self {
        expect_context()
    }

    /// Extract the [`RecordStore`] out of leptos context, if one was provided.
    pub fn use_store() -> Option<Self> {
        use_context()
    }

    /// True when both handles share the same underlying map.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Write a record, keeping any state already known for it. Returns the write's sequence number.
    pub fn upsert_record(&self, key: K, record: R) -> u64 {
        let mut guard = self.inner.write();
        let seq = guard.next_seq();
        let entry = guard.entries.entry(key).or_default();
        entry.record = Some(record);
        entry.record_seq = seq;
        seq
    }

    /// Write a batch of records under a single lock.
    pub fn upsert_records(&self, records: impl IntoIterator<Item = (K, R)>) {
        let mut guard = self.inner.write();
        for (key, record) in records {
            let seq = guard.next_seq();
            let entry = guard.entries.entry(key).or_default();
            entry.record = Some(record);
            entry.record_seq = seq;
        }
    }

    /// Write supplementary state for a key. Returns the write's sequence number.
    ///
    /// Creates the entry if the record isn't (or is no longer) present, a state fetch racing a delete isn't guarded.
    pub fn merge_state(&self, key: K, state: S) -> u64 {
        let mut guard = self.inner.write();
        let seq = guard.next_seq();
        let entry = guard.entries.entry(key).or_default();
        entry.state = Some(state);
        entry.state_seq = seq;
        seq
    }

    /// Remove everything known about a key.
    pub fn remove(&self, key: &K) -> Option<StoreEntry<R, S>> {
        let removed = self.inner.write().entries.remove(key);
        if removed.is_some() {
            tracing::trace!(?key, "removed record from store");
        }
        removed
    }

    /// Snapshot of everything known about a key.
    pub fn get(&self, key: &K) -> Option<StoreEntry<R, S>> {
        self.inner.read().entries.get(key).cloned()
    }

    /// The record for a key, if known.
    pub fn record(&self, key: &K) -> Option<R> {
        self.inner
            .read()
            .entries
            .get(key)
            .and_then(|entry| entry.record.clone())
    }

    /// The supplementary state for a key, if known.
    pub fn state(&self, key: &K) -> Option<S> {
        self.inner
            .read()
            .entries
            .get(key)
            .and_then(|entry| entry.state.clone())
    }

    /// True when a record (not just state) is held for the key.
    pub fn contains_record(&self, key: &K) -> bool {
        self.inner
            .read()
            .entries
            .get(key)
            .is_some_and(|entry| entry.record.is_some())
    }

    /// Read the record and state of a key together under one lock.
    pub fn with_entry<T>(&self, key: &K, f: impl FnOnce(Option<&StoreEntry<R, S>>) -> T) -> T {
        f(self.inner.read().entries.get(key))
    }

    /// Keys of every entry.
    pub fn keys(&self) -> Vec<K> {
        self.inner.read().entries.keys().cloned().collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.inner.write().entries.clear();
    }
}

#[cfg(test)]
mod test {
    use leptos::prelude::Owner;

    use super::*;

    type Store = RecordStore<String, u32, &'static str>;

    #[test]
    fn test_last_write_wins() {
        let store = Store::new();
        let first = store.merge_state("a".to_string(), "first");
        let second = store.merge_state("a".to_string(), "second");
        assert!(second > first);
        assert_eq!(store.state(&"a".to_string()), Some("second"));
        // State landing before the record is kept:
        assert_eq!(store.record(&"a".to_string()), None);
        assert!(!store.contains_record(&"a".to_string()));

        let record_seq = store.upsert_record("a".to_string(), 7);
        let entry = store.get(&"a".to_string()).expect("entry exists");
        assert_eq!(entry.record, Some(7));
        assert_eq!(entry.state, Some("second"));
        assert_eq!(entry.record_seq, record_seq);
        assert_eq!(entry.state_seq, second);
    }

    #[test]
    fn test_clones_share_the_map() {
        let store = Store::new();
        let other_view = store.clone();
        store.upsert_records([("a".to_string(), 1), ("b".to_string(), 2)]);
        assert_eq!(other_view.len(), 2);
        assert!(other_view.remove(&"a".to_string()).is_some());
        assert!(other_view.remove(&"a".to_string()).is_none());
        assert_eq!(store.keys(), vec!["b".to_string()]);
        store.clear();
        assert!(other_view.is_empty());
    }

    #[test]
    fn test_context() {
        let owner = Owner::new();
        owner.set();
        assert!(Store::use_store().is_none());
        let store = Store::provide();
        store.upsert_record("a".to_string(), 1);
        let from_context = Store::expect();
        assert!(store.ptr_eq(&from_context));
        assert_eq!(from_context.record(&"a".to_string()), Some(1));
    }
}
