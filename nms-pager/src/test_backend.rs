use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::Arc,
};

use parking_lot::Mutex;

use crate::{ListPage, ResourceApi, TableResource};

struct BackendInner<R: TableResource> {
    records: BTreeMap<String, R::Record>,
    list_calls: Vec<String>,
    state_calls: Vec<String>,
    state_scripts: HashMap<String, VecDeque<(u64, R::State)>>,
    state_delay_ms: u64,
    fail_state: HashSet<String>,
    fail_delete: bool,
    list_error: Option<String>,
    repeat_token: Option<String>,
}

/// An in-memory listing endpoint, continuation tokens are the key of the first record of the next page.
pub(crate) struct MemoryBackend<R: TableResource> {
    inner: Arc<Mutex<BackendInner<R>>>,
}

impl<R: TableResource> Clone for MemoryBackend<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R> MemoryBackend<R>
where
    R: TableResource<Key = String>,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BackendInner {
                records: BTreeMap::new(),
                list_calls: vec![],
                state_calls: vec![],
                state_scripts: HashMap::new(),
                state_delay_ms: 0,
                fail_state: HashSet::new(),
                fail_delete: false,
                list_error: None,
                repeat_token: None,
            })),
        }
    }

    pub fn insert(&self, key: String, record: R::Record) {
        self.inner.lock().records.insert(key, record);
    }

    pub fn get(&self, key: &str) -> Option<R::Record> {
        self.inner.lock().records.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// The page tokens of every listing call so far.
    pub fn list_calls(&self) -> Vec<String> {
        self.inner.lock().list_calls.clone()
    }

    pub fn state_calls(&self) -> Vec<String> {
        self.inner.lock().state_calls.clone()
    }

    /// Queue the outcome of the next state fetch for `key`: resolve with `state` after `delay_ms`.
    pub fn script_state(&self, key: &str, delay_ms: u64, state: R::State) {
        self.inner
            .lock()
            .state_scripts
            .entry(key.to_string())
            .or_default()
            .push_back((delay_ms, state));
    }

    /// Delay of unscripted state fetches.
    pub fn set_state_delay_ms(&self, delay_ms: u64) {
        self.inner.lock().state_delay_ms = delay_ms;
    }

    pub fn fail_state(&self, key: &str) {
        self.inner.lock().fail_state.insert(key.to_string());
    }

    pub fn set_fail_delete(&self, fail_delete: bool) {
        self.inner.lock().fail_delete = fail_delete;
    }

    pub fn set_list_error(&self, list_error: Option<&str>) {
        self.inner.lock().list_error = list_error.map(str::to_string);
    }

    /// Make every listing call return `token` as its next token.
    pub fn set_repeat_token(&self, token: Option<&str>) {
        self.inner.lock().repeat_token = token.map(str::to_string);
    }
}

impl<R> ResourceApi<R> for MemoryBackend<R>
where
    R: TableResource<Key = String>,
    R::State: Default,
{
    type Error = String;

    async fn list(
        &self,
        _network_id: &str,
        page_size: usize,
        page_token: &str,
    ) -> Result<ListPage<String, R::Record>, String> {
        let mut inner = self.inner.lock();
        inner.list_calls.push(page_token.to_string());
        if let Some(message) = inner.list_error.clone() {
            return Err(message);
        }
        let mut remaining = inner
            .records
            .range(page_token.to_string()..)
            .map(|(key, record)| (key.clone(), record.clone()));
        let records = remaining.by_ref().take(page_size).collect::<Vec<_>>();
        let next_page_token = match &inner.repeat_token {
            Some(token) => token.clone(),
            None => remaining.next().map(|(key, _)| key).unwrap_or_default(),
        };
        Ok(ListPage {
            records,
            next_page_token,
        })
    }

    async fn get_state(&self, _network_id: &str, key: &String) -> Result<R::State, String> {
        let (delay_ms, outcome) = {
            let mut inner = self.inner.lock();
            inner.state_calls.push(key.clone());
            let default_delay_ms = inner.state_delay_ms;
            let (delay_ms, state) = inner
                .state_scripts
                .get_mut(key)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| (default_delay_ms, R::State::default()));
            let outcome = if inner.fail_state.contains(key) {
                Err(format!("no state for {key}"))
            } else {
                Ok(state)
            };
            (delay_ms, outcome)
        };
        if delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
        }
        outcome
    }

    async fn create(&self, _network_id: &str, key: &String, record: &R::Record) -> Result<(), String> {
        let mut inner = self.inner.lock();
        if inner.records.contains_key(key) {
            return Err(format!("{key} already exists"));
        }
        inner.records.insert(key.clone(), record.clone());
        Ok(())
    }

    async fn update(&self, _network_id: &str, key: &String, record: &R::Record) -> Result<(), String> {
        let mut inner = self.inner.lock();
        match inner.records.get_mut(key) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(format!("{key} not found")),
        }
    }

    async fn delete(&self, _network_id: &str, key: &String) -> Result<(), String> {
        let mut inner = self.inner.lock();
        if inner.fail_delete {
            return Err("delete rejected".to_string());
        }
        inner
            .records
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| format!("{key} not found"))
    }
}
