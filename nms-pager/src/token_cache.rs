use crate::{InvalidationPolicy, SyncError};

/// A continuation token learned from the listing endpoint, tagged with the cache generation it was learned in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageToken {
    /// The opaque token, requesting it returns the page after the one it was learned from.
    pub token: String,
    /// The value of [`TokenCache::generation`] when the token was learned.
    pub generation: u64,
}

/// Maps page indices to continuation tokens: slot `p - 1` holds the token requesting page `p`.
///
/// The cache only grows for the lifetime of a table session, slots may be rewritten in place but are never removed.
/// A token value is never held by more than one trusted slot, a suspect slot may briefly share a value with the slot
/// before it until it is re-learned.
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    slots: Vec<PageToken>,
    generation: u64,
    // First slot that may have drifted since the last mutation.
    stale_from: Option<usize>,
    // Page whose fetch came back without a next token.
    last_page: Option<usize>,
}

impl TokenCache {
    /// An empty cache, only page 0 is reachable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tokens learned.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no token has been learned yet.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Bumped on every successful mutation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The learned tokens in page order.
    pub fn slots(&self) -> &[PageToken] {
        &self.slots
    }

    /// The learned token values in page order.
    pub fn tokens(&self) -> Vec<String> {
        self.slots.iter().map(|slot| slot.token.clone()).collect()
    }

    /// The token to request `page` with: empty for page 0, otherwise slot `page - 1`.
    ///
    /// Pages more than one past a known end of the list are rejected like pages whose token was never learned.
    pub fn token_for_page(&self, page: usize) -> Result<&str, SyncError> {
        let out_of_order = SyncError::OutOfOrderPage {
            page,
            known_pages: self.slots.len(),
        };
        if page == 0 {
            return Ok("");
        }
        if self.last_page.is_some_and(|last_page| page > last_page + 1) {
            return Err(out_of_order);
        }
        self.slots
            .get(page - 1)
            .map(|slot| slot.token.as_str())
            .ok_or(out_of_order)
    }

    /// True when `page` directly follows the last page of the list, it is known to be empty.
    pub fn is_past_end(&self, page: usize) -> bool {
        self.last_page
            .is_some_and(|last_page| page == last_page + 1)
    }

    /// True when a previous fetch showed the list ends before `page`.
    pub fn ends_before(&self, page: usize) -> bool {
        self.last_page.is_some_and(|last_page| last_page < page)
    }

    /// The first page that has to be re-fetched before `page` can be trusted, if any.
    ///
    /// Re-walking starts at the page that learned the first suspect token.
    pub fn rewalk_from(&self, page: usize) -> Option<usize> {
        self.stale_from.filter(|stale_from| *stale_from < page)
    }

    /// Record the next token returned while fetching `page`.
    pub fn record_next(&mut self, page: usize, next_token: &str, policy: InvalidationPolicy) {
        if next_token.is_empty() {
            self.last_page = Some(page);
            if self.stale_from.is_some_and(|stale_from| stale_from >= page) {
                // Nothing past the end is reachable anymore.
                self.stale_from = None;
            }
            return;
        }
        if self.last_page.is_some_and(|last_page| last_page <= page) {
            self.last_page = None;
        }

        let existing = self.slots.iter().position(|slot| slot.token == next_token);
        match policy {
            InvalidationPolicy::KeepTokens => {
                if existing.is_none() {
                    self.push(next_token);
                }
            }
            InvalidationPolicy::RefetchAffected => {
                match existing {
                    Some(idx) if idx == page => {
                        self.slots[idx].generation = self.generation;
                    }
                    // The boundary moved onto a value learned for a later page, that slot has drifted too:
                    Some(idx) if idx > page => {
                        self.slots[page] = PageToken {
                            token: next_token.to_string(),
                            generation: self.generation,
                        };
                        let next = page + 1;
                        self.stale_from = Some(
                            self.stale_from
                                .map_or(next, |stale_from| stale_from.min(next)),
                        );
                    }
                    // An earlier page already handed out this value, a backend repeating itself would otherwise loop:
                    Some(_) => {}
                    None if page < self.slots.len() => {
                        self.slots[page] = PageToken {
                            token: next_token.to_string(),
                            generation: self.generation,
                        };
                    }
                    None if page == self.slots.len() => self.push(next_token),
                    None => {
                        tracing::warn!(
                            page,
                            known_pages = self.slots.len(),
                            "next token learned for a page beyond the cache, ignoring"
                        );
                    }
                }
                if self.stale_from == Some(page) {
                    self.stale_from = Some(page + 1).filter(|next| *next < self.slots.len());
                }
            }
        }
    }

    /// Record a successful mutation whose effects start on `from_page`.
    ///
    /// Always bumps the generation, under [`InvalidationPolicy::RefetchAffected`] also marks every token learned from
    /// `from_page` onwards as suspect.
    pub fn mark_mutation(&mut self, from_page: usize, policy: InvalidationPolicy) {
        self.generation += 1;
        self.last_page = None;
        if policy == InvalidationPolicy::RefetchAffected && from_page < self.slots.len() {
            self.stale_from = Some(
                self.stale_from
                    .map_or(from_page, |stale_from| stale_from.min(from_page)),
            );
        }
    }

    /// Record a successful mutation that can't move any page boundary, e.g. an in-place update.
    pub fn bump_generation(&mut self) {
        self.generation += 1;
    }

    fn push(&mut self, token: &str) {
        self.slots.push(PageToken {
            token: token.to_string(),
            generation: self.generation,
        });
    }
}
