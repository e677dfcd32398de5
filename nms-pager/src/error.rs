use core::fmt;

/// The remote mutation a [`SyncError::Mutation`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// `create(network_id, record)`
    Create,
    /// `update(network_id, key, record)`
    Update,
    /// `delete(network_id, key)`
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Create => write!(f, "create"),
            MutationKind::Update => write!(f, "update"),
            MutationKind::Delete => write!(f, "delete"),
        }
    }
}

/// Errors reported to the rendering layer by [`crate::PaginatedTable`].
///
/// Supplementary state failures never show up here, they only get logged and the row keeps whatever state it had.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The listing call failed.
    #[error("error retrieving page: {message}")]
    Fetch {
        /// The transport/remote message.
        message: String,
    },
    /// The token for the requested page hasn't been learned yet, the pages before it must be fetched first.
    #[error("page {page} requested before its continuation token is known ({known_pages} token(s) cached)")]
    OutOfOrderPage {
        /// The effective (clamped) page index requested.
        page: usize,
        /// Number of tokens held by the cache at the time.
        known_pages: usize,
    },
    /// The remote rejected a create/update/delete. Nothing local was changed.
    #[error("failed to {operation} {key}: {message}")]
    Mutation {
        /// Which mutation failed.
        operation: MutationKind,
        /// The record key.
        key: String,
        /// The transport/remote message.
        message: String,
    },
    /// Page sizes must be positive.
    #[error("invalid page size {0}")]
    InvalidPageSize(usize),
    /// A record failed local validation before being sent.
    #[error("{0}")]
    InvalidRecord(String),
}

impl SyncError {
    pub(crate) fn fetch(message: impl fmt::Display) -> Self {
        Self::Fetch {
            message: message.to_string(),
        }
    }

    pub(crate) fn mutation(
        operation: MutationKind,
        key: &impl fmt::Display,
        message: impl fmt::Display,
    ) -> Self {
        Self::Mutation {
            operation,
            key: key.to_string(),
            message: message.to_string(),
        }
    }
}
