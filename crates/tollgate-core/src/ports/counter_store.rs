use async_trait::async_trait;

/// Identity of one counter: the key dimension being tracked, its concrete
/// value, and the sanitized route path the counter is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub key_type: String,
    pub key_value: String,
    pub path: String,
}

impl CounterKey {
    pub fn new(
        key_type: impl Into<String>,
        key_value: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            key_type: key_type.into(),
            key_value: key_value.into(),
            path: path.into(),
        }
    }
}

/// One counting window for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterWindow {
    /// Unix timestamp at which this window closes.
    pub expires: i64,
    /// Requests counted so far, including none yet for a fresh window.
    pub current: i64,
}

impl CounterWindow {
    /// A fresh window closing at `expires`. The first request counted into
    /// it persists `current = 1`.
    pub fn opening(expires: i64) -> Self {
        Self {
            expires,
            current: 0,
        }
    }

    pub fn is_active(&self, now: i64) -> bool {
        self.expires > now
    }
}

/// Counter store operation errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend cannot serve limits right now (e.g. the counter table has
    /// not been migrated yet). Callers fail open on this variant.
    #[error("counter storage unavailable: {0}")]
    Unavailable(String),

    #[error("I/O failure: {0}")]
    Io(String),

    #[error("query failed: {0}")]
    Query(String),
}

/// Counter store trait - abstraction over persistence backends.
///
/// One record exists per [`CounterKey`]; a record is a [`CounterWindow`].
/// Implementations must ignore expired records on lookup and remove them in
/// [`purge_expired`](CounterStore::purge_expired). The file and table
/// backends in `tollgate-infra` are interchangeable behind this trait.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// The active window for a key, if one exists (`expires > now`).
    async fn find_active(
        &self,
        key: &CounterKey,
        now: i64,
    ) -> Result<Option<CounterWindow>, StoreError>;

    /// Persist the window's running count for a key, replacing any stale
    /// record for the same key.
    async fn save(&self, key: &CounterKey, window: &CounterWindow) -> Result<(), StoreError>;

    /// Remove every record with `expires <= now`. Returns how many were
    /// removed. Failures on individual records are tolerated.
    async fn purge_expired(&self, now: i64) -> Result<u64, StoreError>;
}
