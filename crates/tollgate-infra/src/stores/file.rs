//! File-backed counter store.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use tollgate_core::ports::{CounterKey, CounterStore, CounterWindow, StoreError};

/// Counter store keeping one file per active counter in a directory.
///
/// Files are named `<key_type>:<key_value>:<path>:<expires>` and contain the
/// decimal running count as their entire content. Stale files are ignored by
/// lookups and removed by the sweep. There is no locking: two concurrent
/// first-requests for the same window can both write, which undercounts by
/// one - accepted best-effort behavior.
pub struct FileCounterStore {
    directory: PathBuf,
}

impl FileCounterStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Create the counter directory on first use. Failure here is fatal for
    /// the calling request.
    async fn ensure_directory(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.directory).await.map_err(|e| {
            StoreError::Io(format!("creating {}: {}", self.directory.display(), e))
        })
    }

    fn file_prefix(key: &CounterKey) -> String {
        format!("{}:{}:{}:", key.key_type, key.key_value, key.path)
    }

    fn file_name(key: &CounterKey, expires: i64) -> String {
        format!(
            "{}:{}:{}:{}",
            key.key_type, key.key_value, key.path, expires
        )
    }
}

/// Expiry timestamp encoded as the final `:`-separated filename field.
fn parse_expiry(file_name: &str) -> Option<i64> {
    file_name.rsplit(':').next()?.parse().ok()
}

#[async_trait]
impl CounterStore for FileCounterStore {
    async fn find_active(
        &self,
        key: &CounterKey,
        now: i64,
    ) -> Result<Option<CounterWindow>, StoreError> {
        let prefix = Self::file_prefix(key);

        let mut entries = match fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            // No directory yet means no counters yet.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(&prefix) {
                continue;
            }

            let Some(expires) = parse_expiry(&name) else {
                continue;
            };
            if expires <= now {
                // Stale window; left for the sweep.
                continue;
            }

            let contents = fs::read_to_string(entry.path()).await.unwrap_or_default();
            let current = contents.trim().parse().unwrap_or(0);
            return Ok(Some(CounterWindow { expires, current }));
        }

        Ok(None)
    }

    async fn save(&self, key: &CounterKey, window: &CounterWindow) -> Result<(), StoreError> {
        self.ensure_directory().await?;

        let path = self.directory.join(Self::file_name(key, window.expires));
        fs::write(&path, window.current.to_string())
            .await
            .map_err(|e| StoreError::Io(format!("writing {}: {}", path.display(), e)))
    }

    async fn purge_expired(&self, now: i64) -> Result<u64, StoreError> {
        let mut entries = match fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let expired = match parse_expiry(&name) {
                Some(expires) => expires <= now,
                // A malformed name cannot belong to an active window.
                None => true,
            };
            if !expired {
                continue;
            }

            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                // Already gone; the next sweep retries anything else.
                Err(e) => debug!(file = %name, error = %e, "skipping counter file during sweep"),
            }
        }

        Ok(removed)
    }
}
