//! Table-backed counter store (SeaORM).

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use sea_orm::sea_query::{Alias, Expr, OnConflict, Query};
use sea_orm::{ConnectionTrait, DbConn, Statement};
use tracing::debug;

use tollgate_core::ports::{CounterKey, CounterStore, CounterWindow, StoreError};

use super::schema::RateLimitCounters;

/// Counter store keeping one row per counter in a relational table.
///
/// The table name is configurable at runtime, so statements are built with
/// sea-query against a dynamic ident rather than a derived entity. Every
/// operation is guarded by a table-existence check: an unmigrated schema
/// downgrades to "limiting unavailable" instead of failing requests.
///
/// `save` is an atomic upsert against the unique `(key_name, key_value,
/// path)` index the migration declares, so concurrent requests race on one
/// row instead of inserting duplicates; a stale expired row is simply
/// overwritten by the next window.
pub struct TableCounterStore {
    db: DbConn,
    table: String,
    /// When set, expired fixture rows (`test_data = true`) survive sweeps.
    preserve_test_rows: bool,
    table_seen: AtomicBool,
}

impl TableCounterStore {
    pub fn new(db: DbConn, table: impl Into<String>, preserve_test_rows: bool) -> Self {
        Self {
            db,
            table: table.into(),
            preserve_test_rows,
            table_seen: AtomicBool::new(false),
        }
    }

    fn table_ident(&self) -> Alias {
        Alias::new(&self.table)
    }

    /// The schema may not be migrated yet. A positive answer is cached;
    /// tables do not disappear under a running service.
    async fn table_exists(&self) -> Result<bool, StoreError> {
        if self.table_seen.load(Ordering::Relaxed) {
            return Ok(true);
        }

        let stmt = Statement::from_sql_and_values(
            self.db.get_database_backend(),
            r#"SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = $1) AS "present""#,
            [self.table.clone().into()],
        );
        let row = self
            .db
            .query_one(stmt)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let present = match row {
            Some(row) => row
                .try_get::<bool>("", "present")
                .map_err(|e| StoreError::Query(e.to_string()))?,
            None => false,
        };

        if present {
            self.table_seen.store(true, Ordering::Relaxed);
        }
        Ok(present)
    }

    async fn guard_table(&self) -> Result<(), StoreError> {
        if self.table_exists().await? {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!(
                "table '{}' is not migrated",
                self.table
            )))
        }
    }
}

#[async_trait]
impl CounterStore for TableCounterStore {
    async fn find_active(
        &self,
        key: &CounterKey,
        now: i64,
    ) -> Result<Option<CounterWindow>, StoreError> {
        self.guard_table().await?;

        let stmt = Query::select()
            .columns([RateLimitCounters::Current, RateLimitCounters::Expires])
            .from(self.table_ident())
            .and_where(Expr::col(RateLimitCounters::KeyName).eq(key.key_type.as_str()))
            .and_where(Expr::col(RateLimitCounters::KeyValue).eq(key.key_value.as_str()))
            .and_where(Expr::col(RateLimitCounters::Path).eq(key.path.as_str()))
            .and_where(Expr::col(RateLimitCounters::Expires).gt(now))
            .limit(1)
            .to_owned();

        let backend = self.db.get_database_backend();
        let row = self
            .db
            .query_one(backend.build(&stmt))
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let current = row
                    .try_get::<i64>("", "current")
                    .map_err(|e| StoreError::Query(e.to_string()))?;
                let expires = row
                    .try_get::<i64>("", "expires")
                    .map_err(|e| StoreError::Query(e.to_string()))?;
                Ok(Some(CounterWindow { expires, current }))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, key: &CounterKey, window: &CounterWindow) -> Result<(), StoreError> {
        self.guard_table().await?;

        let stmt = Query::insert()
            .into_table(self.table_ident())
            .columns([
                RateLimitCounters::KeyName,
                RateLimitCounters::KeyValue,
                RateLimitCounters::Path,
                RateLimitCounters::Expires,
                RateLimitCounters::Current,
            ])
            .values_panic([
                Expr::value(key.key_type.as_str()),
                Expr::value(key.key_value.as_str()),
                Expr::value(key.path.as_str()),
                Expr::value(window.expires),
                Expr::value(window.current),
            ])
            .on_conflict(
                OnConflict::columns([
                    RateLimitCounters::KeyName,
                    RateLimitCounters::KeyValue,
                    RateLimitCounters::Path,
                ])
                .update_columns([RateLimitCounters::Expires, RateLimitCounters::Current])
                .to_owned(),
            )
            .to_owned();

        let backend = self.db.get_database_backend();
        self.db
            .execute(backend.build(&stmt))
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn purge_expired(&self, now: i64) -> Result<u64, StoreError> {
        if !self.table_exists().await? {
            // Nothing to sweep until the schema is migrated.
            debug!(table = %self.table, "counter table not migrated, skipping sweep");
            return Ok(0);
        }

        let mut stmt = Query::delete()
            .from_table(self.table_ident())
            .and_where(Expr::col(RateLimitCounters::Expires).lte(now))
            .to_owned();
        if self.preserve_test_rows {
            stmt.and_where(Expr::col(RateLimitCounters::TestData).eq(false));
        }

        let backend = self.db.get_database_backend();
        let result = self
            .db
            .execute(backend.build(&stmt))
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};
    use std::collections::BTreeMap;

    fn existence_row(present: bool) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([("present", present.into())])
    }

    fn counter_row(current: i64, expires: i64) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([("current", current.into()), ("expires", expires.into())])
    }

    fn key() -> CounterKey {
        CounterKey::new("ip", "1.2.3.4", "_api_echo")
    }

    #[tokio::test]
    async fn find_active_reads_the_matching_row() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![existence_row(true)]])
            .append_query_results([vec![counter_row(3, 1060)]])
            .into_connection();
        let store = TableCounterStore::new(db, "rate_limit_counters", true);

        let window = store.find_active(&key(), 1000).await.unwrap().unwrap();
        assert_eq!(
            window,
            CounterWindow {
                expires: 1060,
                current: 3
            }
        );
    }

    #[tokio::test]
    async fn find_active_returns_none_without_a_row() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![existence_row(true)]])
            .append_query_results([Vec::<BTreeMap<&str, Value>>::new()])
            .into_connection();
        let store = TableCounterStore::new(db, "rate_limit_counters", true);

        assert_eq!(store.find_active(&key(), 1000).await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_table_reports_unavailable() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![existence_row(false)]])
            .into_connection();
        let store = TableCounterStore::new(db, "rate_limit_counters", true);

        let result = store.find_active(&key(), 1000).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn existence_check_is_cached_after_first_hit() {
        // Only one existence row is queued; a second check would drain the
        // second counter row instead and fail the type read.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![existence_row(true)]])
            .append_query_results([vec![counter_row(1, 1060)]])
            .append_query_results([vec![counter_row(2, 1060)]])
            .into_connection();
        let store = TableCounterStore::new(db, "rate_limit_counters", true);

        let first = store.find_active(&key(), 1000).await.unwrap().unwrap();
        assert_eq!(first.current, 1);
        let second = store.find_active(&key(), 1000).await.unwrap().unwrap();
        assert_eq!(second.current, 2);
    }

    #[tokio::test]
    async fn save_upserts_the_window() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![existence_row(true)]])
            .append_exec_results([MockExecResult {
                last_insert_id: 1,
                rows_affected: 1,
            }])
            .into_connection();
        let store = TableCounterStore::new(db, "rate_limit_counters", true);

        let window = CounterWindow {
            expires: 1060,
            current: 1,
        };
        store.save(&key(), &window).await.unwrap();
    }

    #[tokio::test]
    async fn purge_skips_silently_when_table_is_missing() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![existence_row(false)]])
            .into_connection();
        let store = TableCounterStore::new(db, "rate_limit_counters", true);

        assert_eq!(store.purge_expired(1000).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn purge_reports_removed_row_count() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![existence_row(true)]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 4,
            }])
            .into_connection();
        let store = TableCounterStore::new(db, "rate_limit_counters", false);

        assert_eq!(store.purge_expired(1000).await.unwrap(), 4);
    }
}
