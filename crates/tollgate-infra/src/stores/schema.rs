//! Static schema descriptor for the counter table.
//!
//! The engine never executes DDL; the migration app consumes these idents to
//! declare the table to the external migration system.

use sea_orm::DeriveIden;

pub use tollgate_core::settings::DEFAULT_DB_TABLE;

/// Idents of the counter table and its columns.
///
/// `Table` renders as the default table name; deployments overriding
/// `RATE_LIMIT_DB_TABLE` own the corresponding rename in their own
/// migrations.
#[derive(DeriveIden)]
pub enum RateLimitCounters {
    Table,
    Id,
    /// Key dimension this counter tracks, e.g. `ip`.
    KeyName,
    /// Concrete key value, e.g. the client address.
    KeyValue,
    /// Sanitized route path, or `_default_` for the global policy.
    Path,
    /// Unix timestamp at which the window closes.
    Expires,
    /// Requests counted so far in the window.
    Current,
    /// Fixture rows that cleanup spares unless `exclude_tests` is set.
    TestData,
}
