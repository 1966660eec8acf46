//! # Tollgate Infrastructure
//!
//! Concrete implementations of the ports defined in `tollgate-core`:
//! the file-backed and table-backed counter stores, database connection
//! management, and the counter table schema descriptor consumed by the
//! migration tool.

pub mod database;
pub mod stores;

pub use database::DatabaseConfig;
pub use stores::{FileCounterStore, TableCounterStore};
