//! Database connection management.

mod connections;

pub use connections::DatabaseConfig;
