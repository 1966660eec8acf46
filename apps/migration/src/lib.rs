//! Schema migrations for the Tollgate counter table.
//!
//! The engine only declares its schema; all DDL runs through this tool.

pub use sea_orm_migration::prelude::*;

mod m20260801_000001_create_rate_limit_counters;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(
            m20260801_000001_create_rate_limit_counters::Migration,
        )]
    }
}
