use sea_orm_migration::prelude::*;
use tollgate_infra::stores::schema::RateLimitCounters;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RateLimitCounters::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RateLimitCounters::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RateLimitCounters::KeyName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RateLimitCounters::KeyValue)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RateLimitCounters::Path).string().not_null())
                    .col(
                        ColumnDef::new(RateLimitCounters::Expires)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RateLimitCounters::Current)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RateLimitCounters::TestData)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        // One row per key triple; the store's upsert targets this index.
        manager
            .create_index(
                Index::create()
                    .name("uq_rate_limit_counters_key")
                    .table(RateLimitCounters::Table)
                    .col(RateLimitCounters::KeyName)
                    .col(RateLimitCounters::KeyValue)
                    .col(RateLimitCounters::Path)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RateLimitCounters::Table).to_owned())
            .await
    }
}
