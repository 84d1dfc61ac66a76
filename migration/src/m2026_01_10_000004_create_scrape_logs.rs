//! Migration to create the scrape_logs table.
//!
//! One row per pipeline run, recording what the upstream page yielded and how
//! the store changed. Useful for spotting weekends/holidays where the fixing
//! was not republished.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ScrapeLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScrapeLogs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ScrapeLogs::ScrapedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ScrapeLogs::Success).boolean().not_null())
                    .col(
                        ColumnDef::new(ScrapeLogs::RatesFound)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ScrapeLogs::RatesNew)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ScrapeLogs::RatesUpdated)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ScrapeLogs::RatesUnchanged)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ScrapeLogs::SourcePublishedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(ScrapeLogs::Error).text().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_scrape_logs_scraped_at")
                    .table(ScrapeLogs::Table)
                    .col(ScrapeLogs::ScrapedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_scrape_logs_scraped_at").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ScrapeLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ScrapeLogs {
    Table,
    Id,
    ScrapedAt,
    Success,
    RatesFound,
    RatesNew,
    RatesUpdated,
    RatesUnchanged,
    SourcePublishedAt,
    Error,
}
