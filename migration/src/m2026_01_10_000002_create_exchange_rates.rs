//! Migration to create the exchange_rates table.
//!
//! One row per (currency, fixing date). The unique index is what makes the
//! store's three-way upsert safe to re-run against the same scrape.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ExchangeRates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExchangeRates::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ExchangeRates::CurrencyCode)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExchangeRates::LocalizedName)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ExchangeRates::CanonicalName).text().null())
                    .col(
                        ColumnDef::new(ExchangeRates::Rate)
                            .decimal_len(18, 6)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ExchangeRates::RateDate).date().not_null())
                    .col(
                        ColumnDef::new(ExchangeRates::UnitMultiplier)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(ExchangeRates::Source).text().not_null())
                    .col(
                        ColumnDef::new(ExchangeRates::ScrapedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExchangeRates::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ExchangeRates::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_exchange_rates_currency_date")
                    .table(ExchangeRates::Table)
                    .col(ExchangeRates::CurrencyCode)
                    .col(ExchangeRates::RateDate)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_exchange_rates_date")
                    .table(ExchangeRates::Table)
                    .col(ExchangeRates::RateDate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_exchange_rates_currency_date")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_exchange_rates_date").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ExchangeRates::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ExchangeRates {
    Table,
    Id,
    CurrencyCode,
    LocalizedName,
    CanonicalName,
    Rate,
    RateDate,
    UnitMultiplier,
    Source,
    ScrapedAt,
    CreatedAt,
    UpdatedAt,
}
