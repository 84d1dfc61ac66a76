//! Migration to create the delivery_records table.
//!
//! Bookkeeping for ledger delivery idempotence: at most one row per
//! (tenant, currency, date), holding the outcome and the last version token
//! observed from the external ledger.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeliveryRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeliveryRecords::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DeliveryRecords::TenantId).uuid().not_null())
                    .col(
                        ColumnDef::new(DeliveryRecords::CurrencyCode)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeliveryRecords::RateDate).date().not_null())
                    .col(
                        ColumnDef::new(DeliveryRecords::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(DeliveryRecords::Rate)
                            .decimal_len(18, 6)
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeliveryRecords::SyncToken).text().null())
                    .col(ColumnDef::new(DeliveryRecords::Error).text().null())
                    .col(
                        ColumnDef::new(DeliveryRecords::SyncedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryRecords::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(DeliveryRecords::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_delivery_records_tenant_id")
                            .from(DeliveryRecords::Table, DeliveryRecords::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_delivery_records_tenant_currency_date")
                    .table(DeliveryRecords::Table)
                    .col(DeliveryRecords::TenantId)
                    .col(DeliveryRecords::CurrencyCode)
                    .col(DeliveryRecords::RateDate)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_delivery_records_tenant_date")
                    .table(DeliveryRecords::Table)
                    .col(DeliveryRecords::TenantId)
                    .col(DeliveryRecords::RateDate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_delivery_records_tenant_currency_date")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_delivery_records_tenant_date")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(DeliveryRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DeliveryRecords {
    Table,
    Id,
    TenantId,
    CurrencyCode,
    RateDate,
    Status,
    Rate,
    SyncToken,
    Error,
    SyncedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}
