//! Migration to create the tenants table.
//!
//! A tenant is one external ledger company receiving synced rates. Rows are
//! created in a pending approval state; the realm id and token ciphertexts
//! stay null until the OAuth connect step binds them.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tenants::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Tenants::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Tenants::Name).text().null())
                    .col(ColumnDef::new(Tenants::RealmId).text().null())
                    .col(
                        ColumnDef::new(Tenants::ApprovalStatus)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Tenants::ClientId).text().null())
                    .col(
                        ColumnDef::new(Tenants::ClientSecretCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Tenants::AccessTokenCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Tenants::RefreshTokenCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Tenants::TokenExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Tenants::IsSandbox)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Tenants::IsActive)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Tenants::SyncEnabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Tenants::HomeCurrency)
                            .text()
                            .not_null()
                            .default("ALL"),
                    )
                    .col(
                        ColumnDef::new(Tenants::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Tenants::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Tenants::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Realm ids are unique once bound; null rows (not yet connected) are exempt.
        manager
            .create_index(
                Index::create()
                    .name("idx_tenants_realm_id")
                    .table(Tenants::Table)
                    .col(Tenants::RealmId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_tenants_realm_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Tenants::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
    Name,
    RealmId,
    ApprovalStatus,
    ClientId,
    ClientSecretCiphertext,
    AccessTokenCiphertext,
    RefreshTokenCiphertext,
    TokenExpiresAt,
    IsSandbox,
    IsActive,
    SyncEnabled,
    HomeCurrency,
    LastSyncedAt,
    CreatedAt,
    UpdatedAt,
}
