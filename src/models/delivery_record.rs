//! DeliveryRecord entity model
//!
//! This module contains the SeaORM entity model for the delivery_records
//! table, which tracks the outcome of delivering one currency rate to one
//! tenant's ledger for one fixing date. At most one success row exists per
//! (tenant, currency, date); re-runs update in place.

use rust_decimal::Decimal;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Delivery outcome for one (tenant, currency, date) triple
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "delivery_records")]
pub struct Model {
    /// Unique identifier for the record (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Tenant the rate was delivered to
    pub tenant_id: Uuid,

    /// ISO 4217 source currency code
    pub currency_code: String,

    /// Fixing date the delivery refers to
    pub rate_date: Date,

    /// Delivery status (pending|success|failed)
    pub status: String,

    /// The rate value that was delivered
    #[sea_orm(column_type = "Decimal(Some((18, 6)))")]
    pub rate: Decimal,

    /// Last version token observed from the external ledger
    pub sync_token: Option<String>,

    /// Human-readable error detail for failed deliveries
    pub error: Option<String>,

    /// Timestamp of the last delivery attempt
    pub synced_at: DateTimeWithTimeZone,

    /// Timestamp when the record was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the record was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id"
    )]
    Tenant,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Delivery status values stored in `delivery_records.status`.
pub mod status {
    pub const PENDING: &str = "pending";
    pub const SUCCESS: &str = "success";
    pub const FAILED: &str = "failed";
}
