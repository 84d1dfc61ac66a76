//! ExchangeRate entity model
//!
//! This module contains the SeaORM entity model for the exchange_rates table,
//! which stores one fixing rate per (currency, date).

use rust_decimal::Decimal;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Stored fixing rate for a single currency on a single date
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "exchange_rates")]
pub struct Model {
    /// Unique identifier for the rate row (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// ISO 4217 currency code (unique together with rate_date)
    pub currency_code: String,

    /// Currency label as published by the source (e.g. "Dollar Amerikan")
    pub localized_name: String,

    /// Canonical English currency name, when resolved
    pub canonical_name: Option<String>,

    /// Fixing mid-rate in home-currency terms per `unit_multiplier` units
    #[sea_orm(column_type = "Decimal(Some((18, 6)))")]
    pub rate: Decimal,

    /// Effective date of the fixing
    pub rate_date: Date,

    /// Units of foreign currency the rate is quoted per (1 or 100)
    pub unit_multiplier: i32,

    /// Source identifier for the snapshot this row came from
    pub source: String,

    /// Timestamp when the page was scraped
    pub scraped_at: DateTimeWithTimeZone,

    /// Timestamp when the row was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the row was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
