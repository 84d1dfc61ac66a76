//! Rate store repository
//!
//! Persists snapshots with upsert-by-(currency, date) semantics. The
//! three-way comparison (insert / update-on-change / no-op) is what keeps a
//! re-run against an unchanged page from looking like fresh data downstream.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, QuerySelect, QueryTrait, Set,
};
use tracing::{debug, info};
use uuid::Uuid;

use super::RepositoryError;
use crate::fixing::RateSnapshot;
use crate::models::delivery_record::{self, Entity as DeliveryRecord};
use crate::models::exchange_rate::{self, Entity as ExchangeRate};
use crate::models::scrape_log;

/// Counters returned by a snapshot upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Repository for exchange-rate and scrape-log database operations
#[derive(Clone)]
pub struct RateRepository {
    db: Arc<DatabaseConnection>,
}

impl RateRepository {
    /// Creates a new RateRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Upsert every rate of a snapshot against the stored state for its date.
    pub async fn upsert_snapshot(
        &self,
        snapshot: &RateSnapshot,
    ) -> Result<UpsertStats, RepositoryError> {
        let mut stats = UpsertStats::default();
        let now = Utc::now();

        for rate in &snapshot.rates {
            let existing = ExchangeRate::find()
                .filter(exchange_rate::Column::CurrencyCode.eq(rate.currency_code.as_str()))
                .filter(exchange_rate::Column::RateDate.eq(snapshot.as_of_date))
                .one(self.db.as_ref())
                .await?;

            match existing {
                None => {
                    let model = exchange_rate::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        currency_code: Set(rate.currency_code.clone()),
                        localized_name: Set(rate.localized_name.clone()),
                        canonical_name: Set(Some(rate.canonical_name.clone())),
                        rate: Set(rate.rate),
                        rate_date: Set(snapshot.as_of_date),
                        unit_multiplier: Set(rate.unit_multiplier),
                        source: Set(snapshot.source.clone()),
                        scraped_at: Set(snapshot.scraped_at.into()),
                        created_at: Set(now.into()),
                        updated_at: Set(now.into()),
                    };
                    model.insert(self.db.as_ref()).await?;
                    stats.new += 1;
                }
                Some(stored) if stored.rate != rate.rate => {
                    debug!(
                        currency = %rate.currency_code,
                        date = %snapshot.as_of_date,
                        old = %stored.rate,
                        new = %rate.rate,
                        "stored rate changed"
                    );
                    let mut active = stored.into_active_model();
                    active.rate = Set(rate.rate);
                    active.localized_name = Set(rate.localized_name.clone());
                    active.canonical_name = Set(Some(rate.canonical_name.clone()));
                    active.unit_multiplier = Set(rate.unit_multiplier);
                    active.scraped_at = Set(snapshot.scraped_at.into());
                    active.updated_at = Set(now.into());
                    active.update(self.db.as_ref()).await?;
                    stats.updated += 1;
                }
                Some(_) => {
                    stats.unchanged += 1;
                }
            }
        }

        info!(
            date = %snapshot.as_of_date,
            new = stats.new,
            updated = stats.updated,
            unchanged = stats.unchanged,
            "persisted rate snapshot"
        );

        Ok(stats)
    }

    /// All stored rates for a fixing date.
    pub async fn rates_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<exchange_rate::Model>, RepositoryError> {
        let rates = ExchangeRate::find()
            .filter(exchange_rate::Column::RateDate.eq(date))
            .order_by_asc(exchange_rate::Column::CurrencyCode)
            .all(self.db.as_ref())
            .await?;
        Ok(rates)
    }

    /// Rates for a date that have not yet been successfully delivered to the
    /// given tenant.
    pub async fn rates_needing_sync(
        &self,
        tenant_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<exchange_rate::Model>, RepositoryError> {
        let delivered = DeliveryRecord::find()
            .select_only()
            .column(delivery_record::Column::CurrencyCode)
            .filter(delivery_record::Column::TenantId.eq(tenant_id))
            .filter(delivery_record::Column::RateDate.eq(date))
            .filter(
                delivery_record::Column::Status.eq(crate::models::delivery_record::status::SUCCESS),
            )
            .into_query();

        let rates = ExchangeRate::find()
            .filter(exchange_rate::Column::RateDate.eq(date))
            .filter(exchange_rate::Column::CurrencyCode.not_in_subquery(delivered))
            .order_by_asc(exchange_rate::Column::CurrencyCode)
            .all(self.db.as_ref())
            .await?;

        Ok(rates)
    }

    /// Record the outcome of one scrape run.
    pub async fn record_scrape(
        &self,
        success: bool,
        rates_found: usize,
        stats: Option<UpsertStats>,
        published_at: Option<DateTime<Utc>>,
        error: Option<String>,
    ) -> Result<(), RepositoryError> {
        let stats = stats.unwrap_or_default();
        let log = scrape_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            scraped_at: Set(Utc::now().into()),
            success: Set(success),
            rates_found: Set(rates_found as i32),
            rates_new: Set(stats.new as i32),
            rates_updated: Set(stats.updated as i32),
            rates_unchanged: Set(stats.unchanged as i32),
            source_published_at: Set(published_at.map(Into::into)),
            error: Set(error),
        };
        log.insert(self.db.as_ref()).await?;
        Ok(())
    }
}
