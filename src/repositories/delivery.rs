//! Delivery record repository
//!
//! Tracks the outcome of delivering each (tenant, currency, date) triple to
//! the external ledger. The unique triple constraint plus upsert-in-place is
//! what makes re-running a sync idempotent instead of duplicating entries.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};
use uuid::Uuid;

use super::RepositoryError;
use crate::models::delivery_record::{self, Entity as DeliveryRecord, status};

/// Outcome fields for one delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryOutcomeRecord {
    pub tenant_id: Uuid,
    pub currency_code: String,
    pub rate_date: NaiveDate,
    pub rate: Decimal,
    pub status: &'static str,
    pub sync_token: Option<String>,
    pub error: Option<String>,
}

/// Repository for delivery-record database operations
#[derive(Clone)]
pub struct DeliveryRepository {
    db: Arc<DatabaseConnection>,
}

impl DeliveryRepository {
    /// Creates a new DeliveryRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Insert or update the record for the outcome's (tenant, currency, date)
    /// triple.
    pub async fn record_outcome(
        &self,
        outcome: DeliveryOutcomeRecord,
    ) -> Result<delivery_record::Model, RepositoryError> {
        let now = Utc::now();
        let existing = self
            .find(outcome.tenant_id, &outcome.currency_code, outcome.rate_date)
            .await?;

        let model = match existing {
            Some(record) => {
                let mut active = record.into_active_model();
                active.status = Set(outcome.status.to_string());
                active.rate = Set(outcome.rate);
                active.sync_token = Set(outcome.sync_token);
                active.error = Set(outcome.error);
                active.synced_at = Set(now.into());
                active.updated_at = Set(now.into());
                active.update(self.db.as_ref()).await?
            }
            None => {
                let active = delivery_record::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    tenant_id: Set(outcome.tenant_id),
                    currency_code: Set(outcome.currency_code.clone()),
                    rate_date: Set(outcome.rate_date),
                    status: Set(outcome.status.to_string()),
                    rate: Set(outcome.rate),
                    sync_token: Set(outcome.sync_token),
                    error: Set(outcome.error),
                    synced_at: Set(now.into()),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                };
                active.insert(self.db.as_ref()).await?
            }
        };

        Ok(model)
    }

    /// Find the record for one (tenant, currency, date) triple.
    pub async fn find(
        &self,
        tenant_id: Uuid,
        currency_code: &str,
        rate_date: NaiveDate,
    ) -> Result<Option<delivery_record::Model>, RepositoryError> {
        Ok(DeliveryRecord::find()
            .filter(delivery_record::Column::TenantId.eq(tenant_id))
            .filter(delivery_record::Column::CurrencyCode.eq(currency_code))
            .filter(delivery_record::Column::RateDate.eq(rate_date))
            .one(self.db.as_ref())
            .await?)
    }

    /// Currency codes already successfully delivered to a tenant for a date.
    pub async fn delivered_codes(
        &self,
        tenant_id: Uuid,
        rate_date: NaiveDate,
    ) -> Result<HashSet<String>, RepositoryError> {
        let records = DeliveryRecord::find()
            .filter(delivery_record::Column::TenantId.eq(tenant_id))
            .filter(delivery_record::Column::RateDate.eq(rate_date))
            .filter(delivery_record::Column::Status.eq(status::SUCCESS))
            .all(self.db.as_ref())
            .await?;

        Ok(records.into_iter().map(|r| r.currency_code).collect())
    }

    /// All records for a tenant and date, regardless of status.
    pub async fn for_tenant_date(
        &self,
        tenant_id: Uuid,
        rate_date: NaiveDate,
    ) -> Result<Vec<delivery_record::Model>, RepositoryError> {
        Ok(DeliveryRecord::find()
            .filter(delivery_record::Column::TenantId.eq(tenant_id))
            .filter(delivery_record::Column::RateDate.eq(rate_date))
            .all(self.db.as_ref())
            .await?)
    }
}
