//! Test utilities for database-backed tests.
//!
//! Sets up in-memory SQLite databases with migrations applied and provides
//! helpers for driving tenants through the pending → approved → connected
//! lifecycle.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use migration::{Migrator, MigratorTrait};
use rust_decimal::Decimal;
use sea_orm::{Database, DatabaseConnection};

use ratesync::crypto::CredentialVault;
use ratesync::fixing::{CurrencyRate, RateSnapshot};
use ratesync::models::tenant;
use ratesync::repositories::TenantRepository;

#[allow(dead_code)]
pub const TEST_SECRET: &str = "integration-test-secret";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<Arc<DatabaseConnection>> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(Arc::new(db))
}

/// Vault with a fixed test key.
pub fn test_vault() -> CredentialVault {
    CredentialVault::from_secret(TEST_SECRET)
}

/// Credentials used by connected test tenants.
#[allow(dead_code)]
pub struct TestTenantSpec<'a> {
    pub name: &'a str,
    pub realm_id: &'a str,
    pub home_currency: &'a str,
    pub refresh_token: &'a str,
    pub token_expires_at: DateTime<Utc>,
}

impl Default for TestTenantSpec<'_> {
    fn default() -> Self {
        Self {
            name: "Test Tenant",
            realm_id: "realm-1",
            home_currency: "ALL",
            refresh_token: "refresh-token-1",
            token_expires_at: Utc::now() + Duration::hours(1),
        }
    }
}

/// Drive a tenant through registration, approval and OAuth connect.
#[allow(dead_code)]
pub async fn create_connected_tenant(
    repo: &TenantRepository,
    spec: TestTenantSpec<'_>,
) -> Result<tenant::Model> {
    let pending = repo.create_pending(spec.name, spec.home_currency).await?;
    repo.approve(pending.id, "client-id", "client-secret", false)
        .await?;
    let connected = repo
        .connect(
            pending.id,
            spec.realm_id,
            "access-token-1",
            spec.refresh_token,
            spec.token_expires_at,
        )
        .await?;
    Ok(connected)
}

/// Build a snapshot with the given (code, rate) pairs.
#[allow(dead_code)]
pub fn snapshot(as_of_date: NaiveDate, rates: &[(&str, &str)]) -> RateSnapshot {
    RateSnapshot {
        as_of_date,
        rates: rates
            .iter()
            .map(|(code, value)| CurrencyRate {
                currency_code: (*code).to_string(),
                localized_name: (*code).to_string(),
                canonical_name: (*code).to_string(),
                rate: value.parse::<Decimal>().expect("valid decimal"),
                unit_multiplier: 1,
            })
            .collect(),
        source: "Bank of Albania".to_string(),
        scraped_at: Utc::now(),
        published_at: None,
    }
}

/// The fixing date used by the HTML fixtures.
#[allow(dead_code)]
pub fn fixture_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 11, 21).expect("valid date")
}
