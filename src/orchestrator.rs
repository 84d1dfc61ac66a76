//! # Sync Orchestrator
//!
//! Top-level control loop for one sync run: acquire the current snapshot,
//! persist it, then drive delivery across all eligible tenants. Tenants are
//! processed concurrently up to a bounded worker count and are fully isolated
//! from each other; currencies within one tenant stay sequential so writes
//! never race the ledger's optimistic concurrency on the same record.
//! Overlapping runs are prevented with an atomic run-in-progress guard shared
//! by the scheduler and manual triggers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::fixing::{FixingError, FixingPipeline, RateSnapshot};
use crate::ledger::{LedgerApi, LedgerError, TenantContext};
use crate::models::delivery_record::status;
use crate::models::exchange_rate;
use crate::models::tenant;
use crate::oauth::{TokenLifecycle, TokenState};
use crate::repositories::delivery::DeliveryOutcomeRecord;
use crate::repositories::{DeliveryRepository, RateRepository, RepositoryError, TenantRepository};

/// Aggregated result of one sync run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub snapshot_date: Option<NaiveDate>,
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub per_tenant: Vec<TenantReport>,
}

/// Per-tenant slice of the run report.
#[derive(Debug, Clone, Serialize)]
pub struct TenantReport {
    pub tenant_id: Uuid,
    pub realm_id: Option<String>,
    pub success: bool,
    pub rates_synced: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Read-only per-tenant status view.
#[derive(Debug, Clone, Serialize)]
pub struct TenantStatus {
    pub tenant_id: Uuid,
    pub last_sync: Option<DateTime<Utc>>,
    pub token_expired: bool,
    pub sync_enabled: bool,
}

/// Run-fatal failures. Everything tenant- or currency-scoped is reported
/// inside [`RunReport`] instead.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("a sync run is already in progress")]
    AlreadyRunning,
    #[error(transparent)]
    Fixing(#[from] FixingError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Orchestrates snapshot acquisition and multi-tenant delivery.
#[derive(Clone)]
pub struct SyncOrchestrator {
    pipeline: FixingPipeline,
    rates: RateRepository,
    tenants: TenantRepository,
    deliveries: DeliveryRepository,
    lifecycle: TokenLifecycle,
    ledger: Arc<dyn LedgerApi>,
    tenant_concurrency: usize,
    running: Arc<AtomicBool>,
}

impl SyncOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pipeline: FixingPipeline,
        rates: RateRepository,
        tenants: TenantRepository,
        deliveries: DeliveryRepository,
        lifecycle: TokenLifecycle,
        ledger: Arc<dyn LedgerApi>,
        tenant_concurrency: u32,
    ) -> Self {
        Self {
            pipeline,
            rates,
            tenants,
            deliveries,
            lifecycle,
            ledger,
            tenant_concurrency: tenant_concurrency.max(1) as usize,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Execute one full sync run. Fails fast when a run is already in flight;
    /// snapshot failures abort before any tenant is contacted.
    #[instrument(skip_all)]
    pub async fn run_now(&self) -> Result<RunReport, RunError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("sync run requested while another run is in progress");
            return Err(RunError::AlreadyRunning);
        }
        let _release = scopeguard::guard(self.running.clone(), |flag| {
            flag.store(false, Ordering::SeqCst);
        });

        let run_started = std::time::Instant::now();
        counter!("sync_runs_total").increment(1);

        let snapshot = match self.pipeline.fetch_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(error = %err, "snapshot acquisition failed, aborting run");
                counter!("sync_run_failures_total").increment(1);
                self.rates
                    .record_scrape(false, 0, None, None, Some(err.to_string()))
                    .await?;
                return Err(err.into());
            }
        };

        let stats = self.rates.upsert_snapshot(&snapshot).await?;
        self.rates
            .record_scrape(
                true,
                snapshot.rates.len(),
                Some(stats),
                snapshot.published_at,
                None,
            )
            .await?;

        let eligible = self.tenants.sync_eligible().await?;
        info!(
            snapshot_date = %snapshot.as_of_date,
            rates = snapshot.rates.len(),
            tenants = eligible.len(),
            "starting tenant fan-out"
        );

        let snapshot = Arc::new(snapshot);
        let semaphore = Arc::new(Semaphore::new(self.tenant_concurrency));
        let mut handles = Vec::with_capacity(eligible.len());

        for tenant in eligible {
            let orchestrator = self.clone();
            let snapshot = snapshot.clone();
            let semaphore = semaphore.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");
                orchestrator.sync_tenant(tenant, &snapshot).await
            }));
        }

        let mut per_tenant = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(report) => per_tenant.push(report),
                Err(join_err) => {
                    // A panicked tenant task is isolated like any other
                    // per-tenant failure; the run itself continues.
                    error!(error = %join_err, "tenant sync task aborted");
                }
            }
        }

        let succeeded = per_tenant.iter().filter(|r| r.success).count();
        histogram!("sync_run_duration_ms").record(run_started.elapsed().as_secs_f64() * 1_000.0);
        info!(
            snapshot_date = %snapshot.as_of_date,
            tenants = per_tenant.len(),
            succeeded,
            "sync run completed"
        );

        Ok(RunReport {
            snapshot_date: Some(snapshot.as_of_date),
            new: stats.new,
            updated: stats.updated,
            unchanged: stats.unchanged,
            per_tenant,
        })
    }

    /// Sync one tenant against the snapshot. Never propagates an error; every
    /// failure becomes part of the tenant's report entry.
    #[instrument(skip_all, fields(tenant_id = %tenant.id))]
    async fn sync_tenant(&self, tenant: tenant::Model, snapshot: &RateSnapshot) -> TenantReport {
        let tenant_id = tenant.id;
        let realm_id = tenant.realm_id.clone();

        let failure = |error: String| TenantReport {
            tenant_id,
            realm_id: realm_id.clone(),
            success: false,
            rates_synced: 0,
            error: Some(error),
        };

        // Phase one: credential state transition only.
        let tenant = match self.lifecycle.ensure_valid(&tenant).await {
            Ok(tenant) => tenant,
            Err(err) => {
                counter!("sync_tenant_skipped_total").increment(1);
                warn!(tenant_id = %tenant_id, error = %err, "skipping tenant, token not usable");
                return failure(format!("token refresh failed: {}", err));
            }
        };

        let Some(realm) = tenant.realm_id.clone() else {
            return failure("tenant has no ledger realm bound".to_string());
        };

        let tokens = match self.tenants.decrypt_tokens(&tenant).await {
            Ok(tokens) => tokens,
            Err(err) => {
                warn!(tenant_id = %tenant_id, error = %err, "cannot decrypt tenant credentials");
                return failure(format!("credential decryption failed: {}", err));
            }
        };

        let due = match self
            .rates
            .rates_needing_sync(tenant_id, snapshot.as_of_date)
            .await
        {
            Ok(due) => due,
            Err(err) => return failure(format!("failed to load rates needing sync: {}", err)),
        };

        // The ledger rejects self-referential rates, so the tenant's home
        // currency is filtered before any delivery attempt.
        let due: Vec<exchange_rate::Model> = due
            .into_iter()
            .filter(|rate| rate.currency_code != tenant.home_currency)
            .collect();

        let mut ctx = TenantContext {
            realm_id: realm,
            access_token: tokens.access_token,
            sandbox: tenant.is_sandbox,
        };

        // Phase two: sequential delivery of this tenant's currencies.
        let mut synced = 0usize;
        let mut errors: Vec<String> = Vec::new();

        for rate in &due {
            match self.deliver_with_retry(&tenant, &mut ctx, rate, snapshot.as_of_date).await {
                Ok(sync_token) => {
                    synced += 1;
                    self.record_delivery(tenant_id, rate, snapshot.as_of_date, status::SUCCESS, Some(sync_token), None)
                        .await;
                }
                Err(err) => {
                    let message = format!("{}: {}", rate.currency_code, err);
                    warn!(tenant_id = %tenant_id, error = %message, "rate delivery failed");
                    errors.push(message);
                    self.record_delivery(
                        tenant_id,
                        rate,
                        snapshot.as_of_date,
                        status::FAILED,
                        None,
                        Some(err.to_string()),
                    )
                    .await;
                }
            }
        }

        counter!("rates_delivered_total").increment(synced as u64);

        if errors.is_empty() {
            if let Err(err) = self.tenants.mark_synced(tenant_id, Utc::now()).await {
                warn!(tenant_id = %tenant_id, error = %err, "failed to stamp last sync");
            }
            TenantReport {
                tenant_id,
                realm_id: tenant.realm_id.clone(),
                success: true,
                rates_synced: synced,
                error: None,
            }
        } else {
            TenantReport {
                tenant_id,
                realm_id: tenant.realm_id.clone(),
                success: false,
                rates_synced: synced,
                error: Some(errors.join("; ")),
            }
        }
    }

    /// Deliver one rate, allowing exactly one token-refresh-and-retry when
    /// the ledger rejects the bearer token mid-run.
    async fn deliver_with_retry(
        &self,
        tenant: &tenant::Model,
        ctx: &mut TenantContext,
        rate: &exchange_rate::Model,
        as_of_date: NaiveDate,
    ) -> Result<String, LedgerError> {
        let first = self
            .ledger
            .deliver(
                ctx,
                &rate.currency_code,
                &tenant.home_currency,
                rate.rate,
                as_of_date,
            )
            .await;

        match first {
            Ok(outcome) => Ok(outcome.sync_token().to_string()),
            Err(LedgerError::Unauthorized) => {
                info!(
                    tenant_id = %tenant.id,
                    currency = %rate.currency_code,
                    "ledger rejected token, refreshing once and retrying"
                );

                let refreshed = self
                    .lifecycle
                    .refresh(tenant)
                    .await
                    .map_err(|err| LedgerError::Network(format!("token refresh failed: {}", err)))?;
                let tokens = self
                    .tenants
                    .decrypt_tokens(&refreshed)
                    .await
                    .map_err(|err| LedgerError::Network(format!("credential decryption failed: {}", err)))?;
                ctx.access_token = tokens.access_token;

                self.ledger
                    .deliver(
                        ctx,
                        &rate.currency_code,
                        &tenant.home_currency,
                        rate.rate,
                        as_of_date,
                    )
                    .await
                    .map(|outcome| outcome.sync_token().to_string())
            }
            Err(err) => Err(err),
        }
    }

    async fn record_delivery(
        &self,
        tenant_id: Uuid,
        rate: &exchange_rate::Model,
        as_of_date: NaiveDate,
        status: &'static str,
        sync_token: Option<String>,
        error: Option<String>,
    ) {
        let outcome = DeliveryOutcomeRecord {
            tenant_id,
            currency_code: rate.currency_code.clone(),
            rate_date: as_of_date,
            rate: rate.rate,
            status,
            sync_token,
            error,
        };

        if let Err(err) = self.deliveries.record_outcome(outcome).await {
            error!(
                tenant_id = %tenant_id,
                currency = %rate.currency_code,
                error = %err,
                "failed to persist delivery record"
            );
        }
    }

    /// Read-only status view for one tenant.
    pub async fn tenant_status(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<TenantStatus>, RepositoryError> {
        let Some(tenant) = self.tenants.get(tenant_id).await? else {
            return Ok(None);
        };

        let token_expired = matches!(
            self.lifecycle.token_state(&tenant, Utc::now()),
            TokenState::Expired
        );

        Ok(Some(TenantStatus {
            tenant_id: tenant.id,
            last_sync: tenant.last_synced_at.map(|dt| dt.with_timezone(&Utc)),
            token_expired,
            sync_enabled: tenant.sync_enabled,
        }))
    }
}
