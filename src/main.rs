//! # ratesync Main Entry Point
//!
//! Wires configuration, telemetry, the database pool, and the sync
//! components together, then runs the daily scheduler until ctrl-c.

use std::sync::Arc;

use anyhow::Context;
use migration::{Migrator, MigratorTrait};
use tokio_util::sync::CancellationToken;
use tracing::info;

use ratesync::config::ConfigLoader;
use ratesync::crypto::CredentialVault;
use ratesync::db;
use ratesync::fixing::FixingPipeline;
use ratesync::ledger::HttpLedgerClient;
use ratesync::oauth::{IdentityClient, TokenLifecycle};
use ratesync::orchestrator::SyncOrchestrator;
use ratesync::repositories::{DeliveryRepository, RateRepository, TenantRepository};
use ratesync::scheduler::DailyScheduler;
use ratesync::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::new().load()?;
    telemetry::init_tracing(&config)?;

    info!(profile = %config.profile, "starting ratesync");
    if let Ok(redacted) = config.redacted_json() {
        info!(config = %redacted, "loaded configuration");
    }

    let db = Arc::new(db::init_pool(&config).await?);
    Migrator::up(db.as_ref(), None)
        .await
        .context("failed to apply database migrations")?;

    let secret = config
        .crypto_secret
        .as_deref()
        .context("crypto secret missing after validation")?;
    let vault = CredentialVault::from_secret(secret);

    let rates = RateRepository::new(db.clone());
    let tenants = TenantRepository::new(db.clone(), vault.clone());
    let deliveries = DeliveryRepository::new(db.clone());

    let identity = IdentityClient::new(&config.identity)?;
    let lifecycle = TokenLifecycle::new(
        tenants.clone(),
        identity,
        config.sync.token_safety_window_seconds,
    );
    let ledger = Arc::new(HttpLedgerClient::new(&config.ledger)?);

    let pipeline = FixingPipeline::new(
        config.fixing.url.clone(),
        std::time::Duration::from_secs(config.fixing.timeout_seconds),
        config.fixing.max_attempts,
        config.fixing.backoff_base_ms,
    )?;

    let orchestrator = Arc::new(SyncOrchestrator::new(
        pipeline,
        rates,
        tenants,
        deliveries,
        lifecycle,
        ledger,
        config.sync.tenant_concurrency,
    ));

    let scheduler = DailyScheduler::new(orchestrator, config.sync.schedule_time()?);

    let shutdown = CancellationToken::new();
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    shutdown.cancel();
    scheduler_handle
        .await
        .context("scheduler task terminated abnormally")?;

    Ok(())
}
