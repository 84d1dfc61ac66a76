//! End-to-end orchestrator tests: scrape a mocked fixing page, fan out to
//! tenants against a mocked ledger and identity provider, and verify the run
//! report, failure isolation, and idempotence.

mod test_utils;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use ratesync::config::{IdentityConfig, LedgerConfig};
use ratesync::fixing::{FixingError, FixingPipeline};
use ratesync::ledger::HttpLedgerClient;
use ratesync::models::scrape_log;
use ratesync::oauth::{IdentityClient, TokenLifecycle};
use ratesync::orchestrator::{RunError, SyncOrchestrator};
use ratesync::repositories::{DeliveryRepository, RateRepository, TenantRepository};

use test_utils::{TestTenantSpec, create_connected_tenant, setup_test_db, test_vault};

const FIXING_PAGE: &str = include_str!("fixtures/fixing_page.html");
const EMPTY_PAGE: &str = include_str!("fixtures/fixing_page_empty.html");
const MALFORMED_PAGE: &str = include_str!("fixtures/fixing_page_malformed_rows.html");

struct Harness {
    db: Arc<DatabaseConnection>,
    tenants: TenantRepository,
    orchestrator: SyncOrchestrator,
}

async fn harness(
    fixing: &MockServer,
    ledger: &MockServer,
    identity: &MockServer,
) -> Result<Harness> {
    let db = setup_test_db().await?;
    let vault = test_vault();

    let tenants = TenantRepository::new(db.clone(), vault);
    let rates = RateRepository::new(db.clone());
    let deliveries = DeliveryRepository::new(db.clone());

    let identity_client = IdentityClient::new(&IdentityConfig {
        token_url: format!("{}/oauth2/v1/tokens/bearer", identity.uri()),
        sandbox_token_url: format!("{}/oauth2/v1/tokens/bearer", identity.uri()),
        timeout_seconds: 5,
    })?;
    let lifecycle = TokenLifecycle::new(tenants.clone(), identity_client, 300);

    let ledger_client = Arc::new(HttpLedgerClient::new(&LedgerConfig {
        api_base: ledger.uri(),
        sandbox_api_base: ledger.uri(),
        timeout_seconds: 5,
    })?);

    let pipeline = FixingPipeline::new(
        format!("{}/fixing", fixing.uri()),
        StdDuration::from_secs(5),
        1,
        10,
    )?;

    let orchestrator = SyncOrchestrator::new(
        pipeline,
        rates,
        tenants.clone(),
        deliveries,
        lifecycle,
        ledger_client,
        4,
    );

    Ok(Harness {
        db,
        tenants,
        orchestrator,
    })
}

async fn mount_fixing_page(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/fixing"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn ledger_rate_body(code: &str, sync_token: &str) -> serde_json::Value {
    json!({
        "ExchangeRate": {
            "SourceCurrencyCode": code,
            "TargetCurrencyCode": "ALL",
            "Rate": "105.50",
            "AsOfDate": "2025-11-21",
            "SyncToken": sync_token
        }
    })
}

/// Mount a ledger that has no stored rates and accepts every create.
async fn mount_empty_ledger(server: &MockServer, realm: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/v3/company/{}/exchangerate", realm)))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/v3/company/{}/exchangerate", realm)))
        .respond_with(ResponseTemplate::new(200).set_body_json(ledger_rate_body("USD", "0")))
        .mount(server)
        .await;
}

fn requests_mentioning(requests: &[Request], needle: &str) -> usize {
    requests
        .iter()
        .filter(|r| {
            r.url.as_str().contains(needle)
                || std::str::from_utf8(&r.body).is_ok_and(|b| b.contains(needle))
        })
        .count()
}

fn fixture_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 11, 21).unwrap()
}

#[tokio::test]
async fn full_run_delivers_foreign_rates_and_reports() -> Result<()> {
    let (fixing, ledger, identity) =
        (MockServer::start().await, MockServer::start().await, MockServer::start().await);
    let h = harness(&fixing, &ledger, &identity).await?;

    mount_fixing_page(&fixing, FIXING_PAGE).await;
    mount_empty_ledger(&ledger, "realm-1").await;

    let tenant = create_connected_tenant(&h.tenants, TestTenantSpec::default()).await?;

    let report = h.orchestrator.run_now().await?;

    assert_eq!(report.snapshot_date, Some(fixture_date()));
    // USD, EUR and the ALL row from the page are all stored.
    assert_eq!((report.new, report.updated, report.unchanged), (3, 0, 0));
    assert_eq!(report.per_tenant.len(), 1);

    let entry = &report.per_tenant[0];
    assert_eq!(entry.tenant_id, tenant.id);
    assert!(entry.success, "unexpected error: {:?}", entry.error);
    // ALL is the tenant's home currency and is never delivered.
    assert_eq!(entry.rates_synced, 2);

    let requests = ledger.received_requests().await.unwrap();
    assert_eq!(requests_mentioning(&requests, "sourcecurrencycode=ALL"), 0);
    assert_eq!(
        requests_mentioning(&requests, "\"SourceCurrencyCode\":\"ALL\""),
        0
    );

    let stored = h.tenants.get(tenant.id).await?.expect("tenant exists");
    assert!(stored.last_synced_at.is_some(), "full success stamps last sync");

    let delivered = DeliveryRepository::new(h.db.clone())
        .delivered_codes(tenant.id, fixture_date())
        .await?;
    assert_eq!(
        delivered,
        ["USD", "EUR"].iter().map(|c| c.to_string()).collect()
    );

    Ok(())
}

#[tokio::test]
async fn second_run_is_idempotent_for_delivered_rates() -> Result<()> {
    let (fixing, ledger, identity) =
        (MockServer::start().await, MockServer::start().await, MockServer::start().await);
    let h = harness(&fixing, &ledger, &identity).await?;

    mount_fixing_page(&fixing, FIXING_PAGE).await;
    mount_empty_ledger(&ledger, "realm-1").await;

    create_connected_tenant(&h.tenants, TestTenantSpec::default()).await?;

    let first = h.orchestrator.run_now().await?;
    assert_eq!(first.per_tenant[0].rates_synced, 2);

    let posts_after_first = ledger
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method == wiremock::http::Method::POST)
        .count();

    let second = h.orchestrator.run_now().await?;
    assert_eq!(
        (second.new, second.updated, second.unchanged),
        (0, 0, 3),
        "unchanged page re-upserts nothing"
    );
    assert!(second.per_tenant[0].success);
    assert_eq!(
        second.per_tenant[0].rates_synced, 0,
        "already-delivered triples are filtered"
    );

    let posts_after_second = ledger
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method == wiremock::http::Method::POST)
        .count();
    assert_eq!(posts_after_first, posts_after_second, "no duplicate creates");

    Ok(())
}

#[tokio::test]
async fn tenant_failures_are_isolated() -> Result<()> {
    let (fixing, ledger, identity) =
        (MockServer::start().await, MockServer::start().await, MockServer::start().await);
    let h = harness(&fixing, &ledger, &identity).await?;

    mount_fixing_page(&fixing, FIXING_PAGE).await;

    // Tenant A: token expired and the identity provider rejects the refresh.
    let tenant_a = create_connected_tenant(
        &h.tenants,
        TestTenantSpec {
            name: "Tenant A",
            realm_id: "realm-a",
            refresh_token: "refresh-a",
            token_expires_at: Utc::now() - Duration::minutes(1),
            ..TestTenantSpec::default()
        },
    )
    .await?;

    // Tenant B: healthy.
    let tenant_b = create_connected_tenant(
        &h.tenants,
        TestTenantSpec {
            name: "Tenant B",
            realm_id: "realm-b",
            refresh_token: "refresh-b",
            ..TestTenantSpec::default()
        },
    )
    .await?;

    Mock::given(method("POST"))
        .and(path("/oauth2/v1/tokens/bearer"))
        .and(body_string_contains("refresh-a"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&identity)
        .await;

    mount_empty_ledger(&ledger, "realm-b").await;

    let report = h.orchestrator.run_now().await?;
    assert_eq!(report.per_tenant.len(), 2);

    let a = report
        .per_tenant
        .iter()
        .find(|r| r.tenant_id == tenant_a.id)
        .expect("tenant A reported");
    assert!(!a.success);
    assert!(a.error.as_deref().unwrap_or_default().contains("token refresh failed"));
    assert_eq!(a.rates_synced, 0);

    let b = report
        .per_tenant
        .iter()
        .find(|r| r.tenant_id == tenant_b.id)
        .expect("tenant B reported");
    assert!(b.success, "tenant B unaffected by A: {:?}", b.error);
    assert_eq!(b.rates_synced, 2);

    // No ledger traffic ever targeted tenant A's realm.
    let requests = ledger.received_requests().await.unwrap();
    assert_eq!(requests_mentioning(&requests, "realm-a"), 0);

    // A's stored credentials survive the failed refresh.
    let stored_a = h.tenants.get(tenant_a.id).await?.expect("tenant A exists");
    let tokens = h.tenants.decrypt_tokens(&stored_a).await?;
    assert_eq!(tokens.refresh_token, "refresh-a");

    Ok(())
}

#[tokio::test]
async fn empty_scrape_aborts_before_any_tenant() -> Result<()> {
    let (fixing, ledger, identity) =
        (MockServer::start().await, MockServer::start().await, MockServer::start().await);
    let h = harness(&fixing, &ledger, &identity).await?;

    mount_fixing_page(&fixing, EMPTY_PAGE).await;
    create_connected_tenant(&h.tenants, TestTenantSpec::default()).await?;

    let result = h.orchestrator.run_now().await;
    assert!(matches!(
        result,
        Err(RunError::Fixing(FixingError::EmptySnapshot))
    ));

    assert!(ledger.received_requests().await.unwrap().is_empty());
    assert!(identity.received_requests().await.unwrap().is_empty());

    // The failed scrape still leaves an audit row.
    let logs = scrape_log::Entity::find().all(h.db.as_ref()).await?;
    assert_eq!(logs.len(), 1);
    assert!(!logs[0].success);
    assert!(logs[0].error.is_some());

    Ok(())
}

#[tokio::test]
async fn fetch_failure_is_run_fatal() -> Result<()> {
    let (fixing, ledger, identity) =
        (MockServer::start().await, MockServer::start().await, MockServer::start().await);
    let h = harness(&fixing, &ledger, &identity).await?;

    Mock::given(method("GET"))
        .and(path("/fixing"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&fixing)
        .await;

    create_connected_tenant(&h.tenants, TestTenantSpec::default()).await?;

    let result = h.orchestrator.run_now().await;
    assert!(matches!(
        result,
        Err(RunError::Fixing(FixingError::Upstream { status: 503 }))
    ));
    assert!(ledger.received_requests().await.unwrap().is_empty());

    Ok(())
}

#[tokio::test]
async fn malformed_rows_do_not_block_the_run() -> Result<()> {
    let (fixing, ledger, identity) =
        (MockServer::start().await, MockServer::start().await, MockServer::start().await);
    let h = harness(&fixing, &ledger, &identity).await?;

    mount_fixing_page(&fixing, MALFORMED_PAGE).await;
    mount_empty_ledger(&ledger, "realm-1").await;
    create_connected_tenant(&h.tenants, TestTenantSpec::default()).await?;

    let report = h.orchestrator.run_now().await?;

    // USD, EUR, JPY parse; the CHF and GBP rows are malformed and skipped.
    assert_eq!(report.new, 3);
    assert!(report.per_tenant[0].success);
    assert_eq!(report.per_tenant[0].rates_synced, 3);

    Ok(())
}

#[tokio::test]
async fn ledger_auth_expiry_triggers_one_refresh_and_retry() -> Result<()> {
    let (fixing, ledger, identity) =
        (MockServer::start().await, MockServer::start().await, MockServer::start().await);
    let h = harness(&fixing, &ledger, &identity).await?;

    mount_fixing_page(&fixing, FIXING_PAGE).await;
    create_connected_tenant(&h.tenants, TestTenantSpec::default()).await?;

    // The first ledger call rejects the bearer token (revoked server-side),
    // everything afterwards succeeds.
    Mock::given(method("GET"))
        .and(path("/v3/company/realm-1/exchangerate"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&ledger)
        .await;
    mount_empty_ledger(&ledger, "realm-1").await;

    Mock::given(method("POST"))
        .and(path("/oauth2/v1/tokens/bearer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "re-minted-access",
            "refresh_token": "re-minted-refresh",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&identity)
        .await;

    let report = h.orchestrator.run_now().await?;

    let entry = &report.per_tenant[0];
    assert!(entry.success, "refresh-and-retry should recover: {:?}", entry.error);
    assert_eq!(entry.rates_synced, 2);

    Ok(())
}

#[tokio::test]
async fn overlapping_runs_are_rejected() -> Result<()> {
    let (fixing, ledger, identity) =
        (MockServer::start().await, MockServer::start().await, MockServer::start().await);
    let h = harness(&fixing, &ledger, &identity).await?;

    Mock::given(method("GET"))
        .and(path("/fixing"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(FIXING_PAGE)
                .set_delay(StdDuration::from_millis(300)),
        )
        .mount(&fixing)
        .await;
    mount_empty_ledger(&ledger, "realm-1").await;

    let (first, second) = tokio::join!(h.orchestrator.run_now(), h.orchestrator.run_now());

    let already_running = matches!(first, Err(RunError::AlreadyRunning))
        ^ matches!(second, Err(RunError::AlreadyRunning));
    assert!(
        already_running,
        "exactly one of the overlapping runs must be rejected"
    );

    Ok(())
}

#[tokio::test]
async fn tenant_status_reflects_token_and_sync_state() -> Result<()> {
    let (fixing, ledger, identity) =
        (MockServer::start().await, MockServer::start().await, MockServer::start().await);
    let h = harness(&fixing, &ledger, &identity).await?;

    let tenant = create_connected_tenant(
        &h.tenants,
        TestTenantSpec {
            token_expires_at: Utc::now() - Duration::minutes(1),
            ..TestTenantSpec::default()
        },
    )
    .await?;

    let status = h
        .orchestrator
        .tenant_status(tenant.id)
        .await?
        .expect("tenant exists");

    assert_eq!(status.tenant_id, tenant.id);
    assert!(status.token_expired);
    assert!(status.sync_enabled);
    assert!(status.last_sync.is_none());

    let missing = h.orchestrator.tenant_status(uuid::Uuid::new_v4()).await?;
    assert!(missing.is_none());

    Ok(())
}
