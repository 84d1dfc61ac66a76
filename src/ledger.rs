//! # Ledger Sync Client
//!
//! Posts currency rates into one tenant's external ledger. The ledger
//! enforces optimistic concurrency: every write must echo the last-seen
//! version token (`SyncToken`), with `"0"` reserved for creates. Delivery is
//! therefore query-then-write: look up the existing rate for
//! (source currency, date), resubmit with its token if found, create
//! otherwise. A 404 on the query means "not found" and is not an error.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::config::LedgerConfig;

/// Version token value the ledger expects for creates.
pub const CREATE_SYNC_TOKEN: &str = "0";

/// Ledger API failures, classified for the orchestrator's retry decision.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Bearer token rejected; the caller owns the single refresh-and-retry.
    #[error("ledger authorization failed")]
    Unauthorized,
    #[error("ledger API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("ledger request failed: {0}")]
    Network(String),
    #[error("malformed ledger response: {0}")]
    Malformed(String),
    #[error("invalid ledger URL: {0}")]
    InvalidUrl(String),
}

/// Credential context for one tenant's ledger calls.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub realm_id: String,
    pub access_token: String,
    pub sandbox: bool,
}

/// Exchange-rate record as the ledger represents it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct LedgerRate {
    pub source_currency_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_currency_code: Option<String>,
    pub rate: Decimal,
    pub as_of_date: NaiveDate,
    pub sync_token: String,
}

#[derive(Debug, Deserialize)]
struct LedgerRateEnvelope {
    #[serde(rename = "ExchangeRate")]
    exchange_rate: LedgerRate,
}

/// Outcome of delivering one rate to one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Created { sync_token: String },
    Updated { sync_token: String },
}

impl DeliveryOutcome {
    pub fn sync_token(&self) -> &str {
        match self {
            DeliveryOutcome::Created { sync_token } | DeliveryOutcome::Updated { sync_token } => {
                sync_token
            }
        }
    }
}

/// Seam for the external ledger API.
#[async_trait]
pub trait LedgerApi: Send + Sync {
    /// Look up the existing rate for (source currency, date); `None` when the
    /// ledger has no record.
    async fn query_rate(
        &self,
        ctx: &TenantContext,
        source_currency: &str,
        as_of_date: NaiveDate,
    ) -> Result<Option<LedgerRate>, LedgerError>;

    /// Submit a rate, echoing the version token the caller last observed.
    async fn post_rate(
        &self,
        ctx: &TenantContext,
        rate: &LedgerRate,
    ) -> Result<LedgerRate, LedgerError>;

    /// Deliver one rate with the query-then-write protocol.
    async fn deliver(
        &self,
        ctx: &TenantContext,
        source_currency: &str,
        target_currency: &str,
        rate: Decimal,
        as_of_date: NaiveDate,
    ) -> Result<DeliveryOutcome, LedgerError> {
        let existing = self.query_rate(ctx, source_currency, as_of_date).await?;

        let (sync_token, is_update) = match &existing {
            Some(existing) => (existing.sync_token.clone(), true),
            None => (CREATE_SYNC_TOKEN.to_string(), false),
        };

        let submitted = self
            .post_rate(
                ctx,
                &LedgerRate {
                    source_currency_code: source_currency.to_string(),
                    target_currency_code: Some(target_currency.to_string()),
                    rate,
                    as_of_date,
                    sync_token,
                },
            )
            .await?;

        let outcome = if is_update {
            DeliveryOutcome::Updated {
                sync_token: submitted.sync_token,
            }
        } else {
            DeliveryOutcome::Created {
                sync_token: submitted.sync_token,
            }
        };

        info!(
            realm_id = %ctx.realm_id,
            currency = %source_currency,
            date = %as_of_date,
            updated = is_update,
            "delivered rate to ledger"
        );

        Ok(outcome)
    }
}

/// HTTP implementation of [`LedgerApi`].
#[derive(Clone)]
pub struct HttpLedgerClient {
    http: Client,
    api_base: String,
    sandbox_api_base: String,
}

impl HttpLedgerClient {
    pub fn new(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| LedgerError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_base: config.api_base.clone(),
            sandbox_api_base: config.sandbox_api_base.clone(),
        })
    }

    fn endpoint(&self, ctx: &TenantContext) -> Result<Url, LedgerError> {
        let base = if ctx.sandbox {
            &self.sandbox_api_base
        } else {
            &self.api_base
        };
        Url::parse(&format!(
            "{}/v3/company/{}/exchangerate",
            base.trim_end_matches('/'),
            ctx.realm_id
        ))
        .map_err(|e| LedgerError::InvalidUrl(e.to_string()))
    }

    async fn read_error(response: reqwest::Response) -> LedgerError {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return LedgerError::Unauthorized;
        }
        let body = response.text().await.unwrap_or_default();
        LedgerError::Api {
            status: status.as_u16(),
            body,
        }
    }
}

#[async_trait]
impl LedgerApi for HttpLedgerClient {
    async fn query_rate(
        &self,
        ctx: &TenantContext,
        source_currency: &str,
        as_of_date: NaiveDate,
    ) -> Result<Option<LedgerRate>, LedgerError> {
        let mut url = self.endpoint(ctx)?;
        url.query_pairs_mut()
            .append_pair("sourcecurrencycode", source_currency)
            .append_pair("asofdate", &as_of_date.format("%Y-%m-%d").to_string());

        let response = self
            .http
            .get(url)
            .bearer_auth(&ctx.access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| LedgerError::Network(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(
                realm_id = %ctx.realm_id,
                currency = %source_currency,
                "no existing ledger rate"
            );
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let envelope: LedgerRateEnvelope = response
            .json()
            .await
            .map_err(|e| LedgerError::Malformed(e.to_string()))?;

        Ok(Some(envelope.exchange_rate))
    }

    async fn post_rate(
        &self,
        ctx: &TenantContext,
        rate: &LedgerRate,
    ) -> Result<LedgerRate, LedgerError> {
        let url = self.endpoint(ctx)?;

        let response = self
            .http
            .post(url)
            .bearer_auth(&ctx.access_token)
            .header("Accept", "application/json")
            .json(rate)
            .send()
            .await
            .map_err(|e| LedgerError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let envelope: LedgerRateEnvelope = response
            .json()
            .await
            .map_err(|e| LedgerError::Malformed(e.to_string()))?;

        Ok(envelope.exchange_rate)
    }
}
