//! # Token Lifecycle Management
//!
//! Decides whether a tenant's access token needs refresh before use and
//! performs the refresh against the identity provider. Ensuring a valid
//! token is a pure credential state transition, kept separate from ledger
//! delivery so the two phases stay independently testable. A failed refresh
//! leaves the stored tokens untouched; the orchestrator skips the tenant for
//! the run instead of touching its credentials.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::IdentityConfig;
use crate::models::tenant;
use crate::repositories::{RepositoryError, TenantRepository};

/// Credential state of a tenant's access token at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Valid,
    ExpiringSoon,
    Expired,
}

/// Tenant-scoped credential failures. None of these deactivate the tenant.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("tenant has no OAuth app credentials bound")]
    MissingAppCredentials,
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
}

/// Token response from the identity provider's refresh endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

/// Refreshed token material returned by the identity provider.
#[derive(Debug)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// HTTP client for the OAuth identity provider.
#[derive(Clone)]
pub struct IdentityClient {
    http: Client,
    token_url: String,
    sandbox_token_url: String,
}

impl IdentityClient {
    pub fn new(config: &IdentityConfig) -> Result<Self, CredentialError> {
        let http = Client::builder()
            .timeout(StdDuration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| CredentialError::RefreshFailed(format!("http client: {}", e)))?;

        Ok(Self {
            http,
            token_url: config.token_url.clone(),
            sandbox_token_url: config.sandbox_token_url.clone(),
        })
    }

    /// Exchange a refresh token for a new token pair.
    pub async fn refresh(
        &self,
        sandbox: bool,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<RefreshedTokens, CredentialError> {
        let url = if sandbox {
            &self.sandbox_token_url
        } else {
            &self.token_url
        };

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .http
            .post(url)
            .basic_auth(client_id, Some(client_secret))
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| CredentialError::RefreshFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::RefreshFailed(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::RefreshFailed(format!("invalid token response: {}", e)))?;

        let expires_in = token_response.expires_in.unwrap_or(3600);

        Ok(RefreshedTokens {
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token,
            expires_at: Utc::now() + Duration::seconds(expires_in as i64),
        })
    }
}

/// Per-tenant token state machine over the repository and identity client.
#[derive(Clone)]
pub struct TokenLifecycle {
    tenants: TenantRepository,
    identity: IdentityClient,
    safety_window: Duration,
}

impl TokenLifecycle {
    pub fn new(
        tenants: TenantRepository,
        identity: IdentityClient,
        safety_window_seconds: u64,
    ) -> Self {
        Self {
            tenants,
            identity,
            safety_window: Duration::seconds(safety_window_seconds as i64),
        }
    }

    /// Classify a tenant's token at `now`. A missing expiry is treated as
    /// expired and forces a refresh.
    pub fn token_state(&self, tenant: &tenant::Model, now: DateTime<Utc>) -> TokenState {
        match tenant.token_expires_at {
            None => TokenState::Expired,
            Some(expires_at) => {
                let expires_at = expires_at.with_timezone(&Utc);
                if expires_at <= now {
                    TokenState::Expired
                } else if expires_at <= now + self.safety_window {
                    TokenState::ExpiringSoon
                } else {
                    TokenState::Valid
                }
            }
        }
    }

    /// Ensure the tenant holds a usable access token, refreshing when it is
    /// missing, expired, or inside the safety window. Returns the up-to-date
    /// tenant row.
    pub async fn ensure_valid(
        &self,
        tenant: &tenant::Model,
    ) -> Result<tenant::Model, CredentialError> {
        match self.token_state(tenant, Utc::now()) {
            TokenState::Valid => Ok(tenant.clone()),
            state => {
                info!(tenant_id = %tenant.id, state = ?state, "refreshing tenant token");
                self.refresh(tenant).await
            }
        }
    }

    /// Refresh the tenant's tokens unconditionally and persist the new pair.
    pub async fn refresh(&self, tenant: &tenant::Model) -> Result<tenant::Model, CredentialError> {
        let client_id = tenant
            .client_id
            .as_deref()
            .ok_or(CredentialError::MissingAppCredentials)?;
        let client_secret = self.tenants.decrypt_client_secret(tenant).await?;
        let tokens = self.tenants.decrypt_tokens(tenant).await?;

        let refreshed = match self
            .identity
            .refresh(
                tenant.is_sandbox,
                client_id,
                &client_secret,
                &tokens.refresh_token,
            )
            .await
        {
            Ok(refreshed) => refreshed,
            Err(err) => {
                counter!("token_refresh_failure_total").increment(1);
                warn!(tenant_id = %tenant.id, error = %err, "token refresh failed, keeping stored tokens");
                return Err(err);
            }
        };

        // Providers may rotate the refresh token; keep the old one otherwise.
        let next_refresh = refreshed
            .refresh_token
            .as_deref()
            .unwrap_or(&tokens.refresh_token);

        let updated = self
            .tenants
            .update_tokens(
                tenant.id,
                &refreshed.access_token,
                next_refresh,
                refreshed.expires_at,
            )
            .await?;

        counter!("token_refresh_success_total").increment(1);
        info!(
            tenant_id = %tenant.id,
            expires_at = %refreshed.expires_at,
            "refreshed tenant tokens"
        );

        Ok(updated)
    }
}
