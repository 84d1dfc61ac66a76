//! # Tenant Repository
//!
//! Repository for tenant lifecycle and credential persistence. Tenants move
//! pending → approved (app credentials bound) → connected (realm id and
//! tokens bound, sync enabled). Secrets are stored only as vault ciphertexts;
//! deactivation is a soft flag, rows are never deleted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};
use tracing::info;
use uuid::Uuid;

use super::RepositoryError;
use crate::crypto::{CredentialVault, fields, tenant_aad};
use crate::models::tenant::{self, Entity as Tenant};

/// Approval workflow states stored in `tenants.approval_status`.
pub mod approval {
    pub const PENDING: &str = "pending";
    pub const APPROVED: &str = "approved";
}

/// Decrypted OAuth tokens for one tenant. Plaintext lives only as long as the
/// API call that needs it.
pub struct DecryptedTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Repository for tenant database operations
#[derive(Clone)]
pub struct TenantRepository {
    db: Arc<DatabaseConnection>,
    vault: CredentialVault,
}

impl TenantRepository {
    /// Creates a new TenantRepository with the given pool and vault
    pub fn new(db: Arc<DatabaseConnection>, vault: CredentialVault) -> Self {
        Self { db, vault }
    }

    /// Register a new tenant in the pending approval state.
    pub async fn create_pending(
        &self,
        name: &str,
        home_currency: &str,
    ) -> Result<tenant::Model, RepositoryError> {
        let now = Utc::now();
        let model = tenant::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(Some(name.to_string())),
            realm_id: Set(None),
            approval_status: Set(approval::PENDING.to_string()),
            client_id: Set(None),
            client_secret_ciphertext: Set(None),
            access_token_ciphertext: Set(None),
            refresh_token_ciphertext: Set(None),
            token_expires_at: Set(None),
            is_sandbox: Set(false),
            is_active: Set(false),
            sync_enabled: Set(false),
            home_currency: Set(home_currency.to_string()),
            last_synced_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let created = model.insert(self.db.as_ref()).await?;
        info!(tenant_id = %created.id, "registered pending tenant");
        Ok(created)
    }

    /// Administrative approval: binds the OAuth app credential pair and
    /// activates the tenant. Sync stays disabled until the OAuth connect.
    pub async fn approve(
        &self,
        tenant_id: Uuid,
        client_id: &str,
        client_secret: &str,
        is_sandbox: bool,
    ) -> Result<tenant::Model, RepositoryError> {
        let tenant = self.get_required(tenant_id).await?;
        let secret_ciphertext = self.vault.encrypt(
            &tenant_aad(tenant_id, fields::CLIENT_SECRET),
            client_secret,
        )?;

        let mut active = tenant.into_active_model();
        active.approval_status = Set(approval::APPROVED.to_string());
        active.client_id = Set(Some(client_id.to_string()));
        active.client_secret_ciphertext = Set(Some(secret_ciphertext));
        active.is_sandbox = Set(is_sandbox);
        active.is_active = Set(true);
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(self.db.as_ref()).await?;
        info!(tenant_id = %tenant_id, "approved tenant");
        Ok(updated)
    }

    /// OAuth connect: binds the external realm id and the initial token pair
    /// and enables sync.
    pub async fn connect(
        &self,
        tenant_id: Uuid,
        realm_id: &str,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<tenant::Model, RepositoryError> {
        let tenant = self.get_required(tenant_id).await?;
        if tenant.approval_status != approval::APPROVED {
            return Err(RepositoryError::Invalid(format!(
                "tenant {} is not approved",
                tenant_id
            )));
        }

        let access_ciphertext = self
            .vault
            .encrypt(&tenant_aad(tenant_id, fields::ACCESS_TOKEN), access_token)?;
        let refresh_ciphertext = self
            .vault
            .encrypt(&tenant_aad(tenant_id, fields::REFRESH_TOKEN), refresh_token)?;

        let mut active = tenant.into_active_model();
        active.realm_id = Set(Some(realm_id.to_string()));
        active.access_token_ciphertext = Set(Some(access_ciphertext));
        active.refresh_token_ciphertext = Set(Some(refresh_ciphertext));
        active.token_expires_at = Set(Some(expires_at.into()));
        active.sync_enabled = Set(true);
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(self.db.as_ref()).await?;
        info!(tenant_id = %tenant_id, realm_id = %realm_id, "connected tenant to ledger");
        Ok(updated)
    }

    /// Persist a refreshed token pair, re-encrypted.
    pub async fn update_tokens(
        &self,
        tenant_id: Uuid,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<tenant::Model, RepositoryError> {
        let tenant = self.get_required(tenant_id).await?;

        let access_ciphertext = self
            .vault
            .encrypt(&tenant_aad(tenant_id, fields::ACCESS_TOKEN), access_token)?;
        let refresh_ciphertext = self
            .vault
            .encrypt(&tenant_aad(tenant_id, fields::REFRESH_TOKEN), refresh_token)?;

        let mut active = tenant.into_active_model();
        active.access_token_ciphertext = Set(Some(access_ciphertext));
        active.refresh_token_ciphertext = Set(Some(refresh_ciphertext));
        active.token_expires_at = Set(Some(expires_at.into()));
        active.updated_at = Set(Utc::now().into());

        Ok(active.update(self.db.as_ref()).await?)
    }

    /// Decrypt the tenant's token pair.
    pub async fn decrypt_tokens(
        &self,
        tenant: &tenant::Model,
    ) -> Result<DecryptedTokens, RepositoryError> {
        let access_ciphertext = tenant
            .access_token_ciphertext
            .as_deref()
            .ok_or_else(|| RepositoryError::Invalid("tenant has no access token".to_string()))?;
        let refresh_ciphertext = tenant
            .refresh_token_ciphertext
            .as_deref()
            .ok_or_else(|| RepositoryError::Invalid("tenant has no refresh token".to_string()))?;

        Ok(DecryptedTokens {
            access_token: self.vault.decrypt(
                &tenant_aad(tenant.id, fields::ACCESS_TOKEN),
                access_ciphertext,
            )?,
            refresh_token: self.vault.decrypt(
                &tenant_aad(tenant.id, fields::REFRESH_TOKEN),
                refresh_ciphertext,
            )?,
        })
    }

    /// Decrypt the tenant's OAuth app client secret.
    pub async fn decrypt_client_secret(
        &self,
        tenant: &tenant::Model,
    ) -> Result<String, RepositoryError> {
        let ciphertext = tenant
            .client_secret_ciphertext
            .as_deref()
            .ok_or_else(|| RepositoryError::Invalid("tenant has no client secret".to_string()))?;
        Ok(self
            .vault
            .decrypt(&tenant_aad(tenant.id, fields::CLIENT_SECRET), ciphertext)?)
    }

    /// Get tenant by ID
    pub async fn get(&self, tenant_id: Uuid) -> Result<Option<tenant::Model>, RepositoryError> {
        Ok(Tenant::find_by_id(tenant_id).one(self.db.as_ref()).await?)
    }

    async fn get_required(&self, tenant_id: Uuid) -> Result<tenant::Model, RepositoryError> {
        self.get(tenant_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("tenant {}", tenant_id)))
    }

    /// Get tenant by external realm id
    pub async fn find_by_realm(
        &self,
        realm_id: &str,
    ) -> Result<Option<tenant::Model>, RepositoryError> {
        Ok(Tenant::find()
            .filter(tenant::Column::RealmId.eq(realm_id))
            .one(self.db.as_ref())
            .await?)
    }

    /// Tenants eligible for a sync run: active and sync-enabled.
    pub async fn sync_eligible(&self) -> Result<Vec<tenant::Model>, RepositoryError> {
        Ok(Tenant::find()
            .filter(tenant::Column::IsActive.eq(true))
            .filter(tenant::Column::SyncEnabled.eq(true))
            .order_by_asc(tenant::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }

    /// Stamp a fully successful sync for the tenant.
    pub async fn mark_synced(
        &self,
        tenant_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let tenant = self.get_required(tenant_id).await?;
        let mut active = tenant.into_active_model();
        active.last_synced_at = Set(Some(at.into()));
        active.updated_at = Set(at.into());
        active.update(self.db.as_ref()).await?;
        Ok(())
    }

    /// Toggle sync participation.
    pub async fn set_sync_enabled(
        &self,
        tenant_id: Uuid,
        enabled: bool,
    ) -> Result<(), RepositoryError> {
        let tenant = self.get_required(tenant_id).await?;
        let mut active = tenant.into_active_model();
        active.sync_enabled = Set(enabled);
        active.updated_at = Set(Utc::now().into());
        active.update(self.db.as_ref()).await?;
        Ok(())
    }

    /// Soft-deactivate a tenant. Credentials and history are retained for
    /// audit; the row is never deleted.
    pub async fn deactivate(&self, tenant_id: Uuid) -> Result<(), RepositoryError> {
        let tenant = self.get_required(tenant_id).await?;
        let mut active = tenant.into_active_model();
        active.is_active = Set(false);
        active.sync_enabled = Set(false);
        active.updated_at = Set(Utc::now().into());
        active.update(self.db.as_ref()).await?;
        info!(tenant_id = %tenant_id, "deactivated tenant");
        Ok(())
    }
}
