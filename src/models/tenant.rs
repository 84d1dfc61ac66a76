//! Tenant entity model
//!
//! This module contains the SeaORM entity model for the tenants table. A
//! tenant is one external ledger company receiving synced rates. Rows start
//! in a pending approval state; `realm_id` and the token ciphertexts stay
//! null until the OAuth connect step binds them.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Tenant entity representing one ledger company and its credential state
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tenants")]
pub struct Model {
    /// Unique identifier for the tenant (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Display name for the tenant (optional)
    pub name: Option<String>,

    /// External ledger realm id, bound after OAuth connect (unique when set)
    pub realm_id: Option<String>,

    /// Approval workflow state (pending|approved)
    pub approval_status: String,

    /// OAuth app client id, bound at approval
    pub client_id: Option<String>,

    /// Encrypted OAuth app client secret
    pub client_secret_ciphertext: Option<Vec<u8>>,

    /// Encrypted access token ciphertext
    pub access_token_ciphertext: Option<Vec<u8>>,

    /// Encrypted refresh token ciphertext
    pub refresh_token_ciphertext: Option<Vec<u8>>,

    /// Access token expiry timestamp
    pub token_expires_at: Option<DateTimeWithTimeZone>,

    /// Whether this tenant targets the sandbox environment
    pub is_sandbox: bool,

    /// Soft activation flag; deactivation never deletes the row
    pub is_active: bool,

    /// Whether this tenant participates in sync runs
    pub sync_enabled: bool,

    /// The tenant's own bookkeeping currency, never a delivery target
    pub home_currency: String,

    /// Timestamp of the last fully successful sync run for this tenant
    pub last_synced_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the tenant was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the tenant was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::delivery_record::Entity")]
    DeliveryRecord,
}

impl Related<super::delivery_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DeliveryRecord.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// A tenant is eligible for sync once connected, active and sync-enabled.
    pub fn is_sync_eligible(&self) -> bool {
        self.is_active && self.sync_enabled && self.realm_id.is_some()
    }
}
