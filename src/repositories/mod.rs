//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM
//! operations for database entities, providing a clean API for data access.

pub mod delivery;
pub mod rate;
pub mod tenant;

pub use delivery::DeliveryRepository;
pub use rate::{RateRepository, UpsertStats};
pub use tenant::TenantRepository;

use thiserror::Error;

use crate::crypto::CryptoError;

/// Errors surfaced by the repository layer.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("{0}")]
    Invalid(String),
}
