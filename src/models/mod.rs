//! # Data Models
//!
//! This module contains the SeaORM entity models for the ratesync service.

pub mod delivery_record;
pub mod exchange_rate;
pub mod scrape_log;
pub mod tenant;

pub use delivery_record::Entity as DeliveryRecord;
pub use exchange_rate::Entity as ExchangeRate;
pub use scrape_log::Entity as ScrapeLog;
pub use tenant::Entity as Tenant;
