//! Database migrations for the ratesync service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_01_10_000001_create_tenants;
mod m2026_01_10_000002_create_exchange_rates;
mod m2026_01_10_000003_create_delivery_records;
mod m2026_01_10_000004_create_scrape_logs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_01_10_000001_create_tenants::Migration),
            Box::new(m2026_01_10_000002_create_exchange_rates::Migration),
            Box::new(m2026_01_10_000003_create_delivery_records::Migration),
            Box::new(m2026_01_10_000004_create_scrape_logs::Migration),
        ]
    }
}
