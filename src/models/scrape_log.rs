//! ScrapeLog entity model
//!
//! One row per pipeline run against the upstream fixing page.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "scrape_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Timestamp when the scrape was attempted
    pub scraped_at: DateTimeWithTimeZone,

    /// Whether a non-empty snapshot was produced
    pub success: bool,

    /// Number of resolved rates in the snapshot
    pub rates_found: i32,

    /// Upsert counters for this run
    pub rates_new: i32,
    pub rates_updated: i32,
    pub rates_unchanged: i32,

    /// "Last updated" timestamp extracted from the upstream page, if present
    pub source_published_at: Option<DateTimeWithTimeZone>,

    /// Error detail for failed scrapes
    pub error: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
