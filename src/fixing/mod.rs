//! # Fixing Acquisition Pipeline
//!
//! Everything between the upstream HTML page and a validated, immutable
//! [`RateSnapshot`]: fetching, parsing, currency-name resolution, and
//! snapshot assembly. A snapshot with zero resolved entries is a failed
//! scrape, never an empty-but-valid result.

pub mod fetch;
pub mod parser;
pub mod resolver;

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};

use fetch::FixingFetcher;
use parser::{ParseError, ParsedDocument};

/// Default source identifier recorded on snapshots.
pub const DEFAULT_SOURCE: &str = "Bank of Albania";

/// One resolved currency rate within a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyRate {
    /// ISO 4217 code, unique within a snapshot
    pub currency_code: String,
    /// Label as published by the source
    pub localized_name: String,
    /// Canonical English name
    pub canonical_name: String,
    /// Rate in home-currency terms per `unit_multiplier` units
    pub rate: Decimal,
    /// Units of foreign currency the rate is quoted per (1 or 100)
    pub unit_multiplier: i32,
}

/// The validated, immutable result of a single scrape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateSnapshot {
    /// Effective date of the fixing
    pub as_of_date: NaiveDate,
    /// Resolved rates, de-duplicated by currency code
    pub rates: Vec<CurrencyRate>,
    /// Source identifier
    pub source: String,
    /// When the page was scraped
    pub scraped_at: DateTime<Utc>,
    /// "Last updated" timestamp published by the source, when present
    pub published_at: Option<DateTime<Utc>>,
}

impl RateSnapshot {
    /// Look up a rate by currency code.
    pub fn rate_for(&self, code: &str) -> Option<&CurrencyRate> {
        self.rates.iter().find(|r| r.currency_code == code)
    }
}

/// Failures of the acquisition pipeline. All of these are run-fatal for the
/// orchestrator; row-level problems never surface here.
#[derive(Debug, Error)]
pub enum FixingError {
    #[error("failed to fetch fixing page: {message}")]
    Fetch { message: String },
    #[error("fixing page returned HTTP {status}")]
    Upstream { status: u16 },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("scrape produced no resolved rates")]
    EmptySnapshot,
}

/// Assemble a snapshot from parsed rows.
///
/// Unresolvable labels and unparseable rates are dropped with a warning;
/// duplicate currency codes keep the first occurrence. The effective date
/// comes from the upstream timestamp when present, then any per-row hint,
/// then today (a policy choice, logged so stale pages are visible).
pub fn assemble_snapshot(
    document: &ParsedDocument,
    scraped_at: DateTime<Utc>,
    source: &str,
) -> Result<RateSnapshot, FixingError> {
    let mut rates: Vec<CurrencyRate> = Vec::with_capacity(document.entries.len());
    let mut seen: HashSet<String> = HashSet::new();
    let mut dropped = 0usize;

    for entry in &document.entries {
        let resolution = match entry.code.as_deref() {
            Some(code) => resolver::Resolution {
                code: code.to_string(),
                canonical_name: resolver::canonical_name(code),
                unit_multiplier: resolver::unit_multiplier(code),
                resolved: true,
            },
            None => resolver::resolve(&entry.label),
        };

        if resolution.code.len() != 3 {
            warn!(label = %entry.label, "dropping row with unresolvable currency label");
            dropped += 1;
            continue;
        }

        let rate = match Decimal::from_str(&entry.rate_text) {
            Ok(value) if value > Decimal::ZERO => value,
            _ => {
                warn!(
                    label = %entry.label,
                    rate_text = %entry.rate_text,
                    "dropping row with unparseable rate"
                );
                dropped += 1;
                continue;
            }
        };

        if !seen.insert(resolution.code.clone()) {
            warn!(
                currency = %resolution.code,
                "duplicate currency in scrape, keeping first occurrence"
            );
            continue;
        }

        rates.push(CurrencyRate {
            currency_code: resolution.code,
            localized_name: entry.label.clone(),
            canonical_name: resolution.canonical_name,
            rate,
            unit_multiplier: resolution.unit_multiplier,
        });
    }

    if rates.is_empty() {
        return Err(FixingError::EmptySnapshot);
    }

    let published_at = document.published_at.map(|dt| dt.and_utc());
    let as_of_date = published_at
        .map(|dt| dt.date_naive())
        .or_else(|| document.entries.iter().find_map(|e| e.as_of_hint))
        .unwrap_or_else(|| {
            warn!("no upstream timestamp, labelling snapshot with today's date");
            scraped_at.date_naive()
        });

    info!(
        as_of_date = %as_of_date,
        rates = rates.len(),
        skipped = document.skipped_rows + dropped,
        "assembled rate snapshot"
    );

    Ok(RateSnapshot {
        as_of_date,
        rates,
        source: source.to_string(),
        scraped_at,
        published_at,
    })
}

/// Fetch-and-parse facade used by the orchestrator.
#[derive(Clone)]
pub struct FixingPipeline {
    fetcher: FixingFetcher,
    source: String,
}

impl FixingPipeline {
    pub fn new(
        url: String,
        timeout: Duration,
        max_attempts: u32,
        backoff_base_ms: u64,
    ) -> Result<Self, FixingError> {
        Ok(Self {
            fetcher: FixingFetcher::new(url, timeout, max_attempts, backoff_base_ms)?,
            source: DEFAULT_SOURCE.to_string(),
        })
    }

    /// Produce the current snapshot from the upstream page.
    pub async fn fetch_snapshot(&self) -> Result<RateSnapshot, FixingError> {
        let body = self.fetcher.fetch_document().await?;
        let document = parser::parse_document(&body)?;
        assemble_snapshot(&document, Utc::now(), &self.source)
    }
}
