//! Fixing page parser
//!
//! Turns the raw HTML of the official exchange-rate page into rate rows.
//! The markup is not contractually stable, so the parser tolerates three
//! table layouts (name|code|rate, name|rate, code|rate) and falls back to a
//! regex sweep over the page text when no usable table is present. A bad row
//! is skipped and counted, never fatal; only an unusable document is an
//! error.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{debug, warn};

/// One raw row extracted from the document, before name resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCurrencyEntry {
    /// Currency label as printed (localized name or code)
    pub label: String,
    /// ISO code column value, when the layout carries one
    pub code: Option<String>,
    /// Cleaned rate text: digits and a dot decimal separator
    pub rate_text: String,
    /// Per-row effective-date hint, when the layout carries one
    pub as_of_hint: Option<NaiveDate>,
}

/// Parse result for a whole document.
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub entries: Vec<RawCurrencyEntry>,
    /// Rows that were present but unusable
    pub skipped_rows: usize,
    /// "Last updated" timestamp scanned from the page text, when present
    pub published_at: Option<NaiveDateTime>,
}

/// Document-level parse failures. Row-level problems are skips, not errors.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("document is empty")]
    EmptyDocument,
}

static RATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+[.,]\d+").expect("valid rate pattern"));

static ROW_DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})\.(\d{1,2})\.(\d{4})$").expect("valid date pattern"));

static PUBLISHED_AT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2}\.\d{1,2}\.\d{4})\s+(\d{1,2}:\d{2}:\d{2})").expect("valid timestamp")
});

/// Currencies the text fallback knows how to find.
const FALLBACK_CODES: &[&str] = &["USD", "EUR", "GBP", "CHF", "CAD", "JPY"];

/// Parse a fixing page into raw rate rows.
pub fn parse_document(html: &str) -> Result<ParsedDocument, ParseError> {
    if html.trim().is_empty() {
        return Err(ParseError::EmptyDocument);
    }

    let document = Html::parse_document(html);
    let page_text = collect_text(document.root_element());

    let mut parsed = ParsedDocument {
        published_at: extract_published_at(&page_text),
        ..Default::default()
    };

    parse_tables(&document, &mut parsed);

    if parsed.entries.is_empty() {
        debug!("no usable rate table found, trying text fallback");
        parsed.entries = parse_text_fallback(&page_text);
    }

    Ok(parsed)
}

/// Extract the "last updated" timestamp (`DD.MM.YYYY HH:MM:SS`) from the
/// page text. Absence is not an error; the caller falls back to today.
fn extract_published_at(text: &str) -> Option<NaiveDateTime> {
    let captures = PUBLISHED_AT_PATTERN.captures(text)?;
    let stamp = format!("{} {}", &captures[1], &captures[2]);
    match NaiveDateTime::parse_from_str(&stamp, "%d.%m.%Y %H:%M:%S") {
        Ok(dt) => Some(dt),
        Err(err) => {
            warn!(stamp = %stamp, error = %err, "unparseable last-updated timestamp");
            None
        }
    }
}

fn parse_tables(document: &Html, parsed: &mut ParsedDocument) {
    let preferred = Selector::parse("table.table").expect("valid selector");
    let any_table = Selector::parse("table").expect("valid selector");
    let row_selector = Selector::parse("tr").expect("valid selector");
    let cell_selector = Selector::parse("td, th").expect("valid selector");

    let tables: Vec<ElementRef> = {
        let matched: Vec<ElementRef> = document.select(&preferred).collect();
        if matched.is_empty() {
            document.select(&any_table).collect()
        } else {
            matched
        }
    };

    for table in tables {
        // Skip the header row of each table.
        for row in table.select(&row_selector).skip(1) {
            let cells: Vec<String> = row
                .select(&cell_selector)
                .map(|cell| collect_text(cell).trim().to_string())
                .collect();

            if cells.len() < 2 {
                continue;
            }

            match parse_row(&cells) {
                Some(entry) => parsed.entries.push(entry),
                None => {
                    parsed.skipped_rows += 1;
                    warn!(row = ?cells, "skipping unparseable rate row");
                }
            }
        }

        if !parsed.entries.is_empty() {
            break;
        }
    }
}

/// Interpret one row of cells against the known layouts.
fn parse_row(cells: &[String]) -> Option<RawCurrencyEntry> {
    let col0 = cells[0].as_str();
    let col1 = cells.get(1).map(String::as_str).unwrap_or_default();
    let col2 = cells.get(2).map(String::as_str).unwrap_or_default();

    // A date cell also matches the numeric pattern; exclude it explicitly.
    let is_rate_cell = |s: &str| RATE_PATTERN.is_match(s) && !ROW_DATE_PATTERN.is_match(s);

    let (label, code, rate_raw) = if is_rate_cell(col2) {
        // Layout: name | code | rate
        (col0, Some(col1.to_string()), col2)
    } else if is_rate_cell(col1) {
        // Layout: name | rate  or  code | rate
        (col0, None, col1)
    } else {
        return None;
    };

    let rate_text = clean_rate_text(rate_raw)?;
    if label.is_empty() {
        return None;
    }

    // Only a well-formed ISO column counts as a code hint.
    let code = code.filter(|c| c.len() == 3 && c.chars().all(|ch| ch.is_ascii_uppercase()));

    let as_of_hint = cells.iter().find_map(|cell| parse_row_date(cell));

    Some(RawCurrencyEntry {
        label: label.to_string(),
        code,
        rate_text,
        as_of_hint,
    })
}

/// Strip everything but digits and separators and normalize the decimal
/// comma; an empty result rejects the row.
fn clean_rate_text(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let cleaned = cleaned.replace(',', ".");
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

fn parse_row_date(cell: &str) -> Option<NaiveDate> {
    let captures = ROW_DATE_PATTERN.captures(cell)?;
    NaiveDate::from_ymd_opt(
        captures[3].parse().ok()?,
        captures[2].parse().ok()?,
        captures[1].parse().ok()?,
    )
}

/// Last-resort extraction: look for `CODE ... <number>` runs in the raw page
/// text for a fixed set of majors.
fn parse_text_fallback(text: &str) -> Vec<RawCurrencyEntry> {
    let mut entries = Vec::new();

    for code in FALLBACK_CODES {
        let pattern = format!(r"(?i){}\D{{0,40}}?(\d+[.,]\d+)", code);
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        if let Some(captures) = re.captures(text)
            && let Some(rate_text) = clean_rate_text(&captures[1])
        {
            entries.push(RawCurrencyEntry {
                label: (*code).to_string(),
                code: Some((*code).to_string()),
                rate_text,
                as_of_hint: None,
            });
        }
    }

    entries
}

/// Concatenated text of an element's descendants.
fn collect_text(element: ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &str) -> String {
        format!(
            "<html><body><table class=\"table\"><tr><th>Monedha</th><th>Kursi</th></tr>{}</table></body></html>",
            rows
        )
    }

    #[test]
    fn parses_name_rate_layout() {
        let html = table("<tr><td>Dollar Amerikan</td><td>105,50</td></tr><tr><td>Euro</td><td>115.20</td></tr>");
        let parsed = parse_document(&html).expect("parses");

        assert_eq!(parsed.entries.len(), 2);
        assert_eq!(parsed.entries[0].label, "Dollar Amerikan");
        assert_eq!(parsed.entries[0].rate_text, "105.50");
        assert_eq!(parsed.entries[1].rate_text, "115.20");
        assert_eq!(parsed.skipped_rows, 0);
    }

    #[test]
    fn parses_name_code_rate_layout() {
        let html = table("<tr><td>Jeni Japonez</td><td>JPY</td><td>65,91</td></tr>");
        let parsed = parse_document(&html).expect("parses");

        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].code.as_deref(), Some("JPY"));
        assert_eq!(parsed.entries[0].rate_text, "65.91");
    }

    #[test]
    fn parses_code_rate_layout() {
        let html = table("<tr><td>USD</td><td>105,50</td></tr>");
        let parsed = parse_document(&html).expect("parses");

        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].label, "USD");
        assert!(parsed.entries[0].code.is_none());
    }

    #[test]
    fn malformed_rows_are_skipped_not_fatal() {
        let html = table(
            "<tr><td>Dollar Amerikan</td><td>105,50</td></tr>\
             <tr><td>Euro</td><td>n/a</td></tr>\
             <tr><td>Paundi Britanik</td><td>---</td></tr>",
        );
        let parsed = parse_document(&html).expect("parses");

        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.skipped_rows, 2);
    }

    #[test]
    fn strips_decoration_from_rate_text() {
        let html = table("<tr><td>Euro</td><td>115,20&nbsp;ALL</td></tr>");
        let parsed = parse_document(&html).expect("parses");
        assert_eq!(parsed.entries[0].rate_text, "115.20");
    }

    #[test]
    fn extracts_published_timestamp() {
        let html = format!(
            "<html><body><p>Përditesimi i fundit: 21.11.2025 12:12:08</p>{}</body></html>",
            table("<tr><td>Euro</td><td>115,20</td></tr>")
        );
        let parsed = parse_document(&html).expect("parses");

        let published = parsed.published_at.expect("timestamp found");
        assert_eq!(
            published,
            NaiveDate::from_ymd_opt(2025, 11, 21)
                .unwrap()
                .and_hms_opt(12, 12, 8)
                .unwrap()
        );
    }

    #[test]
    fn missing_timestamp_is_not_an_error() {
        let html = table("<tr><td>Euro</td><td>115,20</td></tr>");
        let parsed = parse_document(&html).expect("parses");
        assert!(parsed.published_at.is_none());
    }

    #[test]
    fn row_date_hint_is_captured() {
        let html = table("<tr><td>Euro</td><td>115,20</td><td>21.11.2025</td></tr>");
        let parsed = parse_document(&html).expect("parses");
        assert_eq!(
            parsed.entries[0].as_of_hint,
            NaiveDate::from_ymd_opt(2025, 11, 21)
        );
    }

    #[test]
    fn falls_back_to_text_extraction() {
        let html = "<html><body><div>Kursi USD 105,50 dhe EUR 115,20 sot</div></body></html>";
        let parsed = parse_document(html).expect("parses");

        assert_eq!(parsed.entries.len(), 2);
        assert_eq!(parsed.entries[0].label, "USD");
        assert_eq!(parsed.entries[0].rate_text, "105.50");
        assert_eq!(parsed.entries[1].label, "EUR");
    }

    #[test]
    fn empty_document_is_fatal() {
        assert!(matches!(
            parse_document("   "),
            Err(ParseError::EmptyDocument)
        ));
    }

    #[test]
    fn document_without_rates_yields_no_entries() {
        let parsed = parse_document("<html><body><p>asgjë këtu</p></body></html>").expect("parses");
        assert!(parsed.entries.is_empty());
    }
}
