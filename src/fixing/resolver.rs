//! Currency name resolution
//!
//! The upstream fixing page mixes Albanian currency names and ISO codes
//! inconsistently across rows, so resolution is table-driven: an exact match
//! against the localized-name registry, then a case-insensitive substring
//! match in either direction, then a 3-letter-uppercase passthrough. Labels
//! that survive none of those are returned unresolved and the caller decides
//! whether to drop the row.

/// Albanian label → ISO 4217 code, as published by the source institution.
///
/// Order matters for the substring pass: short labels ("Ari") sit below the
/// longer ones they could shadow.
const LOCALIZED_NAMES: &[(&str, &str)] = &[
    ("Dollar Amerikan", "USD"),
    ("Dollari Amerikan", "USD"),
    ("Euro", "EUR"),
    ("Poundi Britanik", "GBP"),
    ("Paundi Britanik", "GBP"),
    ("Franga Zvicerane", "CHF"),
    ("Jeni Japonez", "JPY"),
    ("Dollari Australiane", "AUD"),
    ("Dollari Kanadez", "CAD"),
    ("Korona Suedeze", "SEK"),
    ("Korona Norvegjeze", "NOK"),
    ("Korona Daneze", "DKK"),
    ("Lira Turke", "TRY"),
    ("Juani Kinez", "CNY"),
    ("Leva Bullgare", "BGN"),
    ("Forinta Hungareze", "HUF"),
    ("Rubla Ruse", "RUB"),
    ("Kuna Kroate", "HRK"),
    ("Korona Çeke", "CZK"),
    ("Dinari Maqedonas", "MKD"),
    ("Të drejtat speciale të tërheqjes", "SDR"),
    ("SDR", "SDR"),
    ("Argjendi", "XAG"),
    ("Argjend", "XAG"),
    ("Ari", "XAU"),
];

/// ISO code → canonical English name.
const CANONICAL_NAMES: &[(&str, &str)] = &[
    ("USD", "US Dollar"),
    ("EUR", "Euro"),
    ("GBP", "British Pound"),
    ("CHF", "Swiss Franc"),
    ("JPY", "Japanese Yen"),
    ("AUD", "Australian Dollar"),
    ("CAD", "Canadian Dollar"),
    ("SEK", "Swedish Krona"),
    ("NOK", "Norwegian Krone"),
    ("DKK", "Danish Krone"),
    ("TRY", "Turkish Lira"),
    ("CNY", "Chinese Yuan"),
    ("CNH", "Chinese Yuan (Offshore)"),
    ("BGN", "Bulgarian Lev"),
    ("HUF", "Hungarian Forint"),
    ("RUB", "Russian Ruble"),
    ("HRK", "Croatian Kuna"),
    ("CZK", "Czech Koruna"),
    ("MKD", "Macedonian Denar"),
    ("SDR", "Special Drawing Rights"),
    ("XAU", "Gold (Ounce)"),
    ("XAG", "Silver (Ounce)"),
];

/// Currencies the source quotes per 100 units.
const PER_HUNDRED_CURRENCIES: &[&str] = &["JPY", "HUF", "RUB"];

/// Outcome of resolving one currency label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// ISO 4217 code, or the raw label when unresolved
    pub code: String,
    /// Canonical English name; falls back to the code for unknown currencies
    pub canonical_name: String,
    /// Units of foreign currency the rate is quoted per (1 or 100)
    pub unit_multiplier: i32,
    /// Whether the label matched the registry or passed through as a code
    pub resolved: bool,
}

/// Resolve a currency label from the fixing page into an ISO code.
pub fn resolve(label: &str) -> Resolution {
    let trimmed = label.trim();

    if let Some(code) = lookup_code(trimmed) {
        return resolution_for(code, true);
    }

    // A bare ISO code in the label column passes through as-is.
    if trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_uppercase()) {
        return resolution_for(trimmed, true);
    }

    Resolution {
        code: trimmed.to_string(),
        canonical_name: trimmed.to_string(),
        unit_multiplier: 1,
        resolved: false,
    }
}

/// Look up the unit multiplier for an ISO code.
pub fn unit_multiplier(code: &str) -> i32 {
    if PER_HUNDRED_CURRENCIES.contains(&code) {
        100
    } else {
        1
    }
}

/// Canonical English name for an ISO code; the code itself when unknown.
pub fn canonical_name(code: &str) -> String {
    CANONICAL_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| code.to_string())
}

fn resolution_for(code: &str, resolved: bool) -> Resolution {
    Resolution {
        code: code.to_string(),
        canonical_name: canonical_name(code),
        unit_multiplier: unit_multiplier(code),
        resolved,
    }
}

fn lookup_code(label: &str) -> Option<&'static str> {
    // Exact match first.
    if let Some((_, code)) = LOCALIZED_NAMES.iter().find(|(name, _)| *name == label) {
        return Some(code);
    }

    // Then a case-insensitive substring match in either direction.
    let label_lower = label.to_lowercase();
    if label_lower.is_empty() {
        return None;
    }
    LOCALIZED_NAMES
        .iter()
        .find(|(name, _)| {
            let name_lower = name.to_lowercase();
            name_lower.contains(&label_lower) || label_lower.contains(&name_lower)
        })
        .map(|(_, code)| *code)
}
