//! Label cleaning, lookup keys, numeric parsing and period headers.

use chrono::{Datelike, NaiveDate};

/// Clean a row label into a scope segment: words joined by `_`, punctuation
/// dropped, each word capitalized. `"Accounts receivable, net"` becomes
/// `Accounts_Receivable_Net`.
pub fn clean_label(text: &str) -> String {
    let mut joined = String::with_capacity(text.len());
    let mut pending_sep = false;
    for ch in text.trim().chars() {
        if ch.is_whitespace() || ch == '-' || ch == '_' {
            pending_sep = true;
        } else if ch.is_alphanumeric() {
            if pending_sep && !joined.is_empty() {
                joined.push('_');
            }
            pending_sep = false;
            joined.push(ch);
        }
    }

    joined
        .split('_')
        .map(capitalize)
        .collect::<Vec<_>>()
        .join("_")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Case-insensitive, whitespace-collapsed key for table lookups and
/// name comparison.
pub fn lookup_key(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lookup key of a cleaned label (`Net_Sales` -> `net sales`).
pub fn label_key(cleaned: &str) -> String {
    lookup_key(&cleaned.replace('_', " "))
}

/// String similarity in [0, 1], case-insensitive.
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// Lenient numeric parse for text cells: thousands separators, currency
/// symbols, accounting negatives `(1,234)` and percent suffixes.
pub fn parse_number(text: &str) -> Option<f64> {
    let mut t = text.trim();
    if t.is_empty() {
        return None;
    }

    let mut negative = false;
    if t.starts_with('(') && t.ends_with(')') && t.len() > 2 {
        negative = true;
        t = &t[1..t.len() - 1];
    }

    let mut percent = false;
    if let Some(stripped) = t.strip_suffix('%') {
        percent = true;
        t = stripped;
    }

    let cleaned: String = t
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | ' ' | '\u{a0}'))
        .collect();
    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let mut value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    if percent {
        value /= 100.0;
    }
    if negative {
        value = -value;
    }
    Some(value)
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Parse a date-only cell text. A trailing midnight time (as emitted by
/// spreadsheet exports) is tolerated.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let t = text.trim();
    let t = t
        .strip_suffix(" 00:00:00")
        .or_else(|| t.strip_suffix("T00:00:00"))
        .unwrap_or(t);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(t, fmt).ok())
}

/// Map a column header to a period key.
///
/// `1Q24` / `Q1 2024` / `2024_Q1` / `2024-03-31` all become `2024_Q1`;
/// half-year headers (`1H24`) become `2024_H1`. Returns `None` for anything
/// that is not a period header.
pub fn period_key_from_header(text: &str) -> Option<String> {
    let t = text.trim();
    if t.is_empty() {
        return None;
    }

    if let Some(date) = parse_date(t) {
        let quarter = (date.month() - 1) / 3 + 1;
        return Some(format!("{}_Q{quarter}", date.year()));
    }

    let compact: String = t
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_' | '\'' | '.'))
        .collect::<String>()
        .to_uppercase();
    let bytes = compact.as_bytes();
    if bytes.len() < 4 {
        return None;
    }

    // 1Q24, 2H2024
    if bytes[0].is_ascii_digit() && matches!(bytes[1], b'Q' | b'H') {
        return period_parts(bytes[1], bytes[0], &compact[2..]);
    }
    // Q1 2024, H2'24
    if matches!(bytes[0], b'Q' | b'H') && bytes[1].is_ascii_digit() {
        return period_parts(bytes[0], bytes[1], &compact[2..]);
    }
    // 2024Q1
    if bytes.len() == 6 && matches!(bytes[4], b'Q' | b'H') && bytes[5].is_ascii_digit() {
        return period_parts(bytes[4], bytes[5], &compact[..4]);
    }
    None
}

fn period_parts(kind: u8, ordinal: u8, year: &str) -> Option<String> {
    if !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year = match year.len() {
        2 => {
            let short: u32 = year.parse().ok()?;
            if short < 50 {
                2000 + short
            } else {
                1900 + short
            }
        }
        4 => year.parse().ok()?,
        _ => return None,
    };
    let ordinal = u32::from(ordinal - b'0');
    match kind {
        b'Q' if (1..=4).contains(&ordinal) => Some(format!("{year}_Q{ordinal}")),
        b'H' if (1..=2).contains(&ordinal) => Some(format!("{year}_H{ordinal}")),
        _ => None,
    }
}
