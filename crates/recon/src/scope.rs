//! Scope Builder: turns a sheet's rows into scoped entities.
//!
//! Rows are walked top to bottom with a `[statement, section, subsection]`
//! context stack. Each row goes through an ordered classifier; header rows
//! move the stack, data rows become [`ScopedEntity`]s carrying the stack as
//! their scope path.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::{ScopeConfig, WorkbookConfig};
use crate::model::{Diagnostic, DiagnosticKind, Origin, RawRow, ScopeContext, ScopedEntity};
use crate::normalize::{clean_label, lookup_key, parse_date, period_key_from_header};
use crate::store::TabularSource;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Statement titles, compared after [`statement_key`] normalization.
const STATEMENT_TITLES: &[&str] = &[
    "income statement",
    "statement of income",
    "statement of operations",
    "statement of comprehensive income",
    "profit and loss",
    "profit and loss statement",
    "balance sheet",
    "balance sheets",
    "statement of financial position",
    "cash flow",
    "cash flows",
    "cash flow statement",
    "statement of cash flows",
    "statement of equity",
    "statement of shareholders' equity",
    "statement of stockholders' equity",
    "shareholders' equity",
    "stockholders' equity",
];

/// Phrases that make a label row a section header. Matched on word boundaries.
const SECTION_PHRASES: &[&str] = &[
    "revenue",
    "revenues",
    "net sales",
    "cost of",
    "operating expenses",
    "assets",
    "liabilities",
    "equity",
    "operating activities",
    "investing activities",
    "financing activities",
    "breakdown",
    "mix",
    "by region",
    "by application",
    "by product",
    "by market",
    "information",
    "metrics",
];

const SUBSECTION_SUFFIX: &str = ", of which";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Blank,
    Formula,
    DateOnly,
    Banner,
    HeaderLabel,
    NoLabelText,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blank => write!(f, "blank label"),
            Self::Formula => write!(f, "formula-only label"),
            Self::DateOnly => write!(f, "date-only label"),
            Self::Banner => write!(f, "banner"),
            Self::HeaderLabel => write!(f, "column header label"),
            Self::NoLabelText => write!(f, "label without words"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    StatementHeader,
    SectionHeader,
    SubsectionHeader,
    DataField,
    Skip(SkipReason),
}

/// Ordered row classifier. Boilerplate is checked first, then (for label
/// rows only) statement, section and subsection rules, in that order.
#[derive(Debug, Clone)]
pub struct RowClassifier {
    banner_prefixes: Vec<String>,
    header_labels: Vec<String>,
}

impl Default for RowClassifier {
    fn default() -> Self {
        Self::from_config(&ScopeConfig::default())
    }
}

impl RowClassifier {
    pub fn from_config(config: &ScopeConfig) -> Self {
        let keys = |items: &[String]| {
            items
                .iter()
                .map(|s| lookup_key(s))
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        };
        Self {
            banner_prefixes: keys(&config.banner_prefixes),
            header_labels: keys(&config.header_labels),
        }
    }

    pub fn classify(&self, row: &RawRow) -> RowKind {
        if let Some(reason) = self.skip_reason(&row.label) {
            return RowKind::Skip(reason);
        }
        if row.has_values() {
            return RowKind::DataField;
        }

        let key = lookup_key(&row.label);
        let ends_with_colon = key.ends_with(':');
        if !ends_with_colon && STATEMENT_TITLES.contains(&statement_key(&row.label).as_str()) {
            return RowKind::StatementHeader;
        }
        if SECTION_PHRASES.iter().any(|p| contains_phrase(&key, p)) {
            return RowKind::SectionHeader;
        }
        if ends_with_colon || key.ends_with(SUBSECTION_SUFFIX) {
            return RowKind::SubsectionHeader;
        }
        RowKind::DataField
    }

    fn skip_reason(&self, label: &str) -> Option<SkipReason> {
        let text = label.trim();
        if text.is_empty() {
            return Some(SkipReason::Blank);
        }
        if text.starts_with('=') {
            return Some(SkipReason::Formula);
        }
        if parse_date(text).is_some() {
            return Some(SkipReason::DateOnly);
        }
        let key = lookup_key(text);
        if self.banner_prefixes.iter().any(|p| key.starts_with(p.as_str())) {
            return Some(SkipReason::Banner);
        }
        let bare = key.trim_end_matches(':').trim_end();
        if self.header_labels.iter().any(|h| h == bare) {
            return Some(SkipReason::HeaderLabel);
        }
        if clean_label(text).is_empty() {
            return Some(SkipReason::NoLabelText);
        }
        None
    }
}

/// Lookup key with parentheticals and the qualifiers "consolidated",
/// "condensed", "unaudited" and "interim" removed, "statements" singularized.
fn statement_key(text: &str) -> String {
    lookup_key(&strip_parentheticals(text))
        .split(' ')
        .filter(|w| !matches!(*w, "consolidated" | "condensed" | "unaudited" | "interim"))
        .map(|w| if w == "statements" { "statement" } else { w })
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_parentheticals(text: &str) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut depth = 0usize;
    for ch in text.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => stripped.push(ch),
            _ => {}
        }
    }
    stripped.trim().to_string()
}

fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let boundary = |c: Option<char>| c.map_or(true, |c| !c.is_alphanumeric());
    haystack.match_indices(phrase).any(|(at, _)| {
        boundary(haystack[..at].chars().next_back())
            && boundary(haystack[at + phrase.len()..].chars().next())
    })
}

/// Header text as stored on the stack: trimmed, trailing `:` and
/// `, of which` removed.
fn header_text(label: &str) -> String {
    let t = label.trim().trim_end_matches(':').trim_end();
    let cut = t.len().saturating_sub(SUBSECTION_SUFFIX.len());
    if t.is_char_boundary(cut) && t[cut..].eq_ignore_ascii_case(SUBSECTION_SUFFIX) {
        t[..cut].trim_end().to_string()
    } else {
        t.to_string()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ScopeOutcome {
    pub entities: Vec<ScopedEntity>,
    pub skipped: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default)]
pub struct ScopeBuilder {
    classifier: RowClassifier,
}

impl ScopeBuilder {
    pub fn new(classifier: RowClassifier) -> Self {
        Self { classifier }
    }

    pub fn from_config(config: &ScopeConfig) -> Self {
        Self::new(RowClassifier::from_config(config))
    }

    /// Scope the rows of one sheet. The statement level is seeded from the
    /// sheet name.
    pub fn build(&self, sheet_name: &str, rows: &[RawRow]) -> ScopeOutcome {
        let mut context = ScopeContext {
            statement: Some(sheet_name.trim().to_string()).filter(|s| !s.is_empty()),
            section: None,
            subsection: None,
        };
        let mut outcome = ScopeOutcome::default();

        for row in rows {
            let origin = Origin::new(sheet_name, row.row);
            match self.classifier.classify(row) {
                RowKind::StatementHeader => {
                    context = ScopeContext {
                        statement: Some(strip_parentheticals(&header_text(&row.label))),
                        section: None,
                        subsection: None,
                    };
                }
                RowKind::SectionHeader => {
                    context.section = Some(header_text(&row.label));
                    context.subsection = None;
                }
                RowKind::SubsectionHeader => {
                    context.subsection = Some(header_text(&row.label));
                }
                RowKind::DataField => {
                    outcome.entities.push(ScopedEntity::new(
                        origin,
                        row.label.trim(),
                        context.clone(),
                        row.values.clone(),
                    ));
                }
                RowKind::Skip(reason) => {
                    log::debug!("{origin}: skipped ({reason}) '{}'", row.label.trim());
                    outcome.skipped.push(Diagnostic {
                        kind: DiagnosticKind::UnresolvableRow,
                        origin: Some(origin),
                        message: format!("{reason}: '{}'", row.label.trim()),
                    });
                }
            }
        }

        outcome
    }
}

// ---------------------------------------------------------------------------
// Reading rows through the store
// ---------------------------------------------------------------------------

/// Where labels and period values sit on a sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLayout {
    pub label_column: usize,
    pub header_row: Option<usize>,
    /// Explicit period key -> column. Overrides detected headers.
    pub periods: BTreeMap<String, usize>,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self { label_column: 1, header_row: None, periods: BTreeMap::new() }
    }
}

impl SheetLayout {
    pub fn from_config(config: &WorkbookConfig) -> Self {
        Self {
            label_column: config.label_column,
            header_row: config.header_row,
            periods: config.periods.clone(),
        }
    }

    /// Period columns for one sheet: detected from the header row, then
    /// overlaid with explicit columns.
    pub fn resolve_periods<S: TabularSource + ?Sized>(&self, source: &S, sheet: &str) -> BTreeMap<String, usize> {
        let mut periods = match self.header_row {
            Some(header_row) => detect_periods(source, sheet, header_row, self.label_column),
            None => BTreeMap::new(),
        };
        for (key, col) in &self.periods {
            periods.insert(key.clone(), *col);
        }
        periods
    }
}

/// Read a header row and map each recognizable period header to its column.
/// When two columns carry the same period, the leftmost wins.
pub fn detect_periods<S: TabularSource + ?Sized>(
    source: &S,
    sheet: &str,
    header_row: usize,
    label_column: usize,
) -> BTreeMap<String, usize> {
    let mut periods = BTreeMap::new();
    for col in 1..=source.max_column(sheet) {
        if col == label_column {
            continue;
        }
        let text = source.get_cell(sheet, header_row, col).as_text();
        if let Some(key) = period_key_from_header(&text) {
            periods.entry(key).or_insert(col);
        }
    }
    periods
}

/// Pull label + period cells for every non-blank row of a sheet. The header
/// row itself is not returned.
pub fn read_sheet_rows<S: TabularSource + ?Sized>(source: &S, sheet: &str, layout: &SheetLayout) -> Vec<RawRow> {
    let periods = layout.resolve_periods(source, sheet);
    let mut rows = Vec::new();

    for r in 1..=source.max_row(sheet) {
        if Some(r) == layout.header_row {
            continue;
        }
        // A formula label is read as its formula so it can be skipped.
        let label = source
            .get_formula(sheet, r, layout.label_column)
            .unwrap_or_else(|| source.get_cell(sheet, r, layout.label_column).as_text());
        let mut row = RawRow::new(r, label);
        let mut any_cell = false;
        for (period, col) in &periods {
            let cell = source.get_cell(sheet, r, *col);
            any_cell |= !cell.is_empty();
            row.values.insert(period.clone(), cell.as_number());
        }
        if row.label.is_empty() && !any_cell {
            continue;
        }
        rows.push(row);
    }

    rows
}

/// Read and scope one sheet.
pub fn scope_sheet<S: TabularSource + ?Sized>(
    source: &S,
    sheet: &str,
    layout: &SheetLayout,
    builder: &ScopeBuilder,
) -> ScopeOutcome {
    let rows = read_sheet_rows(source, sheet, layout);
    builder.build(sheet, &rows)
}
