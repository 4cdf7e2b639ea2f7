use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::normalize::{clean_label, lookup_key};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Stable identity of a row within its workbook. Rows are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Origin {
    pub sheet: String,
    pub row: usize,
}

impl Origin {
    pub fn new(sheet: impl Into<String>, row: usize) -> Self {
        Self { sheet: sheet.into(), row }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.sheet, self.row)
    }
}

/// Period key -> value. `None` marks a period column that is present but blank.
pub type ValueSeries = BTreeMap<String, Option<f64>>;

// ---------------------------------------------------------------------------
// Input rows
// ---------------------------------------------------------------------------

/// One row as pulled from a sheet: its label cell plus its period cells.
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    pub row: usize,
    pub label: String,
    pub values: ValueSeries,
}

impl RawRow {
    pub fn new(row: usize, label: impl Into<String>) -> Self {
        Self { row, label: label.into(), values: ValueSeries::new() }
    }

    pub fn with_value(mut self, period: &str, value: Option<f64>) -> Self {
        self.values.insert(period.to_string(), value);
        self
    }

    /// True when at least one period carries a number.
    pub fn has_values(&self) -> bool {
        self.values.values().any(Option::is_some)
    }
}

// ---------------------------------------------------------------------------
// Scoped entity
// ---------------------------------------------------------------------------

/// Header texts enclosing a data row, outermost first. Texts are trimmed
/// header labels with any trailing colon removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeContext {
    pub statement: Option<String>,
    pub section: Option<String>,
    pub subsection: Option<String>,
}

const PERCENT_MARKERS: &[&str] = &["% of total", "percent", "(%)"];

/// A data row enriched with its hierarchical address. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedEntity {
    origin: Origin,
    raw_label: String,
    normalized_name: String,
    scope_path: Vec<String>,
    value_series: ValueSeries,
    is_percentage_context: bool,
    context: ScopeContext,
}

impl ScopedEntity {
    pub fn new(
        origin: Origin,
        raw_label: impl Into<String>,
        context: ScopeContext,
        value_series: ValueSeries,
    ) -> Self {
        let raw_label = raw_label.into();
        let mut normalized_name = clean_label(&raw_label);
        if normalized_name.is_empty() {
            normalized_name = "Unknown_Field".to_string();
        }

        let mut scope_path: Vec<String> = [&context.statement, &context.section, &context.subsection]
            .into_iter()
            .flatten()
            .map(|s| clean_label(s))
            .filter(|s| !s.is_empty())
            .collect();
        scope_path.push(normalized_name.clone());

        let is_percentage_context = context.section.as_deref().is_some_and(|s| {
            let key = lookup_key(s);
            PERCENT_MARKERS.iter().any(|m| key.contains(m))
        });

        Self {
            origin,
            raw_label,
            normalized_name,
            scope_path,
            value_series,
            is_percentage_context,
            context,
        }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn raw_label(&self) -> &str {
        &self.raw_label
    }

    pub fn normalized_name(&self) -> &str {
        &self.normalized_name
    }

    pub fn scope_path(&self) -> &[String] {
        &self.scope_path
    }

    pub fn value_series(&self) -> &ValueSeries {
        &self.value_series
    }

    pub fn is_percentage_context(&self) -> bool {
        self.is_percentage_context
    }

    pub fn context(&self) -> &ScopeContext {
        &self.context
    }

    /// Innermost grouping header used for section-level synonym lookup:
    /// the section when one is active, else the statement.
    pub fn section_text(&self) -> Option<&str> {
        self.context.section.as_deref().or(self.context.statement.as_deref())
    }

    pub fn value_at(&self, period: &str) -> Option<f64> {
        self.value_series.get(period).copied().flatten()
    }

    pub fn has_values(&self) -> bool {
        self.value_series.values().any(Option::is_some)
    }
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchMethod {
    ExactName,
    Synonym,
    ScopeSimilarity,
    Specialized,
    HistoricalVerification,
    SignFlippedVerification,
    Composite,
}

impl MatchMethod {
    pub fn is_verification(self) -> bool {
        matches!(self, Self::HistoricalVerification | Self::SignFlippedVerification)
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExactName => write!(f, "EXACT_NAME"),
            Self::Synonym => write!(f, "SYNONYM"),
            Self::ScopeSimilarity => write!(f, "SCOPE_SIMILARITY"),
            Self::Specialized => write!(f, "SPECIALIZED"),
            Self::HistoricalVerification => write!(f, "HISTORICAL_VERIFICATION"),
            Self::SignFlippedVerification => write!(f, "SIGN_FLIPPED_VERIFICATION"),
            Self::Composite => write!(f, "COMPOSITE"),
        }
    }
}

/// Per-heuristic breakdown behind a scorer candidate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SubScores {
    pub exact: f64,
    pub synonym: f64,
    pub scope: f64,
    pub specialized: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub source: Origin,
    pub destination: Origin,
    pub score: f64,
    pub method: MatchMethod,
    pub rationale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_scores: Option<SubScores>,
}

// ---------------------------------------------------------------------------
// Assignments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "origins", rename_all = "snake_case")]
pub enum SourceRef {
    Single(Origin),
    Composite(Vec<Origin>),
}

impl SourceRef {
    pub fn origins(&self) -> &[Origin] {
        match self {
            Self::Single(o) => std::slice::from_ref(o),
            Self::Composite(os) => os,
        }
    }

    /// Sheet the reference is anchored on (first origin).
    pub fn sheet(&self) -> &str {
        self.origins().first().map_or("", |o| o.sheet.as_str())
    }

    /// Row expression for provenance: `30`, or `30+31+32+33` for composites.
    /// Rows on a sheet other than the anchor sheet are written `Sheet!row`.
    pub fn row_expression(&self) -> String {
        let anchor = self.sheet();
        self.origins()
            .iter()
            .map(|o| {
                if o.sheet == anchor {
                    o.row.to_string()
                } else {
                    o.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("+")
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.sheet(), self.row_expression())
    }
}

/// Resolved mapping: one destination row fed by one source reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub destination: Origin,
    pub source: SourceRef,
    pub method: MatchMethod,
    pub confidence: f64,
    pub rationale: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    Populated,
    NoSourceData,
    NoMatch,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Populated => write!(f, "POPULATED"),
            Self::NoSourceData => write!(f, "NO_SOURCE_DATA"),
            Self::NoMatch => write!(f, "NO_MATCH"),
        }
    }
}

/// One row of the audit trail. Flat so it serializes straight to CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub destination_sheet: String,
    pub destination_row: usize,
    pub destination_label: String,
    pub source: String,
    pub method: Option<MatchMethod>,
    pub confidence: Option<f64>,
    pub status: OutcomeStatus,
    pub value: Option<f64>,
    pub previous_value: Option<String>,
    pub provenance: String,
    pub notes: String,
}

impl AuditRecord {
    pub fn no_match(destination: &Origin, label: &str) -> Self {
        Self {
            destination_sheet: destination.sheet.clone(),
            destination_row: destination.row,
            destination_label: label.to_string(),
            source: String::new(),
            method: None,
            confidence: None,
            status: OutcomeStatus::NoMatch,
            value: None,
            previous_value: None,
            provenance: String::new(),
            notes: "no candidate above threshold".to_string(),
        }
    }

    pub fn destination(&self) -> Origin {
        Origin::new(self.destination_sheet.clone(), self.destination_row)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticKind {
    UnresolvableRow,
    CompositeComponentMissing,
    StaleCacheEntry,
}

/// Degraded, non-fatal condition noticed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconSummary {
    pub total: usize,
    pub populated: usize,
    pub overwritten: usize,
    pub no_source_data: usize,
    pub no_match: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_source_sheet: BTreeMap<String, usize>,
    pub by_method: BTreeMap<String, usize>,
}

/// What the writer produced for a batch of assignments.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PopulationReport {
    pub records: Vec<AuditRecord>,
    pub summary: ReconSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub target_period: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub historical_period: Option<String>,
    pub dry_run: bool,
    pub source_entities: usize,
    pub destination_entities: usize,
    pub candidates: usize,
    /// SHA-256 of the audit CSV; equal inputs give equal fingerprints.
    pub audit_sha256: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub summary: ReconSummary,
    pub assignments: Vec<Assignment>,
    pub audit: Vec<AuditRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ReconResult {
    /// Source origins used by more than one single-source assignment.
    pub fn reused_sources(&self) -> BTreeSet<Origin> {
        let mut seen = BTreeSet::new();
        let mut reused = BTreeSet::new();
        for a in &self.assignments {
            if let SourceRef::Single(o) = &a.source {
                if !seen.insert(o.clone()) {
                    reused.insert(o.clone());
                }
            }
        }
        reused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(statement: &str, section: Option<&str>, subsection: Option<&str>) -> ScopeContext {
        ScopeContext {
            statement: Some(statement.into()),
            section: section.map(Into::into),
            subsection: subsection.map(Into::into),
        }
    }

    #[test]
    fn scope_path_ends_with_field() {
        let e = ScopedEntity::new(
            Origin::new("Balance Sheet", 5),
            "Cash",
            ctx("Balance Sheet", Some("Assets"), None),
            ValueSeries::new(),
        );
        assert_eq!(e.scope_path(), ["Balance_Sheet", "Assets", "Cash"]);
        assert_eq!(e.normalized_name(), "Cash");
        assert!(!e.has_values());
    }

    #[test]
    fn blank_label_still_has_a_path() {
        let e = ScopedEntity::new(Origin::new("S", 1), "!!", ScopeContext::default(), ValueSeries::new());
        assert_eq!(e.scope_path(), ["Unknown_Field"]);
    }

    #[test]
    fn percentage_context_comes_from_section() {
        let pct = ScopedEntity::new(
            Origin::new("Key Metrics", 9),
            "Germany",
            ctx("Key Metrics", Some("Revenue by region (% of total)"), None),
            ValueSeries::new(),
        );
        let abs = ScopedEntity::new(
            Origin::new("Key Metrics", 4),
            "Germany",
            ctx("Key Metrics", Some("Revenue by region"), None),
            ValueSeries::new(),
        );
        assert!(pct.is_percentage_context());
        assert!(!abs.is_percentage_context());
    }

    #[test]
    fn composite_row_expression() {
        let r = SourceRef::Composite(vec![
            Origin::new("Balance Sheet", 30),
            Origin::new("Balance Sheet", 31),
            Origin::new("Other", 2),
        ]);
        assert_eq!(r.row_expression(), "30+31+Other!2");
        assert_eq!(r.sheet(), "Balance Sheet");
        assert_eq!(SourceRef::Single(Origin::new("Cash Flows", 7)).to_string(), "Cash Flows!7");
    }
}
