use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use crate::error::ReconError;
use crate::model::Origin;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    pub name: String,
    pub source: WorkbookConfig,
    pub destination: DestinationConfig,
    pub periods: PeriodConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub scope: ScopeConfig,
    #[serde(default)]
    pub equivalences: EquivalenceConfig,
    #[serde(default)]
    pub composites: Vec<CompositeConfig>,
    /// Source rows allowed to feed one absolute and one percentage destination.
    #[serde(default)]
    pub multi_context: Vec<Origin>,
    #[serde(default)]
    pub cache: Option<CacheConfig>,
}

// ---------------------------------------------------------------------------
// Workbooks
// ---------------------------------------------------------------------------

/// Where a workbook's rows live and how its columns map to periods.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkbookConfig {
    pub file: String,
    pub sheets: Vec<String>,
    #[serde(default = "default_label_column")]
    pub label_column: usize,
    /// Row holding period headers (`1Q24`, `2024-03-31`, ...). Optional when
    /// `periods` lists every column explicitly.
    #[serde(default)]
    pub header_row: Option<usize>,
    /// Explicit period key -> 1-based column. Wins over header detection.
    #[serde(default)]
    pub periods: BTreeMap<String, usize>,
}

fn default_label_column() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct DestinationConfig {
    #[serde(flatten)]
    pub workbook: WorkbookConfig,
    /// Column receiving populated values.
    pub target_column: usize,
    /// Column receiving provenance strings. Defaults to `target_column + 1`.
    #[serde(default)]
    pub tracking_column: Option<usize>,
    /// Where adapters save the populated workbook.
    #[serde(default)]
    pub output: Option<String>,
}

impl DestinationConfig {
    pub fn tracking_column(&self) -> usize {
        self.tracking_column.unwrap_or(self.target_column + 1)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeriodConfig {
    /// Period being populated.
    pub target: String,
    /// Settled period used as the verification anchor.
    #[serde(default)]
    pub historical: Option<String>,
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub weights: ScoreWeights,
    #[serde(default)]
    pub bonuses: SpecializedBonuses,
    /// Segment similarity above which a scope segment counts half.
    #[serde(default = "default_similarity_cutoff")]
    pub similarity_cutoff: f64,
    /// Multiplier when one side is a percentage section and the other is not.
    #[serde(default = "default_context_penalty")]
    pub context_mismatch_penalty: f64,
    #[serde(default = "default_true")]
    pub sign_flip_fallback: bool,
    #[serde(default = "default_sign_flip_confidence")]
    pub sign_flip_confidence: f64,
    /// Bonus added to a pair remembered in the mapping cache.
    #[serde(default = "default_cache_bonus")]
    pub cache_bonus: f64,
}

fn default_threshold() -> f64 {
    0.6
}

fn default_similarity_cutoff() -> f64 {
    0.8
}

fn default_context_penalty() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

fn default_sign_flip_confidence() -> f64 {
    0.9
}

fn default_cache_bonus() -> f64 {
    0.1
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            weights: ScoreWeights::default(),
            bonuses: SpecializedBonuses::default(),
            similarity_cutoff: default_similarity_cutoff(),
            context_mismatch_penalty: default_context_penalty(),
            sign_flip_fallback: true,
            sign_flip_confidence: default_sign_flip_confidence(),
            cache_bonus: default_cache_bonus(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ScoreWeights {
    #[serde(default = "default_exact_weight")]
    pub exact: f64,
    #[serde(default = "default_synonym_weight")]
    pub synonym: f64,
    #[serde(default = "default_scope_weight")]
    pub scope: f64,
}

fn default_exact_weight() -> f64 {
    0.5
}

fn default_synonym_weight() -> f64 {
    0.4
}

fn default_scope_weight() -> f64 {
    0.1
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            exact: default_exact_weight(),
            synonym: default_synonym_weight(),
            scope: default_scope_weight(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SpecializedBonuses {
    #[serde(default = "default_region_bonus")]
    pub region: f64,
    #[serde(default = "default_product_bonus")]
    pub product: f64,
    #[serde(default = "default_financial_bonus")]
    pub financial_term: f64,
}

fn default_region_bonus() -> f64 {
    0.3
}

fn default_product_bonus() -> f64 {
    0.3
}

fn default_financial_bonus() -> f64 {
    0.2
}

impl Default for SpecializedBonuses {
    fn default() -> Self {
        Self {
            region: default_region_bonus(),
            product: default_product_bonus(),
            financial_term: default_financial_bonus(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scope builder knobs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ScopeConfig {
    /// Label prefixes of company-name banners, skipped as boilerplate.
    #[serde(default)]
    pub banner_prefixes: Vec<String>,
    /// Exact labels that only introduce column headers.
    #[serde(default = "default_header_labels")]
    pub header_labels: Vec<String>,
}

fn default_header_labels() -> Vec<String> {
    ["quarter ended", "cumulative quarter ended", "reported", "quarterly", "in 000 usd"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            banner_prefixes: Vec::new(),
            header_labels: default_header_labels(),
        }
    }
}

// ---------------------------------------------------------------------------
// Equivalences + composites + cache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct EquivalenceConfig {
    /// Merge the built-in table under the configured rules.
    #[serde(default = "default_true")]
    pub use_defaults: bool,
    #[serde(default)]
    pub sections: Vec<RuleConfig>,
    #[serde(default)]
    pub fields: Vec<RuleConfig>,
    /// Extra region names for the specialized bonus.
    #[serde(default)]
    pub regions: Vec<String>,
    /// Extra product/application names for the specialized bonus.
    #[serde(default)]
    pub products: Vec<String>,
}

impl Default for EquivalenceConfig {
    fn default() -> Self {
        Self {
            use_defaults: true,
            sections: Vec::new(),
            fields: Vec::new(),
            regions: Vec::new(),
            products: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    pub source: String,
    pub destination: String,
    #[serde(default = "default_rule_weight")]
    pub weight: f64,
}

fn default_rule_weight() -> f64 {
    1.0
}

/// A destination row declared to be the sum of named source rows.
#[derive(Debug, Clone, Deserialize)]
pub struct CompositeConfig {
    pub destination: Origin,
    pub sources: Vec<Origin>,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub file: String,
    /// Rewrite the cache with this run's single-source assignments.
    #[serde(default = "default_true")]
    pub update: bool,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let invalid = |msg: String| Err(ReconError::ConfigValidation(msg));

        validate_workbook("source", &self.source)?;
        validate_workbook("destination", &self.destination.workbook)?;

        let dest = &self.destination;
        if dest.target_column == 0 {
            return invalid("destination.target_column must be >= 1".into());
        }
        if dest.tracking_column() == dest.target_column {
            return invalid("destination.tracking_column must differ from target_column".into());
        }
        if dest.tracking_column() == dest.workbook.label_column
            || dest.target_column == dest.workbook.label_column
        {
            return invalid("destination target/tracking columns must not overwrite labels".into());
        }

        if self.periods.target.trim().is_empty() {
            return invalid("periods.target must not be empty".into());
        }
        if self.periods.historical.as_deref() == Some(self.periods.target.as_str()) {
            return invalid("periods.historical must differ from periods.target".into());
        }
        if self.source.header_row.is_none()
            && !self.source.periods.contains_key(&self.periods.target)
        {
            return invalid(format!(
                "source has no column for target period '{}' (add it to source.periods or set source.header_row)",
                self.periods.target
            ));
        }

        let m = &self.matching;
        if !(m.threshold > 0.0 && m.threshold <= 1.0) {
            return invalid(format!("matching.threshold must be in (0, 1], got {}", m.threshold));
        }
        if m.weights.exact < 0.4 || m.weights.synonym < 0.4 {
            return invalid("matching.weights: exact and synonym weights must each be >= 0.4".into());
        }
        if m.weights.scope < 0.0 {
            return invalid("matching.weights.scope must be >= 0".into());
        }
        if !(0.0..=1.0).contains(&m.similarity_cutoff) {
            return invalid("matching.similarity_cutoff must be in [0, 1]".into());
        }
        if !(0.0..=1.0).contains(&m.context_mismatch_penalty) {
            return invalid("matching.context_mismatch_penalty must be in [0, 1]".into());
        }
        if !(m.sign_flip_confidence > 0.0 && m.sign_flip_confidence < 1.0) {
            return invalid("matching.sign_flip_confidence must be in (0, 1)".into());
        }
        if !(0.0..=1.0).contains(&m.cache_bonus) {
            return invalid("matching.cache_bonus must be in [0, 1]".into());
        }

        for rule in self.equivalences.sections.iter().chain(&self.equivalences.fields) {
            if !(rule.weight > 0.0 && rule.weight <= 1.0) {
                return invalid(format!(
                    "equivalence '{}' -> '{}': weight must be in (0, 1]",
                    rule.source, rule.destination
                ));
            }
        }

        let mut composite_dests = BTreeSet::new();
        let mut composite_groups = BTreeSet::new();
        for c in &self.composites {
            if c.sources.is_empty() {
                return invalid(format!("composite for {}: no source rows declared", c.destination));
            }
            if !dest.workbook.sheets.contains(&c.destination.sheet) {
                return invalid(format!(
                    "composite for {}: sheet is not a declared destination sheet",
                    c.destination
                ));
            }
            if !composite_dests.insert(c.destination.clone()) {
                return invalid(format!("composite for {} declared twice", c.destination));
            }
            let group: BTreeSet<&Origin> = c.sources.iter().collect();
            if group.len() != c.sources.len() {
                return invalid(format!("composite for {}: repeated source row", c.destination));
            }
            if !composite_groups.insert(group) {
                return invalid(format!(
                    "composite for {}: source group already consumed by another composite",
                    c.destination
                ));
            }
        }

        Ok(())
    }
}

fn validate_workbook(role: &str, wb: &WorkbookConfig) -> Result<(), ReconError> {
    if wb.sheets.is_empty() {
        return Err(ReconError::ConfigValidation(format!("{role}.sheets must list at least one sheet")));
    }
    if wb.label_column == 0 {
        return Err(ReconError::ConfigValidation(format!("{role}.label_column must be >= 1")));
    }
    if wb.header_row == Some(0) {
        return Err(ReconError::ConfigValidation(format!("{role}.header_row must be >= 1")));
    }
    for (period, col) in &wb.periods {
        if *col == 0 || *col == wb.label_column {
            return Err(ReconError::ConfigValidation(format!(
                "{role}.periods.{period}: column {col} is not a value column"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
name = "IPGP 2024-Q2"

[source]
file = "source.xlsx"
sheets = ["Key Metrics", "Balance Sheet"]
header_row = 3

[destination]
file = "dest.xlsx"
sheets = ["Reported"]
target_column = 71

[destination.periods]
"2024_Q1" = 70

[periods]
target = "2024_Q2"
historical = "2024_Q1"
"#;

    #[test]
    fn parse_valid_with_defaults() {
        let config = ReconConfig::from_toml(VALID).unwrap();
        assert_eq!(config.name, "IPGP 2024-Q2");
        assert_eq!(config.source.label_column, 1);
        assert_eq!(config.source.header_row, Some(3));
        assert_eq!(config.destination.workbook.periods["2024_Q1"], 70);
        assert_eq!(config.destination.tracking_column(), 72);
        assert_eq!(config.periods.historical.as_deref(), Some("2024_Q1"));
        assert!((config.matching.threshold - 0.6).abs() < 1e-12);
        assert!(config.matching.sign_flip_fallback);
        assert!(config.equivalences.use_defaults);
        assert!(config.composites.is_empty());
        assert!(config.cache.is_none());
    }

    #[test]
    fn parse_composites_and_rules() {
        let input = format!(
            r#"{VALID}

[[equivalences.sections]]
source = "Revenue by product"
destination = "Segment breakdown"

[[equivalences.fields]]
source = "Laser and non-laser systems"
destination = "Systems"
weight = 0.9

[[composites]]
destination = {{ sheet = "Reported", row = 140 }}
sources = [
  {{ sheet = "Balance Sheet", row = 30 }},
  {{ sheet = "Balance Sheet", row = 31 }},
]
label = "Accrued expenses and other liabilities"

[cache]
file = "mapping_cache.csv"
"#
        );
        let config = ReconConfig::from_toml(&input).unwrap();
        assert_eq!(config.equivalences.sections.len(), 1);
        assert!((config.equivalences.sections[0].weight - 1.0).abs() < 1e-12);
        assert!((config.equivalences.fields[0].weight - 0.9).abs() < 1e-12);
        assert_eq!(config.composites[0].sources.len(), 2);
        assert_eq!(config.composites[0].destination, Origin::new("Reported", 140));
        assert!(config.cache.unwrap().update);
    }

    #[test]
    fn reject_weak_exact_weight() {
        let input = format!("{VALID}\n[matching.weights]\nexact = 0.2\n");
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains(">= 0.4"));
    }

    #[test]
    fn reject_missing_target_period_column() {
        let input = VALID.replace("header_row = 3", "");
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("2024_Q2"));
    }

    #[test]
    fn reject_tracking_equal_to_target() {
        let input = VALID.replace("target_column = 71", "target_column = 71\ntracking_column = 71");
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("tracking_column"));
    }

    #[test]
    fn reject_duplicate_composite_group() {
        let input = format!(
            r#"{VALID}
[[composites]]
destination = {{ sheet = "Reported", row = 140 }}
sources = [{{ sheet = "Balance Sheet", row = 30 }}, {{ sheet = "Balance Sheet", row = 31 }}]

[[composites]]
destination = {{ sheet = "Reported", row = 141 }}
sources = [{{ sheet = "Balance Sheet", row = 31 }}, {{ sheet = "Balance Sheet", row = 30 }}]
"#
        );
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("already consumed"));
    }

    #[test]
    fn reject_composite_on_undeclared_sheet() {
        let input = format!(
            r#"{VALID}
[[composites]]
destination = {{ sheet = "Elsewhere", row = 2 }}
sources = [{{ sheet = "Balance Sheet", row = 30 }}]
"#
        );
        assert!(ReconConfig::from_toml(&input).is_err());
    }

    #[test]
    fn reject_bad_toml() {
        let err = ReconConfig::from_toml("name = ").unwrap_err();
        assert!(matches!(err, ReconError::ConfigParse(_)));
    }
}
