//! Candidate scoring: name, synonym, scope-path and specialized-term
//! heuristics combined into one confidence per (source, destination) pair.

use crate::config::{MatchingConfig, ReconConfig};
use crate::model::{MatchCandidate, MatchMethod, ScopedEntity, SubScores};
use crate::normalize::{label_key, lookup_key, similarity};
use crate::synonyms::EquivalenceTable;

// ---------------------------------------------------------------------------
// Specialized terms
// ---------------------------------------------------------------------------

/// Region names and the spellings that mean the same region.
const REGIONS: &[(&str, &str)] = &[
    ("north america", "north america"),
    ("united states", "north america"),
    ("germany", "germany"),
    ("china", "china"),
    ("japan", "japan"),
    ("europe", "europe"),
    ("asia", "asia"),
    ("korea", "korea"),
    ("world", "world"),
];

const PRODUCTS: &[&str] = &[
    "materials processing",
    "communications",
    "medical",
    "advanced",
    "high-power",
    "pulsed",
    "qcw",
    "systems",
];

const FINANCIAL_TERMS: &[&str] = &["revenue", "total", "income", "sales", "assets", "cash", "expense"];

/// Closed term lists behind the specialized bonus. Each list is searched in
/// order and the first term found in a label stands for that label.
#[derive(Debug, Clone)]
pub struct SpecializedTerms {
    regions: Vec<(String, String)>,
    products: Vec<String>,
    financial: Vec<String>,
}

impl Default for SpecializedTerms {
    fn default() -> Self {
        Self {
            regions: REGIONS.iter().map(|(t, c)| (t.to_string(), c.to_string())).collect(),
            products: PRODUCTS.iter().map(|t| t.to_string()).collect(),
            financial: FINANCIAL_TERMS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl SpecializedTerms {
    /// Built-in lists extended with configured regions and products.
    pub fn with_extra(regions: &[String], products: &[String]) -> Self {
        let mut terms = Self::default();
        for r in regions {
            let key = lookup_key(r);
            if !key.is_empty() {
                terms.regions.push((key.clone(), key));
            }
        }
        terms
            .products
            .extend(products.iter().map(|p| lookup_key(p)).filter(|p| !p.is_empty()));
        terms
    }

    fn region<'a>(&'a self, label: &str) -> Option<&'a str> {
        self.regions
            .iter()
            .find(|(term, _)| label.contains(term.as_str()))
            .map(|(_, canonical)| canonical.as_str())
    }

    /// Sum of the bonuses for each term family in which both labels name
    /// the same term.
    pub fn bonus(&self, source_label: &str, destination_label: &str, config: &MatchingConfig) -> f64 {
        let s = lookup_key(source_label);
        let d = lookup_key(destination_label);
        let first = |list: &[String], label: &str| list.iter().position(|t| label.contains(t.as_str()));

        let mut bonus = 0.0;
        if let (Some(a), Some(b)) = (self.region(&s), self.region(&d)) {
            if a == b {
                bonus += config.bonuses.region;
            }
        }
        if let (Some(a), Some(b)) = (first(&self.products, &s), first(&self.products, &d)) {
            if a == b {
                bonus += config.bonuses.product;
            }
        }
        if let (Some(a), Some(b)) = (first(&self.financial, &s), first(&self.financial, &d)) {
            if a == b {
                bonus += config.bonuses.financial_term;
            }
        }
        bonus
    }
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Scorer {
    table: EquivalenceTable,
    terms: SpecializedTerms,
    config: MatchingConfig,
}

impl Scorer {
    pub fn new(table: EquivalenceTable, terms: SpecializedTerms, config: MatchingConfig) -> Self {
        Self { table, terms, config }
    }

    pub fn from_config(config: &ReconConfig) -> Self {
        let eq = &config.equivalences;
        Self::new(
            EquivalenceTable::from_config(eq),
            SpecializedTerms::with_extra(&eq.regions, &eq.products),
            config.matching.clone(),
        )
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    pub fn table(&self) -> &EquivalenceTable {
        &self.table
    }

    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    pub fn sub_scores(&self, source: &ScopedEntity, destination: &ScopedEntity) -> SubScores {
        let exact = if label_key(source.normalized_name()) == label_key(destination.normalized_name()) {
            1.0
        } else {
            0.0
        };

        let field_weight = if exact > 0.0 {
            1.0
        } else {
            self.table.field_weight(source.raw_label(), destination.raw_label())
        };
        let section_weight = self
            .table
            .section_weight(source.section_text(), destination.section_text());
        let synonym = field_weight.max(0.5 * field_weight + 0.5 * section_weight);

        SubScores {
            exact,
            synonym,
            scope: scope_similarity(
                source.scope_path(),
                destination.scope_path(),
                self.config.similarity_cutoff,
            ),
            specialized: self
                .terms
                .bonus(source.raw_label(), destination.raw_label(), &self.config),
        }
    }

    pub fn score(&self, source: &ScopedEntity, destination: &ScopedEntity) -> MatchCandidate {
        let sub = self.sub_scores(source, destination);
        let w = &self.config.weights;

        let mut score = (w.exact * sub.exact + w.synonym * sub.synonym + w.scope * sub.scope
            + sub.specialized)
            .min(1.0);
        let context_mismatch = source.is_percentage_context() != destination.is_percentage_context();
        if context_mismatch {
            score *= self.config.context_mismatch_penalty;
        }

        let method = if sub.exact > 0.0 {
            MatchMethod::ExactName
        } else if sub.synonym > 0.0 {
            MatchMethod::Synonym
        } else if sub.specialized > 0.0 && sub.specialized >= w.scope * sub.scope {
            MatchMethod::Specialized
        } else {
            MatchMethod::ScopeSimilarity
        };

        let mut rationale = format!(
            "exact={:.2} synonym={:.2} scope={:.2} specialized={:.2}",
            sub.exact, sub.synonym, sub.scope, sub.specialized
        );
        if context_mismatch {
            rationale.push_str("; percentage context mismatch");
        }

        MatchCandidate {
            source: source.origin().clone(),
            destination: destination.origin().clone(),
            score,
            method,
            rationale,
            sub_scores: Some(sub),
        }
    }

    /// Threshold test on the full-precision score. Rounding happens only
    /// when a confidence is reported.
    pub fn accepts(&self, candidate: &MatchCandidate) -> bool {
        candidate.score + 1e-9 >= self.config.threshold
    }

    /// Score every pair and keep those at or above the threshold.
    /// Output is ordered by destination, then source, as given.
    pub fn score_all(&self, sources: &[ScopedEntity], destinations: &[ScopedEntity]) -> Vec<MatchCandidate> {
        let mut kept = Vec::new();
        for d in destinations {
            for s in sources {
                let c = self.score(s, d);
                if self.accepts(&c) {
                    log::debug!("{} <- {}: {:.4} {}", c.destination, c.source, c.score, c.method);
                    kept.push(c);
                }
            }
        }
        kept
    }

    /// Name-level affinity used to break value-verification ties.
    pub fn tie_break(&self, source: &ScopedEntity, destination: &ScopedEntity) -> f64 {
        let sub = self.sub_scores(source, destination);
        sub.synonym + sub.scope
    }
}

/// Positional comparison of two scope paths: an equal segment counts 1, a
/// segment with similarity above `cutoff` counts 0.5. Divided by the longer
/// path length.
pub fn scope_similarity(a: &[String], b: &[String], cutoff: f64) -> f64 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 0.0;
    }
    let points: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| {
            if x.eq_ignore_ascii_case(y) {
                1.0
            } else if similarity(x, y) > cutoff {
                0.5
            } else {
                0.0
            }
        })
        .sum();
    points / longest as f64
}

/// Reporting label for a confidence.
pub fn quality_label(score: f64) -> &'static str {
    if score >= 0.9 {
        "Excellent"
    } else if score >= 0.7 {
        "Good"
    } else if score >= 0.6 {
        "Fair"
    } else {
        "Poor"
    }
}

pub(crate) fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoreWeights;
    use crate::model::{Origin, ScopeContext, ValueSeries};
    use crate::synonyms::RuleKind;

    fn entity(sheet: &str, row: usize, section: Option<&str>, label: &str) -> ScopedEntity {
        ScopedEntity::new(
            Origin::new(sheet, row),
            label,
            ScopeContext {
                statement: Some(sheet.to_string()),
                section: section.map(String::from),
                subsection: None,
            },
            ValueSeries::new(),
        )
    }

    fn scorer() -> Scorer {
        Scorer::new(EquivalenceTable::builtin(), SpecializedTerms::default(), MatchingConfig::default())
    }

    #[test]
    fn exact_name_scores_high() {
        let s = entity("Key Metrics", 4, Some("Revenue by region"), "Germany");
        let d = entity("Reported", 20, Some("Region breakdown"), "Germany");
        let c = scorer().score(&s, &d);
        assert_eq!(c.method, MatchMethod::ExactName);
        assert!((c.score - 1.0).abs() < 1e-9);
        assert_eq!(quality_label(c.score), "Excellent");
    }

    #[test]
    fn percentage_mismatch_is_penalized() {
        let s = entity("Key Metrics", 9, Some("Revenue by region (% of total)"), "Germany");
        let d = entity("Reported", 20, Some("Region breakdown"), "Germany");
        let c = scorer().score(&s, &d);
        assert!((c.score - 0.5).abs() < 1e-9);
        assert!(c.rationale.contains("percentage context mismatch"));
        assert!(!scorer().accepts(&c));
    }

    #[test]
    fn field_synonym_carries_match() {
        let s = entity("Key Metrics", 5, Some("Revenue by region"), "North America");
        let d = entity("Reported", 21, Some("Region breakdown"), "United States and other North America");
        let c = scorer().score(&s, &d);
        assert_eq!(c.method, MatchMethod::Synonym);
        let sub = c.sub_scores.unwrap();
        assert!((sub.synonym - 1.0).abs() < 1e-9);
        assert!((sub.specialized - 0.3).abs() < 1e-9);
        assert!(c.score >= 0.7);
    }

    #[test]
    fn section_rule_alone_counts_half() {
        let s = entity("Key Metrics", 5, Some("Revenue by application"), "Widgets");
        let d = entity("Reported", 21, Some("End market breakdown"), "Gadgets");
        let sub = scorer().sub_scores(&s, &d);
        assert!((sub.synonym - 0.5).abs() < 1e-9);
    }

    #[test]
    fn unrelated_rows_fall_below_threshold() {
        let s = entity("Balance Sheet", 5, Some("Assets"), "Inventories");
        let d = entity("Reported", 80, Some("Liabilities"), "Deferred revenue");
        let sc = scorer();
        let c = sc.score(&s, &d);
        assert!(c.score < sc.threshold());
        assert!(sc.score_all(&[s], &[d]).is_empty());
    }

    #[test]
    fn near_threshold_scores_are_not_rounded_up() {
        let mut table = EquivalenceTable::builtin();
        table.insert(RuleKind::Field, "Total revenue", "Revenue, total", 0.9999);
        let sc = Scorer::new(table, SpecializedTerms::default(), MatchingConfig::default());
        let s = entity("Key Metrics", 3, None, "Total revenue");
        let d = entity("Reported", 9, None, "Revenue, total");
        let c = sc.score(&s, &d);
        assert!(c.score < 0.6 && c.score > 0.5999, "{}", c.score);
        assert!(!sc.accepts(&c));
        assert!(sc.score_all(&[s], &[d]).is_empty());
    }

    #[test]
    fn threshold_is_inclusive() {
        let weighted = |synonym: f64| {
            let mut table = EquivalenceTable::empty();
            table.insert(RuleKind::Field, "Widgets", "Gadgets", 1.0);
            let config = MatchingConfig {
                weights: ScoreWeights { exact: 0.0, synonym, scope: 0.0 },
                ..MatchingConfig::default()
            };
            Scorer::new(table, SpecializedTerms::default(), config)
        };
        let s = entity("Key Metrics", 3, None, "Widgets");
        let d = entity("Reported", 9, None, "Gadgets");

        let below = weighted(0.59);
        assert!((below.score(&s, &d).score - 0.59).abs() < 1e-12);
        assert!(below.score_all(std::slice::from_ref(&s), std::slice::from_ref(&d)).is_empty());

        let at = weighted(0.6);
        assert_eq!(at.score_all(&[s], &[d]).len(), 1);
    }

    #[test]
    fn specialized_terms() {
        let t = SpecializedTerms::default();
        let cfg = MatchingConfig::default();
        assert!((t.bonus("Germany", "germany total", &cfg) - 0.3).abs() < 1e-9);
        assert!((t.bonus("North America", "United States", &cfg) - 0.3).abs() < 1e-9);
        assert!((t.bonus("Total revenue", "Revenue", &cfg) - 0.2).abs() < 1e-9);
        assert!((t.bonus("Medical", "Germany", &cfg)).abs() < 1e-9);
        let extra = SpecializedTerms::with_extra(&["Brazil".to_string()], &[]);
        assert!((extra.bonus("Brazil", "BRAZIL", &cfg) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn scope_similarity_positional() {
        let a: Vec<String> = ["Key_Metrics", "Revenue_By_Region", "Germany"].map(String::from).to_vec();
        let b: Vec<String> = ["Key_Metrics", "Revenue_By_Regions", "Germany"].map(String::from).to_vec();
        let c: Vec<String> = ["Reported", "Germany"].map(String::from).to_vec();
        assert!((scope_similarity(&a, &a, 0.8) - 1.0).abs() < 1e-9);
        assert!((scope_similarity(&a, &b, 0.8) - 2.5 / 3.0).abs() < 1e-9);
        assert!(scope_similarity(&a, &c, 0.8) < 1e-9);
        assert_eq!(scope_similarity(&[], &[], 0.8), 0.0);
    }

    #[test]
    fn quality_bands() {
        assert_eq!(quality_label(0.95), "Excellent");
        assert_eq!(quality_label(0.75), "Good");
        assert_eq!(quality_label(0.6), "Fair");
        assert_eq!(quality_label(0.59), "Poor");
    }
}
