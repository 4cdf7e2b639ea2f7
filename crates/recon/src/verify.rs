//! Historical value verification.
//!
//! A destination row that already carries a settled value for the anchor
//! period is matched to the source row reporting the same value for that
//! period. Value identity beats name similarity.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::CompositeConfig;
use crate::model::{MatchCandidate, MatchMethod, Origin, ScopedEntity};
use crate::scorer::Scorer;

/// Integer key of a value rounded to 6 decimals. Zero and non-finite values
/// have no key.
pub fn value_key(v: f64) -> Option<i64> {
    if !v.is_finite() {
        return None;
    }
    let key = (v * 1e6).round();
    if key == 0.0 || key.abs() >= i64::MAX as f64 {
        return None;
    }
    Some(key as i64)
}

/// Produce HISTORICAL_VERIFICATION (and, when the sign-flip fallback is on,
/// SIGN_FLIPPED_VERIFICATION) candidates for `period`.
///
/// Destinations are visited in the order given; a source picked for one
/// destination is not offered to later ones. Declared composite
/// destinations and their member rows take no part.
pub fn verify(
    destinations: &[ScopedEntity],
    sources: &[ScopedEntity],
    period: &str,
    scorer: &Scorer,
    composites: &[CompositeConfig],
) -> Vec<MatchCandidate> {
    let composite_dests: BTreeSet<&Origin> = composites.iter().map(|c| &c.destination).collect();
    let members: BTreeSet<&Origin> = composites.iter().flat_map(|c| &c.sources).collect();

    let mut index: BTreeMap<i64, Vec<&ScopedEntity>> = BTreeMap::new();
    for s in sources.iter().filter(|s| !members.contains(s.origin())) {
        if let Some(key) = s.value_at(period).and_then(value_key) {
            index.entry(key).or_default().push(s);
        }
    }
    for bucket in index.values_mut() {
        bucket.sort_by(|a, b| a.origin().cmp(b.origin()));
    }

    let config = scorer.config();
    let mut used: BTreeSet<&Origin> = BTreeSet::new();
    let mut out = Vec::new();

    for dest in destinations.iter().filter(|d| !composite_dests.contains(d.origin())) {
        let Some(value) = dest.value_at(period) else {
            continue;
        };
        let Some(key) = value_key(value) else {
            continue;
        };

        let open = |k: i64| {
            index
                .get(&k)
                .map(|b| {
                    b.iter()
                        .copied()
                        .filter(|s| !used.contains(s.origin()))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        };

        let mut flipped = false;
        let mut pool = open(key);
        if pool.is_empty() && config.sign_flip_fallback {
            pool = open(-key);
            flipped = true;
        }
        let Some(chosen) = pick(&pool, dest, scorer) else {
            continue;
        };

        let (method, score) = if flipped {
            (MatchMethod::SignFlippedVerification, config.sign_flip_confidence)
        } else {
            (MatchMethod::HistoricalVerification, 1.0)
        };
        let mut rationale = format!("{period} value {value} matches {}", chosen.origin());
        if flipped {
            rationale.push_str(" with opposite sign");
        }
        if pool.len() > 1 {
            rationale.push_str(&format!(" (chosen among {} equal values)", pool.len()));
        }
        log::debug!("{}: {}", dest.origin(), rationale);

        used.insert(chosen.origin());
        out.push(MatchCandidate {
            source: chosen.origin().clone(),
            destination: dest.origin().clone(),
            score,
            method,
            rationale,
            sub_scores: Some(scorer.sub_scores(chosen, dest)),
        });
    }

    out
}

/// Best of several equal-valued sources: highest name affinity, then same
/// percentage context, then lowest origin.
fn pick<'a>(pool: &[&'a ScopedEntity], dest: &ScopedEntity, scorer: &Scorer) -> Option<&'a ScopedEntity> {
    if pool.len() <= 1 {
        return pool.first().copied();
    }
    let rank = |s: &ScopedEntity| {
        (
            scorer.tie_break(s, dest),
            s.is_percentage_context() == dest.is_percentage_context(),
        )
    };
    pool.iter().copied().min_by(|a, b| {
        let (aff_a, ctx_a) = rank(a);
        let (aff_b, ctx_b) = rank(b);
        aff_b
            .total_cmp(&aff_a)
            .then(ctx_b.cmp(&ctx_a))
            .then_with(|| a.origin().cmp(b.origin()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchingConfig;
    use crate::model::{ScopeContext, ValueSeries};
    use crate::scorer::SpecializedTerms;
    use crate::synonyms::EquivalenceTable;

    fn entity(sheet: &str, row: usize, section: &str, label: &str, q1: Option<f64>) -> ScopedEntity {
        let mut values = ValueSeries::new();
        values.insert("2024_Q1".into(), q1);
        ScopedEntity::new(
            Origin::new(sheet, row),
            label,
            ScopeContext {
                statement: Some(sheet.into()),
                section: Some(section.into()),
                subsection: None,
            },
            values,
        )
    }

    fn scorer(fallback: bool) -> Scorer {
        let config = MatchingConfig { sign_flip_fallback: fallback, ..MatchingConfig::default() };
        Scorer::new(EquivalenceTable::builtin(), SpecializedTerms::default(), config)
    }

    #[test]
    fn value_keys() {
        assert_eq!(value_key(12000.0), Some(12_000_000_000));
        assert_eq!(value_key(0.1 + 0.2), value_key(0.3));
        assert_eq!(value_key(0.0), None);
        assert_eq!(value_key(1e-9), None);
        assert_eq!(value_key(f64::NAN), None);
    }

    #[test]
    fn matches_by_value_not_name() {
        let sources = vec![
            entity("Key Metrics", 4, "Revenue by region", "Germany", Some(12000.0)),
            entity("Key Metrics", 9, "Revenue by region (% of total)", "Germany", Some(0.14)),
        ];
        let dests = vec![entity("Reported", 20, "Region breakdown", "Germany", Some(12000.0))];
        let out = verify(&dests, &sources, "2024_Q1", &scorer(true), &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, Origin::new("Key Metrics", 4));
        assert_eq!(out[0].method, MatchMethod::HistoricalVerification);
        assert!((out[0].score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn source_used_once_per_pass() {
        let sources = vec![entity("IS", 5, "Revenue", "Net sales", Some(500.0))];
        let dests = vec![
            entity("Reported", 2, "Revenue", "Net sales", Some(500.0)),
            entity("Reported", 3, "Revenue", "Revenue", Some(500.0)),
        ];
        let out = verify(&dests, &sources, "2024_Q1", &scorer(true), &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].destination, Origin::new("Reported", 2));
    }

    #[test]
    fn ties_prefer_name_affinity_then_origin() {
        let sources = vec![
            entity("IS", 3, "Operating expenses", "Sales and marketing", Some(42.0)),
            entity("IS", 7, "Operating expenses", "Research and development", Some(42.0)),
            entity("IS", 9, "Operating expenses", "Other", Some(7.0)),
            entity("IS", 10, "Operating expenses", "Other", Some(7.0)),
        ];
        let dests = vec![
            entity("Reported", 30, "Operating expenses", "R&D", Some(42.0)),
            entity("Reported", 31, "Operating expenses", "Misc", Some(7.0)),
        ];
        let out = verify(&dests, &sources, "2024_Q1", &scorer(true), &[]);
        assert_eq!(out[0].source, Origin::new("IS", 7));
        assert!(out[0].rationale.contains("among 2"));
        assert_eq!(out[1].source, Origin::new("IS", 9));
    }

    #[test]
    fn sign_flip_fallback_matches_negated_value() {
        let sources = vec![entity("Cash Flows", 12, "Investing activities", "Capital expenditures", Some(-310.0))];
        let dests = vec![entity("Reported", 60, "Cash flow", "Capex", Some(310.0))];

        let out = verify(&dests, &sources, "2024_Q1", &scorer(true), &[]);
        assert_eq!(out[0].method, MatchMethod::SignFlippedVerification);
        assert!((out[0].score - 0.9).abs() < 1e-12);
        assert!(out[0].rationale.contains("opposite sign"));

        assert!(verify(&dests, &sources, "2024_Q1", &scorer(false), &[]).is_empty());
    }

    #[test]
    fn composite_rows_are_left_out() {
        let sources = vec![
            entity("BS", 30, "Liabilities", "Accrued compensation", Some(500.0)),
            entity("BS", 40, "Liabilities", "Deferred income", Some(500.0)),
        ];
        let dests = vec![
            entity("Reported", 140, "Liabilities", "Accrued expenses", Some(500.0)),
            entity("Reported", 141, "Liabilities", "Other liabilities", Some(500.0)),
        ];
        let composite = CompositeConfig {
            destination: Origin::new("Reported", 140),
            sources: vec![Origin::new("BS", 30)],
            label: None,
        };

        let out = verify(&dests, &sources, "2024_Q1", &scorer(true), &[composite]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].destination, Origin::new("Reported", 141));
        assert_eq!(out[0].source, Origin::new("BS", 40));
    }

    #[test]
    fn zero_and_missing_values_do_not_verify() {
        let sources = vec![entity("IS", 5, "Revenue", "Other", Some(0.0))];
        let dests = vec![
            entity("Reported", 2, "Revenue", "Other", Some(0.0)),
            entity("Reported", 3, "Revenue", "Other", None),
        ];
        assert!(verify(&dests, &sources, "2024_Q1", &scorer(true), &[]).is_empty());
    }
}
