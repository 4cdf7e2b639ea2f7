//! Mapping cache: prior single-source assignments replayed as candidate hints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{
    Assignment, Diagnostic, DiagnosticKind, MatchCandidate, MatchMethod, Origin, ScopedEntity,
    SourceRef,
};
use crate::scorer::Scorer;

/// One remembered mapping. Flat so it round-trips through CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub destination_sheet: String,
    pub destination_row: usize,
    pub source_sheet: String,
    pub source_row: usize,
    pub method: MatchMethod,
    pub confidence: f64,
}

impl CacheEntry {
    pub fn destination(&self) -> Origin {
        Origin::new(self.destination_sheet.clone(), self.destination_row)
    }

    pub fn source(&self) -> Origin {
        Origin::new(self.source_sheet.clone(), self.source_row)
    }
}

/// Re-score cached pairs whose rows still exist and add `bonus` (capped at
/// 1.0). Entries naming vanished rows become diagnostics. Seeds still have to
/// clear the scorer's threshold downstream.
pub fn seed_candidates(
    entries: &[CacheEntry],
    sources: &[ScopedEntity],
    destinations: &[ScopedEntity],
    scorer: &Scorer,
    bonus: f64,
) -> (Vec<MatchCandidate>, Vec<Diagnostic>) {
    let src: BTreeMap<&Origin, &ScopedEntity> = sources.iter().map(|e| (e.origin(), e)).collect();
    let dst: BTreeMap<&Origin, &ScopedEntity> = destinations.iter().map(|e| (e.origin(), e)).collect();

    let mut seeds = Vec::new();
    let mut stale = Vec::new();
    for entry in entries {
        let (s_origin, d_origin) = (entry.source(), entry.destination());
        match (src.get(&s_origin), dst.get(&d_origin)) {
            (Some(s), Some(d)) => {
                let mut c = scorer.score(s, d);
                c.score = (c.score + bonus).min(1.0);
                c.rationale.push_str("; remembered mapping");
                seeds.push(c);
            }
            _ => {
                let message = format!("cached mapping {d_origin} <- {s_origin} names a row that no longer exists");
                log::warn!("{message}");
                stale.push(Diagnostic {
                    kind: DiagnosticKind::StaleCacheEntry,
                    origin: Some(d_origin),
                    message,
                });
            }
        }
    }
    (seeds, stale)
}

/// Cache entries for this run's single-source assignments.
pub fn entries_from_assignments(assignments: &[Assignment]) -> Vec<CacheEntry> {
    assignments
        .iter()
        .filter_map(|a| match &a.source {
            SourceRef::Single(s) => Some(CacheEntry {
                destination_sheet: a.destination.sheet.clone(),
                destination_row: a.destination.row,
                source_sheet: s.sheet.clone(),
                source_row: s.row,
                method: a.method,
                confidence: a.confidence,
            }),
            SourceRef::Composite(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchingConfig;
    use crate::model::{ScopeContext, ValueSeries};
    use crate::scorer::SpecializedTerms;
    use crate::synonyms::EquivalenceTable;

    fn entity(sheet: &str, row: usize, section: &str, label: &str) -> ScopedEntity {
        ScopedEntity::new(
            Origin::new(sheet, row),
            label,
            ScopeContext {
                statement: Some(sheet.into()),
                section: Some(section.into()),
                subsection: None,
            },
            ValueSeries::new(),
        )
    }

    fn entry(dest_row: usize, src_row: usize) -> CacheEntry {
        CacheEntry {
            destination_sheet: "Reported".into(),
            destination_row: dest_row,
            source_sheet: "Income Statement".into(),
            source_row: src_row,
            method: MatchMethod::Synonym,
            confidence: 0.8,
        }
    }

    #[test]
    fn seeds_get_bonus_and_stale_entries_are_reported() {
        let scorer = Scorer::new(EquivalenceTable::builtin(), SpecializedTerms::default(), MatchingConfig::default());
        let sources = vec![entity("Income Statement", 12, "Operating expenses", "Selling")];
        let dests = vec![entity("Reported", 40, "Operating expenses", "Sales and marketing")];
        let base = scorer.score(&sources[0], &dests[0]).score;

        let (seeds, stale) = seed_candidates(&[entry(40, 12), entry(41, 12)], &sources, &dests, &scorer, 0.1);
        assert_eq!(seeds.len(), 1);
        assert!((seeds[0].score - (base + 0.1).min(1.0)).abs() < 1e-9);
        assert!(seeds[0].rationale.contains("remembered"));
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].kind, DiagnosticKind::StaleCacheEntry);
    }

    #[test]
    fn only_single_sources_are_cached() {
        let single = Assignment {
            destination: Origin::new("Reported", 40),
            source: SourceRef::Single(Origin::new("Income Statement", 12)),
            method: MatchMethod::ExactName,
            confidence: 0.95,
            rationale: String::new(),
            warnings: Vec::new(),
        };
        let composite = Assignment {
            source: SourceRef::Composite(vec![Origin::new("Balance Sheet", 30)]),
            method: MatchMethod::Composite,
            ..single.clone()
        };
        let entries = entries_from_assignments(&[single, composite]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source(), Origin::new("Income Statement", 12));
        assert_eq!(entries[0].method, MatchMethod::ExactName);
    }
}
