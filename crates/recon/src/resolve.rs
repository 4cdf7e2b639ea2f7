//! Assignment Resolver: turns ranked candidates into a one-to-one mapping.
//!
//! Order of precedence:
//! 1. declared composites,
//! 2. verification candidates (historical, then sign-flipped),
//! 3. everything else, greedily by descending score.
//!
//! A destination is assigned at most once. A source origin feeds at most one
//! single-source assignment, except origins listed as multi-context, which
//! may feed one percentage and one absolute destination. Composite members
//! may be shared between composites but are closed to single-source
//! assignments once their group is emitted.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::CompositeConfig;
use crate::model::{
    Assignment, Diagnostic, DiagnosticKind, MatchCandidate, MatchMethod, Origin, ScopedEntity,
    SourceRef,
};
use crate::scorer::round4;

/// What the resolver needs to know beyond the candidates themselves.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Every scoped source row, with or without values. Composite
    /// components are checked for existence against this list.
    pub sources: &'a [ScopedEntity],
    pub destinations: &'a [ScopedEntity],
    pub multi_context: &'a [Origin],
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub assignments: Vec<Assignment>,
    /// Destinations left without any assignment, in origin order.
    pub unassigned: Vec<Origin>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn resolve(
    candidates: &[MatchCandidate],
    composites: &[CompositeConfig],
    ctx: &ResolveContext<'_>,
) -> Resolution {
    let source_origins: BTreeSet<&Origin> = ctx.sources.iter().map(|s| s.origin()).collect();
    let dest_pct: BTreeMap<&Origin, bool> = ctx
        .destinations
        .iter()
        .map(|d| (d.origin(), d.is_percentage_context()))
        .collect();
    let multi: BTreeSet<&Origin> = ctx.multi_context.iter().collect();

    let mut out = Resolution::default();
    let mut assigned: BTreeSet<Origin> = BTreeSet::new();
    let mut consumed: BTreeSet<(Origin, Option<bool>)> = BTreeSet::new();

    // 1. Composites
    for c in composites {
        if assigned.contains(&c.destination) {
            continue;
        }
        let mut warnings = Vec::new();
        for o in &c.sources {
            if !source_origins.contains(o) {
                let msg = format!("composite component {o} has no source row; counted as zero");
                log::warn!("{}: {msg}", c.destination);
                out.diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::CompositeComponentMissing,
                    origin: Some(c.destination.clone()),
                    message: msg.clone(),
                });
                warnings.push(msg);
            }
        }
        for o in &c.sources {
            if multi.contains(o) {
                consumed.insert((o.clone(), Some(true)));
                consumed.insert((o.clone(), Some(false)));
            } else {
                consumed.insert((o.clone(), None));
            }
        }
        let source = SourceRef::Composite(c.sources.clone());
        let rationale = match &c.label {
            Some(label) => format!("declared composite '{label}': {source}"),
            None => format!("declared composite: {source}"),
        };
        assigned.insert(c.destination.clone());
        out.assignments.push(Assignment {
            destination: c.destination.clone(),
            source,
            method: MatchMethod::Composite,
            confidence: 1.0,
            rationale,
            warnings,
        });
    }

    // 2 + 3. Ranked single-source candidates
    let mut ranked: Vec<&MatchCandidate> = candidates.iter().collect();
    ranked.sort_by(|a, b| {
        phase(a.method)
            .cmp(&phase(b.method))
            .then_with(|| {
                if a.method.is_verification() {
                    std::cmp::Ordering::Equal
                } else {
                    b.score.total_cmp(&a.score)
                }
            })
            .then_with(|| a.destination.cmp(&b.destination))
            .then_with(|| a.source.cmp(&b.source))
    });

    for c in ranked {
        if assigned.contains(&c.destination) {
            continue;
        }
        let key = if multi.contains(&c.source) {
            (c.source.clone(), Some(dest_pct.get(&c.destination).copied().unwrap_or(false)))
        } else {
            (c.source.clone(), None)
        };
        if consumed.contains(&key) {
            continue;
        }
        consumed.insert(key);
        assigned.insert(c.destination.clone());
        log::debug!("assign {} <- {} ({}, {:.4})", c.destination, c.source, c.method, c.score);
        out.assignments.push(Assignment {
            destination: c.destination.clone(),
            source: SourceRef::Single(c.source.clone()),
            method: c.method,
            confidence: round4(c.score),
            rationale: c.rationale.clone(),
            warnings: Vec::new(),
        });
    }

    let mut unassigned: Vec<Origin> = ctx
        .destinations
        .iter()
        .map(|d| d.origin())
        .filter(|o| !assigned.contains(*o))
        .cloned()
        .collect();
    unassigned.sort();
    unassigned.dedup();
    out.unassigned = unassigned;

    log::info!(
        "resolved {} assignments ({} composite), {} destinations unassigned",
        out.assignments.len(),
        composites.len(),
        out.unassigned.len()
    );
    out
}

fn phase(method: MatchMethod) -> u8 {
    match method {
        MatchMethod::HistoricalVerification => 0,
        MatchMethod::SignFlippedVerification => 1,
        _ => 2,
    }
}
