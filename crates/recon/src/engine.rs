use std::collections::BTreeMap;

use crate::audit::{fingerprint, to_csv_string};
use crate::cache::{seed_candidates, CacheEntry};
use crate::config::{ReconConfig, WorkbookConfig};
use crate::error::ReconError;
use crate::model::{
    AuditRecord, Diagnostic, MatchCandidate, Origin, ReconMeta, ReconResult, ScopedEntity,
};
use crate::populate::{apply, PopulateContext};
use crate::resolve::{resolve, ResolveContext};
use crate::scope::{read_sheet_rows, ScopeBuilder, SheetLayout};
use crate::scorer::Scorer;
use crate::store::{TabularSource, TabularStore};
use crate::summary::compute_summary;
use crate::verify::verify;

/// Per-run switches that do not belong in the config file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Compute everything but leave the destination untouched.
    pub dry_run: bool,
    /// Remembered mappings from an earlier run.
    pub cache: Vec<CacheEntry>,
    /// Name printed as the file part of provenance strings. Defaults to the
    /// file name of `source.file`.
    pub source_label: Option<String>,
}

/// Entities scoped from the declared sheets of one workbook.
#[derive(Debug, Clone, Default)]
pub struct ScopedWorkbook {
    pub entities: Vec<ScopedEntity>,
    /// Sheet -> period -> column, as resolved for each sheet.
    pub columns: BTreeMap<String, BTreeMap<String, usize>>,
    pub skipped: Vec<Diagnostic>,
}

/// Scope every declared sheet of a workbook. Fails before reading anything
/// when a declared sheet is absent.
pub fn scope_workbook<S: TabularSource + ?Sized>(
    role: &str,
    config: &WorkbookConfig,
    builder: &ScopeBuilder,
    store: &S,
) -> Result<ScopedWorkbook, ReconError> {
    ensure_sheets(role, config, store)?;

    let layout = SheetLayout::from_config(config);
    let mut out = ScopedWorkbook::default();
    for sheet in &config.sheets {
        out.columns.insert(sheet.clone(), layout.resolve_periods(store, sheet));
        let rows = read_sheet_rows(store, sheet, &layout);
        let scoped = builder.build(sheet, &rows);
        out.entities.extend(scoped.entities);
        out.skipped.extend(scoped.skipped);
    }
    Ok(out)
}

fn ensure_sheets<S: TabularSource + ?Sized>(role: &str, config: &WorkbookConfig, store: &S) -> Result<(), ReconError> {
    match config.sheets.iter().find(|s| !store.has_sheet(s)) {
        Some(sheet) => Err(ReconError::MissingRequiredSheet {
            role: role.to_string(),
            sheet: sheet.clone(),
        }),
        None => Ok(()),
    }
}

/// Run the full pipeline: scope, score, verify, resolve, populate.
///
/// Reads everything from `source` and `destination` before the first write.
pub fn run(
    config: &ReconConfig,
    source: &dyn TabularSource,
    destination: &mut dyn TabularStore,
    options: &RunOptions,
) -> Result<ReconResult, ReconError> {
    ensure_sheets("source", &config.source, source)?;
    ensure_sheets("destination", &config.destination.workbook, &*destination)?;

    let builder = ScopeBuilder::from_config(&config.scope);
    let src = scope_workbook("source", &config.source, &builder, source)?;
    let dst = scope_workbook("destination", &config.destination.workbook, &builder, &*destination)?;

    // Rows without values still count as existing composite components.
    let all_sources = src.entities;
    let sources: Vec<ScopedEntity> = all_sources.iter().filter(|e| e.has_values()).cloned().collect();
    let destinations = dst.entities;
    log::info!(
        "scoped {} source entities, {} destination entities ({} rows skipped)",
        sources.len(),
        destinations.len(),
        src.skipped.len() + dst.skipped.len()
    );

    let mut diagnostics = src.skipped;
    diagnostics.extend(dst.skipped);

    // Candidates
    let scorer = Scorer::from_config(config);
    let mut by_pair: BTreeMap<(Origin, Origin), MatchCandidate> = BTreeMap::new();
    let (seeds, stale) = seed_candidates(
        &options.cache,
        &sources,
        &destinations,
        &scorer,
        config.matching.cache_bonus,
    );
    diagnostics.extend(stale);
    let scored = scorer.score_all(&sources, &destinations);
    for c in scored.into_iter().chain(seeds.into_iter().filter(|c| scorer.accepts(c))) {
        let key = (c.destination.clone(), c.source.clone());
        match by_pair.get(&key) {
            Some(existing) if existing.score >= c.score => {}
            _ => {
                by_pair.insert(key, c);
            }
        }
    }

    let mut candidates: Vec<MatchCandidate> = match &config.periods.historical {
        Some(period) => verify(&destinations, &sources, period, &scorer, &config.composites),
        None => Vec::new(),
    };
    let verified = candidates.len();
    candidates.extend(by_pair.into_values());
    log::info!("{} candidates ({} by value verification)", candidates.len(), verified);

    // Resolve
    let resolution = resolve(
        &candidates,
        &config.composites,
        &ResolveContext {
            sources: &all_sources,
            destinations: &destinations,
            multi_context: &config.multi_context,
        },
    );
    diagnostics.extend(resolution.diagnostics);

    // Populate
    let source_file = options
        .source_label
        .clone()
        .unwrap_or_else(|| file_label(&config.source.file));
    let ctx = PopulateContext {
        source_file: &source_file,
        value_period: &config.periods.target,
        source_columns: &src.columns,
        label_column: config.destination.workbook.label_column,
        target_column: config.destination.target_column,
        tracking_column: config.destination.tracking_column(),
        dry_run: options.dry_run,
    };
    let report = apply(&resolution.assignments, &sources, destination, &ctx)?;

    let labels: BTreeMap<&Origin, &str> = destinations.iter().map(|d| (d.origin(), d.raw_label())).collect();
    let mut audit = report.records;
    for origin in &resolution.unassigned {
        let label = labels.get(origin).copied().unwrap_or("");
        audit.push(AuditRecord::no_match(origin, label));
    }

    let sheet_rank = |sheet: &str| {
        config
            .destination
            .workbook
            .sheets
            .iter()
            .position(|s| s == sheet)
            .unwrap_or(usize::MAX)
    };
    audit.sort_by(|a, b| {
        (sheet_rank(&a.destination_sheet), a.destination_row)
            .cmp(&(sheet_rank(&b.destination_sheet), b.destination_row))
    });
    let mut assignments = resolution.assignments;
    assignments.sort_by(|a, b| {
        (sheet_rank(&a.destination.sheet), a.destination.row)
            .cmp(&(sheet_rank(&b.destination.sheet), b.destination.row))
    });

    let summary = compute_summary(&audit);
    let audit_sha256 = fingerprint(&to_csv_string(&audit)?);
    log::info!(
        "{}: {} populated, {} no source data, {} no match",
        config.name,
        summary.populated,
        summary.no_source_data,
        summary.no_match
    );

    Ok(ReconResult {
        meta: ReconMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            target_period: config.periods.target.clone(),
            historical_period: config.periods.historical.clone(),
            dry_run: options.dry_run,
            source_entities: sources.len(),
            destination_entities: destinations.len(),
            candidates: candidates.len(),
            audit_sha256,
        },
        summary,
        assignments,
        audit,
        diagnostics,
    })
}

/// Final path component of a configured file name.
fn file_label(file: &str) -> String {
    file.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(file).to_string()
}
