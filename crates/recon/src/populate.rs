//! Population & Provenance Writer.
//!
//! Writes each assignment's value into the destination's target column and a
//! `file|sheet|rows|column` provenance string into its tracking column.

use std::collections::BTreeMap;

use crate::error::ReconError;
use crate::model::{
    Assignment, AuditRecord, OutcomeStatus, Origin, PopulationReport, ScopedEntity, SourceRef,
};
use crate::store::{CellValue, TabularSource, TabularStore};
use crate::summary::compute_summary;

/// Where and what to write.
#[derive(Debug, Clone)]
pub struct PopulateContext<'a> {
    /// File name printed in provenance strings.
    pub source_file: &'a str,
    /// Period whose source value is written.
    pub value_period: &'a str,
    /// Source sheet -> period -> 1-based column.
    pub source_columns: &'a BTreeMap<String, BTreeMap<String, usize>>,
    pub label_column: usize,
    pub target_column: usize,
    pub tracking_column: usize,
    pub dry_run: bool,
}

impl PopulateContext<'_> {
    /// Column printed in provenance: the source column of the value period,
    /// or the period key when the column is unknown.
    fn period_column(&self, sheet: &str) -> String {
        self.source_columns
            .get(sheet)
            .and_then(|cols| cols.get(self.value_period))
            .map_or_else(|| self.value_period.to_string(), |c| c.to_string())
    }

    pub fn provenance(&self, source: &SourceRef) -> String {
        format!(
            "{}|{}|{}|{}",
            self.source_file,
            source.sheet(),
            source.row_expression(),
            self.period_column(source.sheet())
        )
    }
}

/// Value of a source reference for `period`. Composite components without a
/// value count as zero; a composite with no valued component has no value.
pub fn source_value(
    source: &SourceRef,
    entities: &BTreeMap<&Origin, &ScopedEntity>,
    period: &str,
) -> Option<f64> {
    let value_of = |o: &Origin| entities.get(o).and_then(|e| e.value_at(period));
    match source {
        SourceRef::Single(o) => value_of(o),
        SourceRef::Composite(origins) => {
            let values: Vec<f64> = origins.iter().filter_map(|o| value_of(o)).collect();
            if values.is_empty() {
                None
            } else {
                Some(values.iter().sum())
            }
        }
    }
}

pub fn apply(
    assignments: &[Assignment],
    sources: &[ScopedEntity],
    store: &mut dyn TabularStore,
    ctx: &PopulateContext<'_>,
) -> Result<PopulationReport, ReconError> {
    let entities: BTreeMap<&Origin, &ScopedEntity> = sources.iter().map(|e| (e.origin(), e)).collect();
    let mut records = Vec::with_capacity(assignments.len());

    for a in assignments {
        let dest = &a.destination;
        let label = store.get_cell(&dest.sheet, dest.row, ctx.label_column).as_text();
        let value = source_value(&a.source, &entities, ctx.value_period);
        let provenance = ctx.provenance(&a.source);
        let mut notes = a.warnings.clone();

        let (status, previous_value) = match value {
            None => {
                notes.push(format!("no {} value at source", ctx.value_period));
                (OutcomeStatus::NoSourceData, None)
            }
            Some(v) => {
                let existing = store.get_cell(&dest.sheet, dest.row, ctx.target_column);
                let previous = (!existing.is_empty()).then(|| existing.as_text());
                if let Some(prev) = &previous {
                    log::warn!("{dest}: overwriting prior value {prev} with {v}");
                    notes.push("overwrote prior value".to_string());
                }
                if !ctx.dry_run {
                    store.set_cell(&dest.sheet, dest.row, ctx.target_column, CellValue::Number(v))?;
                    store.set_cell(
                        &dest.sheet,
                        dest.row,
                        ctx.tracking_column,
                        CellValue::Text(provenance.clone()),
                    )?;
                }
                (OutcomeStatus::Populated, previous)
            }
        };

        records.push(AuditRecord {
            destination_sheet: dest.sheet.clone(),
            destination_row: dest.row,
            destination_label: label,
            source: a.source.to_string(),
            method: Some(a.method),
            confidence: Some(a.confidence),
            status,
            value,
            previous_value,
            provenance,
            notes: notes.join("; "),
        });
    }

    let summary = compute_summary(&records);
    log::info!(
        "populated {} of {} assignments ({} overwritten, {} without source data){}",
        summary.populated,
        records.len(),
        summary.overwritten,
        summary.no_source_data,
        if ctx.dry_run { " [dry run]" } else { "" }
    );
    Ok(PopulationReport { records, summary })
}
