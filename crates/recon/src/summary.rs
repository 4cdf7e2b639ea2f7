use std::collections::BTreeMap;

use crate::model::{AuditRecord, OutcomeStatus, ReconSummary};

/// Compute summary statistics from audit records.
pub fn compute_summary(records: &[AuditRecord]) -> ReconSummary {
    let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_source_sheet: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_method: BTreeMap<String, usize> = BTreeMap::new();
    let mut populated = 0;
    let mut overwritten = 0;
    let mut no_source_data = 0;
    let mut no_match = 0;

    for r in records {
        *by_status.entry(r.status.to_string()).or_insert(0) += 1;
        if let Some(method) = r.method {
            *by_method.entry(method.to_string()).or_insert(0) += 1;
        }

        match r.status {
            OutcomeStatus::Populated => {
                populated += 1;
                if r.previous_value.is_some() {
                    overwritten += 1;
                }
                if let Some(sheet) = source_sheet(&r.source) {
                    *by_source_sheet.entry(sheet.to_string()).or_insert(0) += 1;
                }
            }
            OutcomeStatus::NoSourceData => no_source_data += 1,
            OutcomeStatus::NoMatch => no_match += 1,
        }
    }

    ReconSummary {
        total: records.len(),
        populated,
        overwritten,
        no_source_data,
        no_match,
        by_status,
        by_source_sheet,
        by_method,
    }
}

/// Sheet part of an audit `source` field (`Sheet!row` or `Sheet!30+31`).
fn source_sheet(source: &str) -> Option<&str> {
    source.split_once('!').map(|(sheet, _)| sheet).filter(|s| !s.is_empty())
}
