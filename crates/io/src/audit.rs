// Audit trail files.

use std::path::Path;

use crosswalk_recon::audit::to_csv_string;
use crosswalk_recon::model::{AuditRecord, ReconResult};

/// Write audit records as CSV. Same records always produce the same bytes.
pub fn write_audit_csv(path: &Path, records: &[AuditRecord]) -> Result<(), String> {
    let csv = to_csv_string(records).map_err(|e| e.to_string())?;
    std::fs::write(path, csv).map_err(|e| format!("Failed to write audit '{}': {}", path.display(), e))
}

/// Write the full run result (meta, summary, assignments, audit, diagnostics)
/// as pretty JSON.
pub fn write_result_json(path: &Path, result: &ReconResult) -> Result<(), String> {
    let json = serde_json::to_string_pretty(result).map_err(|e| e.to_string())?;
    std::fs::write(path, json).map_err(|e| format!("Failed to write '{}': {}", path.display(), e))
}
