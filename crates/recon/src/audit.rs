//! Audit trail serialization.

use sha2::{Digest, Sha256};

use crate::error::ReconError;
use crate::model::AuditRecord;

/// Render audit records as CSV (header row included).
pub fn to_csv_string(records: &[AuditRecord]) -> Result<String, ReconError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for r in records {
        writer
            .serialize(r)
            .map_err(|e| ReconError::Io(format!("audit csv: {e}")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ReconError::Io(format!("audit csv: {e}")))?;
    String::from_utf8(bytes).map_err(|e| ReconError::Io(format!("audit csv: {e}")))
}

/// Content fingerprint of an audit CSV.
pub fn fingerprint(csv: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(csv.as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}
