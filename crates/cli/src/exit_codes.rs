//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: scripts rely on them.
//!
//! | Code | Meaning                                            |
//! |------|----------------------------------------------------|
//! | 0    | Success                                            |
//! | 1    | General error (unspecified)                        |
//! | 2    | CLI usage error (bad args, unsupported file type)  |
//! | 3    | Invalid config (parse or validation failure)       |
//! | 4    | A declared sheet is missing from its workbook      |
//! | 5    | I/O failure reading or writing files               |
//!
//! Degraded outcomes (`NO_MATCH`, `NO_SOURCE_DATA`) are not failures; they
//! are reported in the audit trail and the run still exits 0.

use crosswalk_recon::ReconError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Config file could not be parsed or failed validation.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// A sheet named in the config is absent from its workbook.
pub const EXIT_MISSING_SHEET: u8 = 4;

/// Reading or writing a workbook, audit, cache or result file failed.
pub const EXIT_IO: u8 = 5;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_INVALID_CONFIG,
        ReconError::MissingRequiredSheet { .. } => EXIT_MISSING_SHEET,
        ReconError::Io(_) => EXIT_IO,
    }
}
