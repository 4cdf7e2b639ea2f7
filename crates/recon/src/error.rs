use std::fmt;

/// Structural failures that abort a run.
///
/// Per-row and per-entity problems never surface here; they degrade to
/// unassigned outcomes and show up in the audit trail instead.
#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad weights, duplicate composite, etc.).
    ConfigValidation(String),
    /// A declared source or destination sheet is absent from its workbook.
    MissingRequiredSheet { role: String, sheet: String },
    /// IO error surfaced by a store or writer.
    Io(String),
}

impl ReconError {
    /// Short taxonomy code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigParse(_) | Self::ConfigValidation(_) => "MALFORMED_CONFIGURATION",
            Self::MissingRequiredSheet { .. } => "MISSING_REQUIRED_SHEET",
            Self::Io(_) => "IO_ERROR",
        }
    }
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::MissingRequiredSheet { role, sheet } => {
                write!(f, "{role} workbook: missing required sheet '{sheet}'")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}
