//! `xwalk run` and `xwalk validate`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crosswalk_io::audit::{write_audit_csv, write_result_json};
use crosswalk_io::cache::{load_mapping_cache, save_mapping_cache};
use crosswalk_io::{open_workbook, save_workbook};
use crosswalk_recon::cache::entries_from_assignments;
use crosswalk_recon::scorer::quality_label;
use crosswalk_recon::{ReconConfig, RunOptions};

use crate::exit_codes::EXIT_ERROR;
use crate::CliError;

pub struct RunArgs {
    pub config: PathBuf,
    pub dry_run: bool,
    pub json: bool,
    pub output: Option<PathBuf>,
    pub audit: Option<PathBuf>,
}

fn load_config(path: &Path) -> Result<ReconConfig, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("cannot read config {}: {e}", path.display())))?;
    ReconConfig::from_toml(&text).map_err(CliError::recon)
}

/// Directory that relative paths in a config resolve against.
fn base_dir(config_path: &Path) -> &Path {
    config_path.parent().unwrap_or_else(|| Path::new("."))
}

/// `populated_<name>` next to the destination. Non-xlsx Excel formats are
/// saved as .xlsx.
pub fn default_output_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "destination".to_string());
    let mut out = destination.with_file_name(format!("populated_{name}"));
    let ext = out
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if matches!(ext.as_str(), "xls" | "xlsb" | "xlsm" | "ods") {
        out.set_extension("xlsx");
    }
    out
}

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let config = load_config(&args.config)?;
    let base = base_dir(&args.config);

    let source_path = base.join(&config.source.file);
    let source = open_workbook(&source_path)
        .map_err(|e| CliError::io(format!("source {}: {e}", source_path.display())))?;
    let destination_path = base.join(&config.destination.workbook.file);
    let mut destination = open_workbook(&destination_path)
        .map_err(|e| CliError::io(format!("destination {}: {e}", destination_path.display())))?;

    let cache_path = config.cache.as_ref().map(|c| base.join(&c.file));
    let cache = match &cache_path {
        Some(path) => load_mapping_cache(path).map_err(CliError::io)?,
        None => Vec::new(),
    };

    let options = RunOptions { dry_run: args.dry_run, cache, source_label: None };
    let result = crosswalk_recon::run(&config, &source, &mut destination, &options).map_err(CliError::recon)?;

    if !args.dry_run {
        let out_path = match &config.destination.output {
            Some(out) => base.join(out),
            None => default_output_path(&destination_path),
        };
        save_workbook(&destination, &out_path)
            .map_err(|e| CliError::io(format!("cannot write {}: {e}", out_path.display())))?;
        eprintln!("wrote {}", out_path.display());

        if let (Some(path), Some(cache_config)) = (&cache_path, &config.cache) {
            if cache_config.update {
                let entries = entries_from_assignments(&result.assignments);
                save_mapping_cache(path, &entries).map_err(CliError::io)?;
                log::info!("saved {} mappings to {}", entries.len(), path.display());
            }
        }
    }

    if let Some(path) = &args.audit {
        write_audit_csv(path, &result.audit).map_err(CliError::io)?;
        eprintln!("wrote {}", path.display());
    }

    if let Some(path) = &args.output {
        write_result_json(path, &result).map_err(CliError::io)?;
        eprintln!("wrote {}", path.display());
    }
    if args.json {
        let json_str = serde_json::to_string_pretty(&result).map_err(|e| CliError {
            code: EXIT_ERROR,
            message: format!("JSON serialization error: {e}"),
            hint: None,
        })?;
        println!("{json_str}");
    }

    // Human summary to stderr
    let s = &result.summary;
    eprintln!(
        "{}: {} destination rows: {} populated ({} overwritten), {} no source data, {} no match{}",
        result.meta.config_name,
        s.total,
        s.populated,
        s.overwritten,
        s.no_source_data,
        s.no_match,
        if args.dry_run { " [dry run]" } else { "" },
    );
    for (method, count) in &s.by_method {
        eprintln!("  {method:<26} {count}");
    }
    let mut quality: BTreeMap<&str, usize> = BTreeMap::new();
    for a in &result.assignments {
        *quality.entry(quality_label(a.confidence)).or_default() += 1;
    }
    if !quality.is_empty() {
        let parts: Vec<String> = quality.iter().map(|(q, n)| format!("{n} {q}")).collect();
        eprintln!("  match quality: {}", parts.join(", "));
    }
    let reused = result.reused_sources();
    if !reused.is_empty() {
        eprintln!("  {} source rows feed more than one destination", reused.len());
    }

    Ok(())
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(&config_path)?;
    let base = base_dir(&config_path);
    for file in [&config.source.file, &config.destination.workbook.file] {
        let path = base.join(file);
        if !path.exists() {
            log::warn!("{} does not exist yet", path.display());
        }
    }
    eprintln!(
        "{}: valid ({} source sheets, {} destination sheets, {} composites, target {})",
        config.name,
        config.source.sheets.len(),
        config.destination.workbook.sheets.len(),
        config.composites.len(),
        config.periods.target,
    );
    Ok(())
}
