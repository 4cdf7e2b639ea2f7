//! `xwalk scope`: the field scoping report.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::PathBuf;

use crosswalk_io::open_workbook;
use crosswalk_recon::config::ScopeConfig;
use crosswalk_recon::scope::{scope_sheet, ScopeBuilder, SheetLayout};
use crosswalk_recon::store::{format_number, TabularSource};
use crosswalk_recon::ScopedEntity;

use crate::exit_codes::EXIT_MISSING_SHEET;
use crate::CliError;

pub fn cmd_scope(
    workbook: PathBuf,
    sheets: Vec<String>,
    label_column: usize,
    header_row: Option<usize>,
) -> Result<(), CliError> {
    if label_column == 0 {
        return Err(CliError::args("--label-column is 1-based"));
    }
    if header_row == Some(0) {
        return Err(CliError::args("--header-row is 1-based"));
    }

    let book = open_workbook(&workbook).map_err(CliError::io)?;
    let available = book.sheet_names();
    let sheets = if sheets.is_empty() { available.clone() } else { sheets };
    if let Some(missing) = sheets.iter().find(|s| !available.contains(s)) {
        return Err(CliError {
            code: EXIT_MISSING_SHEET,
            message: format!("no sheet named '{missing}' in {}", workbook.display()),
            hint: None,
        }
        .with_hint(format!("available sheets: {}", available.join(", "))));
    }

    let layout = SheetLayout { label_column, header_row, periods: BTreeMap::new() };
    let builder = ScopeBuilder::from_config(&ScopeConfig::default());

    let mut entities: Vec<ScopedEntity> = Vec::new();
    let mut skipped = 0usize;
    for sheet in &sheets {
        let outcome = scope_sheet(&book, sheet, &layout, &builder);
        skipped += outcome.skipped.len();
        entities.extend(outcome.entities);
    }

    write_report(io::stdout().lock(), &entities).map_err(CliError::io)?;
    eprintln!("{} entities scoped, {} rows skipped", entities.len(), skipped);
    Ok(())
}

/// One CSV line per entity; one column per period seen on any entity.
fn write_report<W: io::Write>(out: W, entities: &[ScopedEntity]) -> Result<(), String> {
    let periods: BTreeSet<&str> = entities
        .iter()
        .flat_map(|e| e.value_series().keys().map(String::as_str))
        .collect();

    let mut writer = csv::Writer::from_writer(out);
    let mut header = vec!["sheet", "row", "label", "normalized_name", "scope_path", "percentage"];
    header.extend(periods.iter().copied());
    writer.write_record(&header).map_err(|e| e.to_string())?;

    for e in entities {
        let mut record = vec![
            e.origin().sheet.clone(),
            e.origin().row.to_string(),
            e.raw_label().to_string(),
            e.normalized_name().to_string(),
            e.scope_path().join(" > "),
            e.is_percentage_context().to_string(),
        ];
        for period in &periods {
            record.push(e.value_at(period).map(format_number).unwrap_or_default());
        }
        writer.write_record(&record).map_err(|e| e.to_string())?;
    }
    writer.flush().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosswalk_recon::model::RawRow;

    #[test]
    fn report_has_one_column_per_period() {
        let rows = vec![
            RawRow::new(2, "Revenue by region"),
            RawRow::new(3, "Germany").with_value("2024_Q1", Some(12000.0)).with_value("2024_Q2", Some(13500.0)),
            RawRow::new(4, "Germany %").with_value("2024_Q1", Some(0.15)),
        ];
        let outcome = ScopeBuilder::from_config(&ScopeConfig::default()).build("Key Metrics", &rows);

        let mut buf = Vec::new();
        write_report(&mut buf, &outcome.entities).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("sheet,row,label,normalized_name,scope_path,percentage,2024_Q1,2024_Q2")
        );
        let germany = lines.next().unwrap();
        assert!(germany.starts_with("Key Metrics,3,Germany,"), "{germany}");
        assert!(germany.ends_with(",12000,13500"), "{germany}");
        assert!(lines.next().unwrap().ends_with(",0.15,"));
    }
}
