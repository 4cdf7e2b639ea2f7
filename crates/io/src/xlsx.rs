// Excel workbooks: import (xlsx, xls, xlsb, ods) and export (xlsx only)
//
// Values and formulas survive a round trip; a formula keeps its cached
// result. Cell formats are not carried.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use chrono::{Duration, NaiveDate};
use rust_xlsxwriter::{Formula, Workbook as XlsxWorkbook};

use crosswalk_recon::store::{CellValue, MemorySheet, MemoryWorkbook};

/// Rows and columns past these limits are dropped with a warning.
const MAX_ROWS: usize = 1_048_576;
const MAX_COLS: usize = 16_384;

/// Import an Excel file into memory. Rows and columns become 1-based.
pub fn import(path: &Path) -> Result<MemoryWorkbook, String> {
    let mut workbook: Sheets<_> = open_workbook_auto(path)
        .map_err(|e| format!("Failed to open Excel file: {}", e))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    if sheet_names.is_empty() {
        return Err("Excel file contains no sheets".to_string());
    }

    let mut book = MemoryWorkbook::new();
    for sheet_name in &sheet_names {
        let range = workbook
            .worksheet_range(sheet_name)
            .map_err(|e| format!("Failed to read sheet '{}': {}", sheet_name, e))?;

        let sheet = book.sheet_mut(sheet_name);

        // Range start offset (data may not begin at A1)
        let (start_row, start_col) = range.start().unwrap_or((0, 0));
        let mut imported = 0usize;
        for (row_idx, row) in range.rows().enumerate() {
            let target_row = start_row as usize + row_idx + 1;
            if target_row > MAX_ROWS {
                log::warn!("sheet '{}' truncated at row {}", sheet_name, MAX_ROWS);
                break;
            }
            for (col_idx, cell) in row.iter().enumerate() {
                let target_col = start_col as usize + col_idx + 1;
                if target_col > MAX_COLS {
                    break;
                }
                let value = cell_value(cell);
                if !value.is_empty() {
                    sheet.set(target_row, target_col, value);
                    imported += 1;
                }
            }
        }

        // Formulas land on top of their cached values. The formula range may
        // start at a different offset than the value range.
        let mut formulas = 0usize;
        if let Ok(formula_range) = workbook.worksheet_formula(sheet_name) {
            let (f_start_row, f_start_col) = formula_range.start().unwrap_or((0, 0));
            for (row_idx, row) in formula_range.rows().enumerate() {
                let target_row = f_start_row as usize + row_idx + 1;
                if target_row > MAX_ROWS {
                    break;
                }
                for (col_idx, formula) in row.iter().enumerate() {
                    let target_col = f_start_col as usize + col_idx + 1;
                    if target_col > MAX_COLS {
                        break;
                    }
                    if !formula.is_empty() {
                        sheet.set_formula(target_row, target_col, strip_ods_prefix(formula));
                        formulas += 1;
                    }
                }
            }
        }
        log::debug!("imported {} cells ({} formulas) from sheet '{}'", imported, formulas, sheet_name);
    }

    Ok(book)
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::from(s.as_str()),
        Data::Float(n) => CellValue::Number(*n),
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Bool(b) => CellValue::from(if *b { "TRUE" } else { "FALSE" }),
        Data::Error(e) => CellValue::Text(format!("#{:?}", e)),
        // Date headers become ISO text so period detection can read them.
        Data::DateTime(dt) => match serial_to_date(dt.as_f64()) {
            Some(date) => CellValue::Text(date.format("%Y-%m-%d").to_string()),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::from(s.as_str()),
    }
}

/// Excel 1900 date system serial to calendar date. Serial 60 is the
/// phantom 1900-02-29; the epoch offset already absorbs it for later dates.
fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

/// ODS stores formulas in OpenFormula syntax (`of:=SUM(...)`).
fn strip_ods_prefix(formula: &str) -> &str {
    let bare = formula.trim_start_matches('=');
    bare.strip_prefix("of:").unwrap_or(bare)
}

/// Export every sheet with its formulas.
pub fn export(book: &MemoryWorkbook, path: &Path) -> Result<(), String> {
    let mut xlsx_workbook = XlsxWorkbook::new();

    for (name, sheet) in book.sheets() {
        let worksheet = xlsx_workbook
            .add_worksheet()
            .set_name(name)
            .map_err(|e| format!("Failed to create sheet '{}': {}", name, e))?;
        export_sheet_cells(sheet, worksheet)?;
    }

    xlsx_workbook
        .save(path)
        .map_err(|e| format!("Failed to save XLSX file: {}", e))?;
    Ok(())
}

fn export_sheet_cells(sheet: &MemorySheet, worksheet: &mut rust_xlsxwriter::Worksheet) -> Result<(), String> {
    for (row, col, formula) in sheet.formulas() {
        let (r, c) = cell_index(row, col)?;
        let text = formula.strip_prefix('=').unwrap_or(formula);
        let formula = Formula::new(text).set_result(sheet.get(row, col).as_text());
        worksheet
            .write_formula(r, c, formula)
            .map_err(|e| format!("Failed to write formula at ({}, {}): {}", row, col, e))?;
    }

    for (row, col, value) in sheet.cells() {
        if sheet.formula(row, col).is_some() {
            continue;
        }
        let (r, c) = cell_index(row, col)?;
        match value {
            CellValue::Empty => {}
            CellValue::Number(n) => {
                worksheet
                    .write_number(r, c, *n)
                    .map_err(|e| format!("Failed to write number at ({}, {}): {}", row, col, e))?;
            }
            CellValue::Text(s) => {
                worksheet
                    .write_string(r, c, s)
                    .map_err(|e| format!("Failed to write text at ({}, {}): {}", row, col, e))?;
            }
        }
    }
    Ok(())
}

/// 1-based store position to 0-based xlsx position.
fn cell_index(row: usize, col: usize) -> Result<(u32, u16), String> {
    Ok((
        u32::try_from(row - 1).map_err(|e| e.to_string())?,
        u16::try_from(col - 1).map_err(|e| format!("column {} out of range: {}", col, e))?,
    ))
}
