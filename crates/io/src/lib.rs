// File I/O operations

pub mod audit;
pub mod cache;
pub mod csv;
pub mod xlsx;

use std::path::Path;

use crosswalk_recon::store::MemoryWorkbook;

/// Workbook file kinds, chosen by path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookFormat {
    /// Directory of `.csv`/`.tsv` files.
    CsvDir,
    /// Single `.csv`/`.tsv` file.
    Csv,
    Excel,
}

impl WorkbookFormat {
    pub fn from_path(path: &Path) -> Result<Self, String> {
        if path.is_dir() {
            return Ok(Self::CsvDir);
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "tsv" => Ok(Self::Csv),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Ok(Self::Excel),
            // No extension and not (yet) a directory: an output CSV directory.
            "" => Ok(Self::CsvDir),
            other => Err(format!("Unsupported workbook format '.{}': {}", other, path.display())),
        }
    }
}

/// Open a workbook from a directory of CSVs, a single CSV, or an Excel file.
pub fn open_workbook(path: &Path) -> Result<MemoryWorkbook, String> {
    if !path.exists() {
        return Err(format!("No such file or directory: {}", path.display()));
    }
    match WorkbookFormat::from_path(path)? {
        WorkbookFormat::CsvDir => csv::load_workbook_dir(path),
        WorkbookFormat::Csv => csv::load_workbook_file(path),
        WorkbookFormat::Excel => xlsx::import(path),
    }
}

/// Save a workbook. Excel output is always `.xlsx`. A single-CSV target
/// only holds a one-sheet workbook.
pub fn save_workbook(book: &MemoryWorkbook, path: &Path) -> Result<(), String> {
    match WorkbookFormat::from_path(path)? {
        WorkbookFormat::CsvDir => csv::save_workbook_dir(book, path),
        WorkbookFormat::Csv => {
            let mut sheets = book.sheets();
            match (sheets.next(), sheets.next()) {
                (Some((_, sheet)), None) => {
                    let delimiter = if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("tsv")) {
                        b'\t'
                    } else {
                        b','
                    };
                    csv::export_sheet(sheet, path, delimiter)
                }
                (None, _) => Err("Workbook has no sheets".to_string()),
                (Some(_), Some(_)) => Err(format!(
                    "Workbook has several sheets; save it to a directory instead of {}",
                    path.display()
                )),
            }
        }
        WorkbookFormat::Excel => {
            let is_xlsx = path.extension().is_some_and(|e| e.eq_ignore_ascii_case("xlsx"));
            if !is_xlsx {
                return Err(format!("Excel export writes .xlsx only: {}", path.display()));
            }
            xlsx::export(book, path)
        }
    }
}
