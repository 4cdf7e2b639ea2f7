//! Row/column-addressable workbook seam.
//!
//! The engine never opens files. It pulls cells through [`TabularSource`]
//! and pushes populated values through [`TabularStore`]. Rows and columns are
//! 1-based, matching what users see in a spreadsheet (and what provenance
//! strings print).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::normalize::parse_number;

/// A single cell as the engine sees it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Number(_) => false,
        }
    }

    /// Numeric reading of the cell. Text is parsed leniently
    /// (`"1,234"`, `"(56)"`, `"12%"`).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Number(_) | Self::Empty => None,
            Self::Text(s) => parse_number(s),
        }
    }

    /// Text reading of the cell, trimmed. Numbers render without a trailing `.0`.
    pub fn as_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.trim().to_string(),
            Self::Number(n) => format_number(*n),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Self::Empty
        } else {
            Self::Text(s.to_string())
        }
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        if s.is_empty() {
            Self::Empty
        } else {
            Self::Text(s)
        }
    }
}

impl From<Option<f64>> for CellValue {
    fn from(n: Option<f64>) -> Self {
        n.map_or(Self::Empty, Self::Number)
    }
}

/// Render a number the way a spreadsheet shows a raw value.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Pull-only view of a workbook.
pub trait TabularSource {
    fn sheet_names(&self) -> Vec<String>;
    fn max_row(&self, sheet: &str) -> usize;
    fn max_column(&self, sheet: &str) -> usize;
    fn get_cell(&self, sheet: &str, row: usize, column: usize) -> CellValue;

    /// Formula behind a cell, with its leading `=`, for workbooks that keep
    /// formulas. `get_cell` still answers the cached result.
    fn get_formula(&self, _sheet: &str, _row: usize, _column: usize) -> Option<String> {
        None
    }

    fn has_sheet(&self, sheet: &str) -> bool {
        self.sheet_names().iter().any(|s| s == sheet)
    }
}

/// Read/write view of a workbook.
pub trait TabularStore: TabularSource {
    fn set_cell(
        &mut self,
        sheet: &str,
        row: usize,
        column: usize,
        value: CellValue,
    ) -> Result<(), ReconError>;
}

// ---------------------------------------------------------------------------
// In-memory workbook
// ---------------------------------------------------------------------------

/// Sparse sheet keyed by (row, column). Formulas sit beside the values,
/// which act as their cached results.
#[derive(Debug, Clone, Default)]
pub struct MemorySheet {
    cells: BTreeMap<(usize, usize), CellValue>,
    formulas: BTreeMap<(usize, usize), String>,
    max_row: usize,
    max_col: usize,
}

impl MemorySheet {
    /// Write a plain value. Any formula in the cell is dropped.
    pub fn set(&mut self, row: usize, column: usize, value: impl Into<CellValue>) {
        let value = value.into();
        if row == 0 || column == 0 {
            return;
        }
        self.formulas.remove(&(row, column));
        if value.is_empty() {
            self.cells.remove(&(row, column));
        } else {
            self.max_row = self.max_row.max(row);
            self.max_col = self.max_col.max(column);
            self.cells.insert((row, column), value);
        }
    }

    /// Write consecutive cells starting at column 1.
    pub fn set_row<I, V>(&mut self, row: usize, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<CellValue>,
    {
        for (i, v) in values.into_iter().enumerate() {
            self.set(row, i + 1, v);
        }
    }

    /// Attach a formula, keeping the cell's current value as its cached
    /// result. A leading `=` is added when missing.
    pub fn set_formula(&mut self, row: usize, column: usize, formula: &str) {
        let formula = formula.trim();
        if row == 0 || column == 0 || formula.trim_start_matches('=').is_empty() {
            return;
        }
        let text = if formula.starts_with('=') {
            formula.to_string()
        } else {
            format!("={formula}")
        };
        self.max_row = self.max_row.max(row);
        self.max_col = self.max_col.max(column);
        self.formulas.insert((row, column), text);
    }

    pub fn get(&self, row: usize, column: usize) -> CellValue {
        self.cells.get(&(row, column)).cloned().unwrap_or_default()
    }

    pub fn formula(&self, row: usize, column: usize) -> Option<&str> {
        self.formulas.get(&(row, column)).map(String::as_str)
    }

    pub fn max_row(&self) -> usize {
        self.max_row
    }

    pub fn max_column(&self) -> usize {
        self.max_col
    }

    /// Non-empty cells in row-major order, formula results included.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, &CellValue)> {
        self.cells.iter().map(|(&(r, c), v)| (r, c, v))
    }

    /// Formula cells in row-major order.
    pub fn formulas(&self) -> impl Iterator<Item = (usize, usize, &str)> {
        self.formulas.iter().map(|(&(r, c), f)| (r, c, f.as_str()))
    }
}

/// Workbook held entirely in memory. Sheet order is insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkbook {
    sheets: Vec<(String, MemorySheet)>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a sheet.
    pub fn sheet_mut(&mut self, name: &str) -> &mut MemorySheet {
        let idx = match self.sheets.iter().position(|(n, _)| n == name) {
            Some(idx) => idx,
            None => {
                self.sheets.push((name.to_string(), MemorySheet::default()));
                self.sheets.len() - 1
            }
        };
        &mut self.sheets[idx].1
    }

    pub fn sheet(&self, name: &str) -> Option<&MemorySheet> {
        self.sheets.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn sheets(&self) -> impl Iterator<Item = (&str, &MemorySheet)> {
        self.sheets.iter().map(|(n, s)| (n.as_str(), s))
    }
}

impl TabularSource for MemoryWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(n, _)| n.clone()).collect()
    }

    fn max_row(&self, sheet: &str) -> usize {
        self.sheet(sheet).map_or(0, MemorySheet::max_row)
    }

    fn max_column(&self, sheet: &str) -> usize {
        self.sheet(sheet).map_or(0, MemorySheet::max_column)
    }

    fn get_cell(&self, sheet: &str, row: usize, column: usize) -> CellValue {
        self.sheet(sheet).map(|s| s.get(row, column)).unwrap_or_default()
    }

    fn get_formula(&self, sheet: &str, row: usize, column: usize) -> Option<String> {
        self.sheet(sheet)?.formula(row, column).map(str::to_string)
    }
}

impl TabularStore for MemoryWorkbook {
    fn set_cell(
        &mut self,
        sheet: &str,
        row: usize,
        column: usize,
        value: CellValue,
    ) -> Result<(), ReconError> {
        if row == 0 || column == 0 {
            return Err(ReconError::Io(format!(
                "sheet '{sheet}': cell ({row}, {column}) is out of range (1-based)"
            )));
        }
        let s = self
            .sheets
            .iter_mut()
            .find(|(n, _)| n == sheet)
            .map(|(_, s)| s)
            .ok_or_else(|| ReconError::Io(format!("no such sheet: '{sheet}'")))?;
        s.set(row, column, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_numbers() {
        assert_eq!(CellValue::from("1,234").as_number(), Some(1234.0));
        assert_eq!(CellValue::from("(56)").as_number(), Some(-56.0));
        assert_eq!(CellValue::from("Cash").as_number(), None);
        assert_eq!(CellValue::Number(f64::NAN).as_number(), None);
        assert_eq!(CellValue::Empty.as_number(), None);
    }

    #[test]
    fn number_text_rendering() {
        assert_eq!(CellValue::Number(12000.0).as_text(), "12000");
        assert_eq!(CellValue::Number(0.14).as_text(), "0.14");
    }

    #[test]
    fn memory_workbook_bounds() {
        let mut wb = MemoryWorkbook::new();
        wb.sheet_mut("Balance Sheet").set_row(3, ["Cash", "10", "12"]);
        assert_eq!(wb.max_row("Balance Sheet"), 3);
        assert_eq!(wb.max_column("Balance Sheet"), 3);
        assert_eq!(wb.get_cell("Balance Sheet", 3, 1), CellValue::from("Cash"));
        assert_eq!(wb.get_cell("Nope", 1, 1), CellValue::Empty);
        assert!(wb.has_sheet("Balance Sheet"));
    }

    #[test]
    fn set_cell_requires_existing_sheet() {
        let mut wb = MemoryWorkbook::new();
        wb.sheet_mut("Reported");
        assert!(wb.set_cell("Reported", 2, 5, CellValue::Number(1.0)).is_ok());
        assert!(wb.set_cell("Missing", 2, 5, CellValue::Number(1.0)).is_err());
        assert!(wb.set_cell("Reported", 0, 5, CellValue::Number(1.0)).is_err());
        assert_eq!(wb.get_cell("Reported", 2, 5), CellValue::Number(1.0));
    }

    #[test]
    fn overwriting_a_formula_cell_drops_the_formula() {
        let mut wb = MemoryWorkbook::new();
        let sheet = wb.sheet_mut("Reported");
        sheet.set(4, 4, 25.0);
        sheet.set_formula(4, 4, "SUM(D2:D3)");
        sheet.set_formula(5, 4, "=D4*2");
        assert_eq!(wb.get_formula("Reported", 4, 4).as_deref(), Some("=SUM(D2:D3)"));
        assert_eq!(wb.get_cell("Reported", 4, 4), CellValue::Number(25.0));
        assert_eq!(wb.max_row("Reported"), 5);

        wb.set_cell("Reported", 4, 4, CellValue::Number(30.0)).unwrap();
        assert_eq!(wb.get_formula("Reported", 4, 4), None);
        assert_eq!(wb.get_cell("Reported", 4, 4), CellValue::Number(30.0));
        assert_eq!(wb.get_formula("Reported", 5, 4).as_deref(), Some("=D4*2"));
        assert_eq!(wb.get_cell("Reported", 5, 4), CellValue::Empty);
    }

    #[test]
    fn blank_write_clears_cell() {
        let mut wb = MemoryWorkbook::new();
        let sheet = wb.sheet_mut("S");
        sheet.set(1, 1, "x");
        sheet.set(1, 1, "");
        assert_eq!(sheet.get(1, 1), CellValue::Empty);
    }
}
