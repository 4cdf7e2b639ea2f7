// CSV/TSV workbooks: a directory of delimited files, one sheet per file.

use std::io::Read;
use std::path::{Path, PathBuf};

use crosswalk_recon::store::{CellValue, MemorySheet, MemoryWorkbook};

/// Load every `.csv`/`.tsv` file in `dir` as a sheet named after the file
/// stem. Sheets are ordered by file name.
pub fn load_workbook_dir(dir: &Path) -> Result<MemoryWorkbook, String> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| format!("Failed to read directory '{}': {}", dir.display(), e))?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| e.to_string())?.path();
        if path.is_file() && is_delimited(&path) {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(format!("No CSV or TSV files in '{}'", dir.display()));
    }

    let mut book = MemoryWorkbook::new();
    for path in &files {
        load_sheet_into(&mut book, path)?;
    }
    Ok(book)
}

/// Load a single delimited file as a one-sheet workbook.
pub fn load_workbook_file(path: &Path) -> Result<MemoryWorkbook, String> {
    let mut book = MemoryWorkbook::new();
    load_sheet_into(&mut book, path)?;
    Ok(book)
}

fn load_sheet_into(book: &mut MemoryWorkbook, path: &Path) -> Result<(), String> {
    let name = sheet_name(path)?;
    let content = read_file_as_utf8(path)?;
    let delimiter = if has_extension(path, "tsv") {
        b'\t'
    } else {
        sniff_delimiter(&content)
    };
    import_from_string(&content, delimiter, book.sheet_mut(&name))
        .map_err(|e| format!("{}: {}", path.display(), e))?;
    log::debug!("loaded sheet '{}' from {}", name, path.display());
    Ok(())
}

/// Write each sheet as `<dir>/<sheet>.csv`, creating `dir` if needed.
pub fn save_workbook_dir(book: &MemoryWorkbook, dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create directory '{}': {}", dir.display(), e))?;
    for (name, sheet) in book.sheets() {
        let path = dir.join(format!("{name}.csv"));
        export_sheet(sheet, &path, b',')?;
    }
    Ok(())
}

/// Write one sheet to a delimited file.
pub fn export_sheet(sheet: &MemorySheet, path: &Path, delimiter: u8) -> Result<(), String> {
    // Trailing empties are omitted, so rows can differ in width.
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)
        .map_err(|e| e.to_string())?;

    for row in 1..=sheet.max_row() {
        let mut record: Vec<String> = (1..=sheet.max_column())
            .map(|col| sheet.get(row, col).as_text())
            .collect();
        let width = record.iter().rposition(|v| !v.is_empty()).map_or(0, |i| i + 1);
        record.truncate(width);
        // Blank rows keep their position so row numbers survive a round trip.
        if record.is_empty() {
            record.push(String::new());
        }
        writer.write_record(&record).map_err(|e| e.to_string())?;
    }

    writer.flush().map_err(|e| e.to_string())?;
    Ok(())
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).take(10).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        if counts.first().copied().unwrap_or(0) <= 1 {
            continue;
        }

        // Lines agreeing with line 1, weighted by field count
        let target = counts[0];
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// Read file and convert to UTF-8 if needed (handles Windows-1252, Latin-1, etc.)
pub fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| format!("Failed to open '{}': {}", path.display(), e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| e.to_string())?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(s)),
        Err(e) => {
            let bytes = e.into_bytes();
            // Excel-exported CSVs are usually Windows-1252
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

fn import_from_string(content: &str, delimiter: u8, sheet: &mut MemorySheet) -> Result<(), String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    // The reader skips blank lines. Count them back in so row numbers match
    // the file; a quoted field spanning lines is still one row.
    let mut row = 0usize;
    let mut next_line = 1u64;
    for result in reader.records() {
        let record = result.map_err(|e| e.to_string())?;
        let line = record.position().map_or(next_line, |p| p.line());
        row += 1 + line.saturating_sub(next_line) as usize;
        let spanned: usize = record.iter().map(|f| f.matches('\n').count()).sum();
        next_line = line + 1 + spanned as u64;
        for (col_idx, field) in record.iter().enumerate() {
            sheet.set(row, col_idx + 1, field_value(field));
        }
    }
    Ok(())
}

/// Plain numbers become numeric cells; everything else (including `(56)`
/// and `1,234`) stays text and is parsed leniently by the engine.
fn field_value(field: &str) -> CellValue {
    let trimmed = field.trim();
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => CellValue::Number(n),
        _ => CellValue::from(field),
    }
}

fn sheet_name(path: &Path) -> Result<String, String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| format!("Cannot derive a sheet name from '{}'", path.display()))
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

pub(crate) fn is_delimited(path: &Path) -> bool {
    has_extension(path, "csv") || has_extension(path, "tsv")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    use crosswalk_recon::store::TabularSource;

    #[test]
    fn test_sniff_semicolon_delimiter() {
        let content = "Line item;1Q24;2Q24\nGermany;12000;13500\nChina;8000;9100\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_sniff_comma_delimiter() {
        let content = "Line item,1Q24,2Q24\nGermany,12000,13500\n";
        assert_eq!(sniff_delimiter(content), b',');
    }

    #[test]
    fn test_sniff_semicolon_with_commas_in_values() {
        let content = "Line item;1Q24\n\"Selling, general and administrative\";\"1,234\"\nCash;5\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_directory_is_a_workbook() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Income Statement.csv"), "Line item,1Q24,2Q24\nNet sales,338,355\n").unwrap();
        fs::write(dir.path().join("Key Metrics.tsv"), "Line item\t1Q24\nGermany\t12000\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let book = load_workbook_dir(dir.path()).unwrap();
        assert_eq!(book.sheet_names(), vec!["Income Statement", "Key Metrics"]);
        assert_eq!(book.get_cell("Income Statement", 2, 1), CellValue::from("Net sales"));
        assert_eq!(book.get_cell("Income Statement", 2, 3), CellValue::Number(355.0));
        assert_eq!(book.get_cell("Key Metrics", 2, 2), CellValue::Number(12000.0));
        assert_eq!(book.get_cell("Key Metrics", 1, 2), CellValue::from("1Q24"));
    }

    #[test]
    fn test_accounting_text_survives_as_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Balance Sheet.csv");
        fs::write(&path, "Other,\"(56)\",\"1,234\"\n").unwrap();

        let book = load_workbook_file(&path).unwrap();
        let cell = book.get_cell("Balance Sheet", 1, 2);
        assert_eq!(cell, CellValue::from("(56)"));
        assert_eq!(cell.as_number(), Some(-56.0));
        assert_eq!(book.get_cell("Balance Sheet", 1, 3).as_number(), Some(1234.0));
    }

    #[test]
    fn test_windows_1252_fallback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Reported.csv");
        // "Caf\xe9" is not valid UTF-8
        fs::write(&path, b"Caf\xe9 sales,1\n").unwrap();

        let book = load_workbook_file(&path).unwrap();
        assert_eq!(book.get_cell("Reported", 1, 1), CellValue::from("Café sales"));
    }

    #[test]
    fn test_save_keeps_row_positions() {
        let dir = tempdir().unwrap();
        let mut book = MemoryWorkbook::new();
        let sheet = book.sheet_mut("Reported");
        sheet.set_row(1, [CellValue::from("Line item"), CellValue::from("2024_Q1")]);
        sheet.set_row(3, [CellValue::from("Germany"), CellValue::Number(12000.0), CellValue::Number(13500.5)]);

        save_workbook_dir(&book, dir.path()).unwrap();
        let loaded = load_workbook_dir(dir.path()).unwrap();

        assert_eq!(loaded.get_cell("Reported", 2, 1), CellValue::Empty);
        assert_eq!(loaded.get_cell("Reported", 3, 1), CellValue::from("Germany"));
        assert_eq!(loaded.get_cell("Reported", 3, 3), CellValue::Number(13500.5));
    }

    #[test]
    fn test_blank_lines_keep_row_numbers() {
        let mut book = MemoryWorkbook::new();
        import_from_string("Line item,1Q24\n\nCash,5\n", b',', book.sheet_mut("Key Metrics")).unwrap();
        assert_eq!(book.get_cell("Key Metrics", 2, 1), CellValue::Empty);
        assert_eq!(book.get_cell("Key Metrics", 3, 1), CellValue::from("Cash"));
        assert_eq!(book.get_cell("Key Metrics", 3, 2), CellValue::Number(5.0));

        let mut book = MemoryWorkbook::new();
        let content = "Line item,1Q24\n\"Net\nsales\",5\n\n\nCash,7\n";
        import_from_string(content, b',', book.sheet_mut("Reported")).unwrap();
        assert_eq!(book.get_cell("Reported", 2, 1), CellValue::from("Net\nsales"));
        assert_eq!(book.get_cell("Reported", 5, 1), CellValue::from("Cash"));
        assert_eq!(book.max_row("Reported"), 5);
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(load_workbook_dir(dir.path()).is_err());
    }
}
