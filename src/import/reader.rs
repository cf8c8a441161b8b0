//! 表格读取（CSV / XLSX）
//!
//! Turns an uploaded file into a header row plus string cells. Column
//! meaning is resolved later by [`roster`](super::roster).

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use csv::ReaderBuilder;

use crate::errors::{Result, SchoolError};

/// Supported upload formats, picked from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Csv,
    Xlsx,
}

impl SheetFormat {
    pub fn from_filename(filename: &str) -> Result<Self> {
        let lower = filename.to_lowercase();
        if lower.ends_with(".csv") {
            Ok(SheetFormat::Csv)
        } else if lower.ends_with(".xlsx") {
            Ok(SheetFormat::Xlsx)
        } else {
            Err(SchoolError::import(format!(
                "Unsupported file format: {} (expected .csv or .xlsx)",
                filename
            )))
        }
    }
}

/// Normalized header cells and the data rows under them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// 表头归一化：去空白、小写、合并连续空白
pub fn normalize_header(cell: &str) -> String {
    cell.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `;` wins when it appears more often than `,` in the first line
pub fn detect_delimiter(first_line: &str) -> u8 {
    let semicolons = first_line.matches(';').count();
    let commas = first_line.matches(',').count();
    if semicolons > 0 && semicolons > commas {
        b';'
    } else {
        b','
    }
}

/// Read a CSV upload; the first line is always the header
pub fn read_csv(bytes: &[u8]) -> Result<RawSheet> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| SchoolError::import(format!("CSV is not valid UTF-8: {}", e)))?;
    let text = text.trim_start_matches('\u{feff}');

    let Some(first_line) = text.lines().find(|l| !l.trim().is_empty()) else {
        return Err(SchoolError::import("Empty file"));
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(detect_delimiter(first_line))
        .from_reader(text.as_bytes());

    let mut records = reader.records();
    let headers = match records.next() {
        Some(record) => record?.iter().map(normalize_header).collect(),
        None => return Err(SchoolError::import("Empty file")),
    };

    let mut rows = Vec::new();
    for record in records {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(RawSheet { headers, rows })
}

/// Read the first worksheet of an XLSX upload.
///
/// The header is the first row within `header_scan_rows` that contains one
/// of `known_headers`; title banners above it are skipped.
pub fn read_xlsx(bytes: &[u8], header_scan_rows: usize, known_headers: &[&str]) -> Result<RawSheet> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| SchoolError::import(format!("Cannot open XLSX file: {}", e)))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| SchoolError::import("XLSX file has no worksheets"))?
        .map_err(|e| SchoolError::import(format!("Cannot read worksheet: {}", e)))?;

    let rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();

    let header_idx = rows
        .iter()
        .take(header_scan_rows)
        .position(|row| {
            row.iter()
                .map(|c| normalize_header(c))
                .any(|h| known_headers.contains(&h.as_str()))
        })
        .ok_or_else(|| {
            SchoolError::import("Could not find valid headers (CI, Paterno, Nombres)")
        })?;

    let mut rows = rows.into_iter().skip(header_idx);
    let headers = rows
        .next()
        .map(|row| row.iter().map(|c| normalize_header(c)).collect())
        .unwrap_or_default();

    Ok(RawSheet {
        headers,
        rows: rows.collect(),
    })
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        // 整数型单元格（如 CI）不带小数点
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string().trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_filename() {
        assert_eq!(
            SheetFormat::from_filename("Lista.CSV").expect("csv"),
            SheetFormat::Csv
        );
        assert_eq!(
            SheetFormat::from_filename("curso.xlsx").expect("xlsx"),
            SheetFormat::Xlsx
        );
        assert!(SheetFormat::from_filename("curso.xls").is_err());
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("ci;paterno;nombres"), b';');
        assert_eq!(detect_delimiter("ci,paterno,nombres"), b',');
        assert_eq!(detect_delimiter("ci;nombre, apellido,otro"), b',');
        assert_eq!(detect_delimiter("ci"), b',');
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  Apellido   Paterno "), "apellido paterno");
        assert_eq!(normalize_header("C.I."), "c.i.");
    }

    #[test]
    fn test_read_csv_semicolon() {
        let sheet = read_csv("\u{feff}CI;Paterno;Nombres\n123;Rivera;Juan\n\n456;Chavez;Ana\n".as_bytes())
            .expect("valid csv");
        assert_eq!(sheet.headers, vec!["ci", "paterno", "nombres"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[1], vec!["456", "Chavez", "Ana"]);
    }

    #[test]
    fn test_read_csv_empty() {
        assert!(read_csv(b"").is_err());
        assert!(read_csv(b"\n  \n").is_err());
    }

    #[test]
    fn test_read_xlsx_rejects_garbage() {
        let err = read_xlsx(b"not a zip", 50, &["ci"]).expect_err("invalid xlsx");
        assert!(matches!(err, SchoolError::Import(_)));
    }

    #[test]
    fn test_cell_to_string() {
        assert_eq!(cell_to_string(&Data::Float(12345678.0)), "12345678");
        assert_eq!(cell_to_string(&Data::Float(1.5)), "1.5");
        assert_eq!(cell_to_string(&Data::String(" x ".into())), "x");
        assert_eq!(cell_to_string(&Data::Empty), "");
    }
}
