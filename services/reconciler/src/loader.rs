//! Input loading: spreadsheet and CSV files into raw [`Grid`]s.
//!
//! Spreadsheets go through calamine (first worksheet only) with absolute sheet
//! coordinates kept, so a header on the fourth sheet row stays on grid row 3
//! even when the used range starts lower. CSV exports are decoded (BOM first,
//! then UTF-8, then the configured fallback encoding) and split on `,` or `;`.

use std::io::Cursor;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::NaiveDateTime;
use encoding_rs::Encoding;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::grid::{Cell, Grid};

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];
const CSV_EXTENSIONS: &[&str] = &["csv", "txt"];

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Spreadsheet,
    Csv,
}

/// A raw sheet plus where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedInput {
    pub grid: Grid,
    /// `sha256:<hex>` of the file bytes
    pub fingerprint: String,
    pub format: InputFormat,
}

pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}

/// Pick the format from the file extension, falling back to magic bytes
pub fn detect_format(file_name: Option<&str>, bytes: &[u8]) -> InputFormat {
    let extension = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some(ext) if SPREADSHEET_EXTENSIONS.contains(&ext) => InputFormat::Spreadsheet,
        Some(ext) if CSV_EXTENSIONS.contains(&ext) => InputFormat::Csv,
        _ if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) => {
            InputFormat::Spreadsheet
        }
        _ => InputFormat::Csv,
    }
}

/// Load an input already in memory
pub fn load_bytes(
    bytes: &[u8],
    file_name: Option<&str>,
    csv_fallback: &'static Encoding,
) -> Result<LoadedInput> {
    let format = detect_format(file_name, bytes);
    let grid = match format {
        InputFormat::Spreadsheet => read_spreadsheet(bytes)?,
        InputFormat::Csv => read_csv(bytes, csv_fallback)?,
    };
    Ok(LoadedInput {
        grid,
        fingerprint: fingerprint(bytes),
        format,
    })
}

/// Read and load a file
pub async fn load_path(path: &Path, csv_fallback: &'static Encoding) -> Result<LoadedInput> {
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path.file_name().and_then(|name| name.to_str());
    load_bytes(&bytes, file_name, csv_fallback)
        .with_context(|| format!("Failed to load {}", path.display()))
}

// =============================================================================
// Spreadsheets
// =============================================================================

fn read_spreadsheet(bytes: &[u8]) -> Result<Grid> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .context("Failed to open workbook")?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| anyhow!("Workbook has no sheets"))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("Failed to read sheet '{}'", sheet_name))?;

    // the used range may start below/right of A1
    let (row_offset, col_offset) = range
        .start()
        .map(|(row, col)| (row as usize, col as usize))
        .unwrap_or((0, 0));

    let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); row_offset];
    for data_row in range.rows() {
        let mut row = vec![Cell::Empty; col_offset];
        row.extend(data_row.iter().map(cell_from_data));
        rows.push(row);
    }
    Ok(Grid::new(rows))
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(Cell::DateTime)
            .unwrap_or_else(|| Cell::Number(dt.as_f64())),
        Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .map(Cell::DateTime)
            .unwrap_or_else(|_| Cell::Text(s.clone())),
        Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(_) => Cell::Empty,
    }
}

// =============================================================================
// CSV
// =============================================================================

/// Decode CSV bytes: BOM, else UTF-8, else `fallback`
pub fn decode_text(bytes: &[u8], fallback: &'static Encoding) -> String {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return text.into_owned();
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (text, _) = fallback.decode_without_bom_handling(bytes);
            text.into_owned()
        }
    }
}

/// `;` when the first non-empty line has more semicolons than commas
fn sniff_delimiter(text: &str) -> u8 {
    let first = text.lines().find(|line| !line.trim().is_empty()).unwrap_or("");
    let commas = first.matches(',').count();
    let semicolons = first.matches(';').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

fn cell_from_field(field: &str) -> Cell {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        Cell::Empty
    } else if let Ok(number) = trimmed.parse::<f64>() {
        Cell::Number(number)
    } else {
        Cell::Text(field.to_string())
    }
}

fn read_csv(bytes: &[u8], fallback: &'static Encoding) -> Result<Grid> {
    let text = decode_text(bytes, fallback);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(sniff_delimiter(&text))
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed CSV at record {}", line + 1))?;
        rows.push(record.iter().map(cell_from_field).collect());
    }
    Ok(Grid::new(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(Some("cc.XLSX"), b""), InputFormat::Spreadsheet);
        assert_eq!(detect_format(Some("leads.csv"), b"PK\x03\x04"), InputFormat::Csv);
        assert_eq!(detect_format(None, b"PK\x03\x04rest"), InputFormat::Spreadsheet);
        assert_eq!(detect_format(Some("upload"), &[0xD0, 0xCF, 0x11, 0xE0]), InputFormat::Spreadsheet);
        assert_eq!(detect_format(None, b"a,b\n"), InputFormat::Csv);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = fingerprint(b"Name,Score\n");
        assert_eq!(a, fingerprint(b"Name,Score\n"));
        assert!(a.starts_with("sha256:"));
        assert_eq!(a.len(), "sha256:".len() + 64);
        assert_ne!(a, fingerprint(b"Name;Score\n"));
    }

    #[test]
    fn test_csv_comma() {
        let loaded = load_bytes(b"Name,Score\nalice,12\n,\n", Some("x.csv"), encoding_rs::WINDOWS_1252).unwrap();
        let rows = loaded.grid.rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], Cell::from("Name"));
        assert_eq!(rows[1][1], Cell::Number(12.0));
        assert_eq!(rows[2], vec![Cell::Empty, Cell::Empty]);
    }

    #[test]
    fn test_csv_semicolon_and_ragged_rows() {
        let loaded = load_bytes(b"Name;Score;Extra\nalice;>=12\n", None, encoding_rs::WINDOWS_1252).unwrap();
        let rows = loaded.grid.rows();
        assert_eq!(rows[0].len(), 3);
        assert_eq!(rows[1], vec![Cell::from("alice"), Cell::from(">=12")]);
    }

    #[test]
    fn test_decode_bom_and_fallback() {
        let with_bom = b"\xEF\xBB\xBFName";
        assert_eq!(decode_text(with_bom, encoding_rs::WINDOWS_1252), "Name");

        // "Jos\xe9" is latin-1, not UTF-8
        assert_eq!(decode_text(b"Jos\xe9", encoding_rs::WINDOWS_1252), "José");
    }

    #[test]
    fn test_corrupt_spreadsheet_is_error() {
        assert!(load_bytes(b"PK\x03\x04garbage", Some("cc.xlsx"), encoding_rs::WINDOWS_1252).is_err());
    }

    #[tokio::test]
    async fn test_load_path() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(b"Agent,LP last note time\nalice,2025-09-09 0:21:46\n").unwrap();
        let loaded = load_path(file.path(), encoding_rs::WINDOWS_1252).await.unwrap();
        assert_eq!(loaded.format, InputFormat::Csv);
        assert_eq!(loaded.grid.row_count(), 2);
        assert_eq!(loaded.grid.rows()[1][1], Cell::from("2025-09-09 0:21:46"));
    }

    #[tokio::test]
    async fn test_load_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.xlsx");
        let err = load_path(&missing, encoding_rs::WINDOWS_1252).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
