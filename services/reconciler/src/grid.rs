//! Tabular model shared by the loader and every extraction stage.
//!
//! A [`Grid`] is the raw sheet exactly as read: no header row is assumed.
//! A [`Table`] is a grid after header promotion. Every table operation
//! returns a new table, so each stage can be tested on its own.

use chrono::NaiveDateTime;

static EMPTY: Cell = Cell::Empty;

/// A single spreadsheet cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Cell {
    /// True for empty cells, whitespace-only text and NaN numbers
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(n) => n.is_nan(),
            Cell::Bool(_) | Cell::DateTime(_) => false,
        }
    }

    /// Trimmed display form, `None` when blank
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Cell::Number(n) if n.is_nan() => None,
            Cell::Number(n) => Some(format_number(*n)),
            Cell::Bool(b) => Some(if *b { "True" } else { "False" }.to_string()),
            Cell::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }

    /// Strict numeric view: numbers pass through, text must be a bare float.
    /// Decorated text (">=12", "15%") is NOT numeric here; see `value::clean_numeric`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) if n.is_finite() => Some(*n),
            Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Number(value as f64)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

impl From<NaiveDateTime> for Cell {
    fn from(value: NaiveDateTime) -> Self {
        Cell::DateTime(value)
    }
}

/// Integral floats print without a fractional part ("12", not "12.0")
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

// =============================================================================
// GRID - raw sheet
// =============================================================================

/// Raw sheet: ordered rows of typed cells, rows may have different lengths
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    rows: Vec<Vec<Cell>>,
}

impl Grid {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Width of the widest row
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Copy of the grid with the leftmost column removed
    pub fn without_first_column(&self) -> Grid {
        Grid::new(
            self.rows
                .iter()
                .map(|row| row.iter().skip(1).cloned().collect())
                .collect(),
        )
    }
}

// =============================================================================
// TABLE - grid with a promoted header row
// =============================================================================

/// Grid with named columns. All rows are padded to the header width.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Cell::Empty);
                row
            })
            .collect();
        Self { headers, rows }
    }

    /// Promote `header_row` to column names. Rows above it are discarded, as are
    /// the `skip_after_header` rows directly below it.
    /// Returns `None` when the sheet has no such row.
    pub fn from_grid(grid: &Grid, header_row: usize, skip_after_header: usize) -> Option<Table> {
        let header_cells = grid.rows().get(header_row)?;
        let width = grid.width();
        let mut headers: Vec<String> = header_cells
            .iter()
            .map(|cell| cell.as_text().unwrap_or_default())
            .collect();
        headers.resize(width, String::new());

        let rows = grid
            .rows()
            .iter()
            .skip(header_row + 1 + skip_after_header)
            .cloned()
            .collect();
        Some(Table::new(headers, rows))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    /// Cell at (row, col); out-of-range positions read as empty
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    pub fn column(&self, col: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.rows.iter().map(move |row| row.get(col).unwrap_or(&EMPTY))
    }

    /// Blank cells in `col` inherit the last non-blank value above them
    pub fn forward_fill(&self, col: usize) -> Table {
        let mut last: Option<Cell> = None;
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                if let Some(cell) = row.get_mut(col) {
                    if cell.is_blank() {
                        if let Some(previous) = &last {
                            *cell = previous.clone();
                        }
                    } else {
                        last = Some(cell.clone());
                    }
                }
                row
            })
            .collect();
        Table {
            headers: self.headers.clone(),
            rows,
        }
    }

    /// Remove every column whose header satisfies `drop`; returns the new table
    /// and the number of columns removed
    pub fn drop_columns<F>(&self, drop: F) -> (Table, usize)
    where
        F: Fn(&str) -> bool,
    {
        let keep: Vec<usize> = (0..self.width())
            .filter(|&idx| !drop(&self.headers[idx]))
            .collect();
        let removed = self.width() - keep.len();
        let headers = keep.iter().map(|&idx| self.headers[idx].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| keep.iter().map(|&idx| row[idx].clone()).collect())
            .collect();
        (Table { headers, rows }, removed)
    }

    /// Keep rows for which `keep` is true; returns the new table and the
    /// number of rows removed
    pub fn retain_rows<F>(&self, keep: F) -> (Table, usize)
    where
        F: Fn(&[Cell]) -> bool,
    {
        let rows: Vec<Vec<Cell>> = self
            .rows
            .iter()
            .filter(|row| keep(row))
            .cloned()
            .collect();
        let removed = self.rows.len() - rows.len();
        (
            Table {
                headers: self.headers.clone(),
                rows,
            },
            removed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn grid(rows: Vec<Vec<Cell>>) -> Grid {
        Grid::new(rows)
    }

    // -------------------------------------------------------------------------
    // CELL TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_cell_blank_detection() {
        assert!(Cell::Empty.is_blank());
        assert!(Cell::from("   ").is_blank());
        assert!(Cell::Number(f64::NAN).is_blank());
        assert!(!Cell::from("x").is_blank());
        assert!(!Cell::Number(0.0).is_blank());
    }

    #[test]
    fn test_cell_text_formats_integral_numbers() {
        assert_eq!(Cell::Number(12.0).as_text().as_deref(), Some("12"));
        assert_eq!(Cell::Number(0.5).as_text().as_deref(), Some("0.5"));
        assert_eq!(Cell::from("  alice ").as_text().as_deref(), Some("alice"));
    }

    #[test]
    fn test_cell_text_formats_datetime() {
        let dt = NaiveDate::from_ymd_opt(2025, 9, 9)
            .unwrap()
            .and_hms_opt(0, 21, 46)
            .unwrap();
        assert_eq!(
            Cell::DateTime(dt).as_text().as_deref(),
            Some("2025-09-09 00:21:46")
        );
    }

    #[test]
    fn test_cell_strict_number() {
        assert_eq!(Cell::from(" 12 ").as_number(), Some(12.0));
        assert_eq!(Cell::from(">=12").as_number(), None);
        assert_eq!(Cell::Bool(true).as_number(), None);
        assert_eq!(Cell::Number(f64::INFINITY).as_number(), None);
    }

    // -------------------------------------------------------------------------
    // TABLE TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_header_promotion_discards_rows_above() {
        let g = grid(vec![
            vec!["Report".into()],
            vec![Cell::Empty],
            vec!["Name".into(), "Score".into()],
            vec!["alice".into(), 1.0.into()],
        ]);
        let table = Table::from_grid(&g, 2, 0).unwrap();
        assert_eq!(table.headers(), &["Name".to_string(), "Score".to_string()]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.cell(0, 0), &Cell::from("alice"));
    }

    #[test]
    fn test_header_promotion_skips_rows_below() {
        let g = grid(vec![
            vec!["Name".into()],
            vec!["sub header".into()],
            vec!["notes".into()],
            vec!["alice".into()],
        ]);
        let table = Table::from_grid(&g, 0, 2).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.cell(0, 0), &Cell::from("alice"));
    }

    #[test]
    fn test_header_promotion_missing_row() {
        let g = grid(vec![vec!["only".into()]]);
        assert!(Table::from_grid(&g, 3, 0).is_none());
    }

    #[test]
    fn test_rows_padded_to_header_width() {
        let g = grid(vec![
            vec!["A".into()],
            vec!["1".into(), "2".into(), "3".into()],
        ]);
        let table = Table::from_grid(&g, 0, 0).unwrap();
        assert_eq!(table.width(), 3);
        assert_eq!(table.headers()[2], "");
        assert_eq!(table.cell(0, 2), &Cell::from("3"));
        assert_eq!(table.cell(5, 5), &Cell::Empty);
    }

    #[test]
    fn test_forward_fill() {
        let table = Table::new(
            vec!["Team".into(), "Name".into()],
            vec![
                vec!["T1".into(), "a".into()],
                vec![Cell::Empty, "b".into()],
                vec!["T2".into(), "c".into()],
                vec!["  ".into(), "d".into()],
            ],
        );
        let filled = table.forward_fill(0);
        let teams: Vec<Cell> = filled.column(0).cloned().collect();
        let expected: Vec<Cell> = vec!["T1".into(), "T1".into(), "T2".into(), "T2".into()];
        assert_eq!(teams, expected);
        // input untouched
        assert_eq!(table.cell(1, 0), &Cell::Empty);
    }

    #[test]
    fn test_drop_columns() {
        let table = Table::new(
            vec!["#".into(), "Name".into()],
            vec![vec![1.0.into(), "a".into()]],
        );
        let (dropped, removed) = table.drop_columns(|h| h.trim() == "#");
        assert_eq!(removed, 1);
        assert_eq!(dropped.headers(), &["Name".to_string()]);
        assert_eq!(dropped.cell(0, 0), &Cell::from("a"));
    }

    #[test]
    fn test_retain_rows_counts_removed() {
        let table = Table::new(
            vec!["Name".into()],
            vec![vec!["a".into()], vec![Cell::Empty], vec!["b".into()]],
        );
        let (kept, removed) = table.retain_rows(|row| !row[0].is_blank());
        assert_eq!(removed, 1);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_without_first_column() {
        let g = grid(vec![vec!["x".into(), "y".into()], vec![Cell::Empty]]);
        let trimmed = g.without_first_column();
        assert_eq!(trimmed.rows()[0], vec![Cell::from("y")]);
        assert!(trimmed.rows()[1].is_empty());
    }
}
