use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use regex::Regex;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Title row of the section holding metric-ton denominated trades
pub const SECTION_MARKER: &str = "Единица измерения: Метрическая тонна";
pub const CONTRACT_MARKER: &str = "Договор";
pub const CONTRACT_UNIT_MARKER: &str = "шт";
pub const PRODUCT_CODE_COLUMN: &str = "Код Инструмента";
pub const TOTAL_ROW_MARKER: &str = "Итого";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to open workbook {path}: {msg}")]
    WorkbookOpen { path: String, msg: String },

    #[error("Workbook has no readable worksheet: {0}")]
    NoWorksheet(String),

    #[error("Section \"{0}\" not found")]
    SectionNotFound(String),

    #[error("Contract count column not found among {0:?}")]
    MissingColumn(Vec<String>),
}

/// Markers that identify the section, its contract-count column and footer rows
#[derive(Debug, Clone)]
pub struct TableLayout {
    pub section_marker: String,
    pub contract_marker: String,
    pub contract_unit_marker: String,
    pub product_code_column: String,
    pub total_row_marker: String,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            section_marker: SECTION_MARKER.to_string(),
            contract_marker: CONTRACT_MARKER.to_string(),
            contract_unit_marker: CONTRACT_UNIT_MARKER.to_string(),
            product_code_column: PRODUCT_CODE_COLUMN.to_string(),
            total_row_marker: TOTAL_ROW_MARKER.to_string(),
        }
    }
}

/// The extracted section: normalized column names and the surviving data rows.
/// The contract-count column holds `Data::Int` values, all strictly positive.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedTable {
    columns: Vec<String>,
    rows: Vec<Vec<Data>>,
}

impl CleanedTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Data>>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = TableRow<'_>> {
        self.rows.iter().map(move |values| TableRow {
            columns: &self.columns,
            values,
        })
    }
}

/// Borrowed view of one row, addressed by column name
#[derive(Debug, Clone, Copy)]
pub struct TableRow<'a> {
    columns: &'a [String],
    values: &'a [Data],
}

impl<'a> TableRow<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Data> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.values.get(idx)
    }

    pub fn text(&self, column: &str) -> Option<String> {
        self.get(column).map(cell_text)
    }
}

/// Parser for the metric-ton section of an exchange trading bulletin
///
/// # Expected Layout:
/// ```text
/// Row i:     "Единица измерения: Метрическая тонна"
/// Row i+1:   header level 1 ("Код Инструмента", "Объем Договоров", ...)
/// Row i+2:   header level 2 (sub-captions such as "руб.")
/// Row i+3..: trades, interleaved with blank rows and "Итого:" footers
/// ```
#[derive(Debug, Clone)]
pub struct TableExtractor {
    layout: TableLayout,
    non_digits: Regex,
}

impl Default for TableExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TableExtractor {
    pub fn new() -> Self {
        Self::with_layout(TableLayout::default())
    }

    pub fn with_layout(layout: TableLayout) -> Self {
        Self {
            layout,
            non_digits: Regex::new("[^0-9]+").expect("static pattern is valid"),
        }
    }

    /// Read the first worksheet of a bulletin and extract the section.
    /// The format is detected from the content, not the extension, since
    /// `.xls` bulletins are sometimes served as xlsx.
    /// Blocking; async callers should use `spawn_blocking`.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn extract_file(&self, path: &Path) -> Result<CleanedTable, ExtractError> {
        let open_error = |msg: String| ExtractError::WorkbookOpen {
            path: path.display().to_string(),
            msg,
        };

        let bytes = std::fs::read(path).map_err(|e| open_error(e.to_string()))?;
        let mut workbook =
            open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| open_error(e.to_string()))?;

        let grid = match workbook.worksheet_range_at(0) {
            Some(Ok(range)) => range,
            Some(Err(e)) => return Err(open_error(e.to_string())),
            None => return Err(ExtractError::NoWorksheet(path.display().to_string())),
        };
        debug!("Read grid of {}x{} cells", grid.height(), grid.width());

        self.extract(&grid)
    }

    /// Extract the section from an unlabeled grid
    pub fn extract(&self, grid: &Range<Data>) -> Result<CleanedTable, ExtractError> {
        let rows: Vec<&[Data]> = grid.rows().collect();

        let section_idx = self.find_section(&rows)?;
        debug!("Found section at row {}", section_idx);

        let empty: &[Data] = &[];
        let level1 = rows.get(section_idx + 1).copied().unwrap_or(empty);
        let level2 = rows.get(section_idx + 2).copied().unwrap_or(empty);
        let columns: Vec<String> = build_columns(level1, level2, grid.width())
            .iter()
            .map(|c| normalize_column_name(c))
            .collect();

        let block: Vec<Vec<Data>> = rows
            .iter()
            .skip(section_idx + 3)
            .filter(|row| !row.iter().all(is_missing))
            .map(|row| row.to_vec())
            .collect();
        debug!("Data block has {} non-empty rows", block.len());

        let table = self.filter_by_contracts(columns, block)?;
        info!(
            "Extracted {} rows with {} columns",
            table.len(),
            table.columns().len()
        );
        Ok(table)
    }

    fn find_section(&self, rows: &[&[Data]]) -> Result<usize, ExtractError> {
        let marker = self.layout.section_marker.to_lowercase();

        rows.iter()
            .position(|row| {
                row.iter()
                    .any(|cell| cell_text(cell).to_lowercase().contains(&marker))
            })
            .ok_or_else(|| ExtractError::SectionNotFound(self.layout.section_marker.clone()))
    }

    fn contract_column(&self, columns: &[String]) -> Option<usize> {
        let unit = self.layout.contract_unit_marker.to_lowercase();
        columns.iter().position(|c| {
            c.contains(&self.layout.contract_marker) && c.to_lowercase().contains(&unit)
        })
    }

    /// Coerce a contract-count cell: drop every non-digit, empty means zero
    pub fn parse_contract_count(&self, cell: &Data) -> i64 {
        let digits = self.non_digits.replace_all(&cell_text(cell), "").into_owned();
        if digits.is_empty() {
            return 0;
        }
        digits.parse().unwrap_or_else(|_| {
            warn!("Contract count '{}' does not fit in an integer, treating as 0", digits);
            0
        })
    }

    fn filter_by_contracts(
        &self,
        columns: Vec<String>,
        block: Vec<Vec<Data>>,
    ) -> Result<CleanedTable, ExtractError> {
        let contract_idx = self
            .contract_column(&columns)
            .ok_or_else(|| ExtractError::MissingColumn(columns.clone()))?;
        let product_idx = columns
            .iter()
            .position(|c| *c == self.layout.product_code_column);

        let mut dropped_empty = 0;
        let mut dropped_totals = 0;
        let mut rows = Vec::with_capacity(block.len());

        for mut row in block {
            let count = row
                .get(contract_idx)
                .map(|cell| self.parse_contract_count(cell))
                .unwrap_or(0);
            if count <= 0 {
                dropped_empty += 1;
                continue;
            }

            if let Some(cell) = product_idx.and_then(|idx| row.get(idx)) {
                if cell_text(cell).contains(&self.layout.total_row_marker) {
                    dropped_totals += 1;
                    continue;
                }
            }

            if let Some(cell) = row.get_mut(contract_idx) {
                *cell = Data::Int(count);
            }
            rows.push(row);
        }

        debug!(
            "Dropped {} rows without contracts and {} total rows",
            dropped_empty, dropped_totals
        );
        Ok(CleanedTable::new(columns, rows))
    }
}

/// Compose one column name from its two header levels
pub fn compose_column_name(level1: &str, level2: &str) -> String {
    let level1 = level1.trim();
    let level2 = level2.trim();

    if !level1.is_empty() && !level2.is_empty() {
        format!("{level1} ({level2})")
    } else if !level1.is_empty() {
        level1.to_string()
    } else {
        level2.to_string()
    }
}

fn build_columns(level1: &[Data], level2: &[Data], width: usize) -> Vec<String> {
    (0..width)
        .map(|col| {
            let l1 = level1.get(col).map(cell_text).unwrap_or_default();
            let l2 = level2.get(col).map(cell_text).unwrap_or_default();
            compose_column_name(&l1, &l2)
        })
        .collect()
}

/// Newlines become spaces, double spaces become single, ends are trimmed
pub fn normalize_column_name(name: &str) -> String {
    name.replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .replace("  ", " ")
        .trim()
        .to_string()
}

/// String form of a cell; integral floats render without a fractional part
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.is_nan() => String::new(),
        other => other.to_string(),
    }
}

fn is_missing(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.is_empty(),
        Data::Float(f) => f.is_nan(),
        _ => false,
    }
}
