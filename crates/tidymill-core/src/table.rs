//! Raw and clean table representations
//!
//! A [`RawTable`] is the immutable input to the pipeline: ordered rows of cell
//! strings, exactly as extracted. A [`CleanTable`] is the tidy output: a
//! single header plus one observation per row, each cell an atomic value.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TidyError};

/// The messy input table. Immutable once ingested.
///
/// Ragged rows are normalised at construction by padding short rows with
/// blank cells, so every row has the same width.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawTable {
    rows: Vec<Vec<String>>,
    width: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    declared_header_rows: Option<usize>,
}

impl RawTable {
    /// Build a raw table from extracted rows.
    ///
    /// Fails with [`TidyError::MalformedInput`] on zero rows or zero columns.
    pub fn new(rows: Vec<Vec<String>>) -> Result<Self> {
        if rows.is_empty() {
            return Err(TidyError::MalformedInput("table has zero rows".into()));
        }
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        if width == 0 {
            return Err(TidyError::MalformedInput("table has zero columns".into()));
        }

        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();

        Ok(Self {
            rows,
            width,
            declared_header_rows: None,
        })
    }

    /// Record a header region supplied by the extraction collaborator. The
    /// profiler uses it verbatim instead of estimating.
    pub fn with_declared_header_rows(mut self, rows: usize) -> Self {
        self.declared_header_rows = Some(rows);
        self
    }

    /// Header region height declared upstream, if any.
    pub fn declared_header_rows(&self) -> Option<usize> {
        self.declared_header_rows
    }

    /// All rows, including any header region.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns (uniform after padding).
    pub fn width(&self) -> usize {
        self.width
    }

    /// Cell at (row, column), if in bounds.
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row).and_then(|r| r.get(column)).map(String::as_str)
    }
}

/// The tidy output table: one header, one observation per row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CleanTable {
    /// Build a clean table; every row must match the header width.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        if columns.is_empty() {
            return Err(TidyError::MalformedInput(
                "clean table has no columns".into(),
            ));
        }
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(TidyError::MalformedInput(format!(
                "row {} has {} cells, expected {}",
                i,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Output column names, in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Observation rows, in order.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of observation rows.
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// True when no observation survived.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// One row as an ordered column-name → value record.
    pub fn record(&self, row: usize) -> Option<Map<String, Value>> {
        self.rows.get(row).map(|cells| {
            self.columns
                .iter()
                .zip(cells)
                .map(|(name, cell)| (name.clone(), Value::String(cell.clone())))
                .collect()
        })
    }

    /// All rows as records, the shape handed to downstream collaborators.
    pub fn records(&self) -> Vec<Map<String, Value>> {
        (0..self.rows.len()).filter_map(|i| self.record(i)).collect()
    }
}

/// A cell is blank when empty or whitespace, or a pandas-style NA marker
/// inherited from the extraction step.
pub fn is_blank(cell: &str) -> bool {
    let trimmed = cell.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") || trimmed == "NA" || trimmed == "-"
}

/// Numeric cell detection, tolerant of thousands separators, currency signs,
/// percent suffixes and accounting parentheses.
pub fn is_numeric(cell: &str) -> bool {
    let mut s = cell.trim();
    if s.is_empty() {
        return false;
    }
    if s.starts_with('(') && s.ends_with(')') {
        s = &s[1..s.len() - 1];
    }
    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '€' | '£' | '%' | ' '))
        .collect();
    if cleaned.is_empty() {
        return false;
    }
    cleaned.parse::<f64>().is_ok()
}

/// Four-digit year, the most common implicit-variable header label.
pub fn is_year(cell: &str) -> bool {
    let s = cell.trim();
    s.len() == 4
        && s.chars().all(|c| c.is_ascii_digit())
        && (s.starts_with("19") || s.starts_with("20"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(row: &[&str]) -> Vec<String> {
        row.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn raw_table_rejects_empty() {
        assert!(RawTable::new(vec![]).is_err());
        assert!(RawTable::new(vec![vec![]]).is_err());
    }

    #[test]
    fn raw_table_pads_ragged_rows() {
        let table = RawTable::new(vec![cells(&["a", "b", "c"]), cells(&["d"])]).unwrap();
        assert_eq!(table.width(), 3);
        assert_eq!(table.cell(1, 2), Some(""));
    }

    #[test]
    fn clean_table_checks_row_width() {
        let result = CleanTable::new(
            vec!["Region".into(), "Value".into()],
            vec![cells(&["East"])],
        );
        assert!(result.is_err());
    }

    #[test]
    fn clean_table_records_preserve_column_order() {
        let table = CleanTable::new(
            vec!["Region".into(), "Year".into(), "Value".into()],
            vec![cells(&["East", "2020", "10"])],
        )
        .unwrap();

        let record = table.record(0).unwrap();
        let keys: Vec<&String> = record.keys().collect();
        assert_eq!(keys, ["Region", "Year", "Value"]);
        assert_eq!(record["Value"], Value::String("10".into()));

        // Column order must survive serialization too, not only Map iteration.
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"Region":"East","Year":"2020","Value":"10"}"#
        );
    }

    #[test]
    fn blank_detection() {
        assert!(is_blank(""));
        assert!(is_blank("   "));
        assert!(is_blank("NaN"));
        assert!(!is_blank("0"));
    }

    #[test]
    fn numeric_detection() {
        assert!(is_numeric("42"));
        assert!(is_numeric("1,234.5"));
        assert!(is_numeric("$12"));
        assert!(is_numeric("(3.2)"));
        assert!(is_numeric("15%"));
        assert!(!is_numeric("East"));
        assert!(!is_numeric(""));
        assert!(!is_numeric("$,%"));
    }

    #[test]
    fn year_detection() {
        assert!(is_year("2020"));
        assert!(is_year("1999"));
        assert!(!is_year("20"));
        assert!(!is_year("Region"));
        assert!(!is_year("3020"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn raw_table_rows_are_always_uniform(
                rows in proptest::collection::vec(
                    proptest::collection::vec(".{0,8}", 0..6),
                    1..8,
                )
            ) {
                if let Ok(table) = RawTable::new(rows) {
                    prop_assert!(table.width() > 0);
                    for row in table.rows() {
                        prop_assert_eq!(row.len(), table.width());
                    }
                }
            }

            #[test]
            fn cell_predicates_never_panic(cell in ".{0,32}") {
                // Exercised on arbitrary extractor garbage.
                let _ = is_blank(&cell);
                let _ = is_numeric(&cell);
                let _ = is_year(&cell);
            }

            #[test]
            fn formatted_numbers_are_numeric(n in -1_000_000i64..1_000_000) {
                let plain = n.to_string();
                let with_percent = format!("{plain}%");
                prop_assert!(is_numeric(&plain));
                prop_assert!(is_numeric(&with_percent));
            }
        }
    }
}
