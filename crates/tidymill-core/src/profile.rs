//! Structural profiling of raw tables
//!
//! The profiler is the only stage that reads the full table; everything
//! downstream reasons over the compressed [`TableProfile`]. It is
//! deterministic and fails only on malformed input.
//!
//! Section-header detection runs before aggregate classification: a one-cell
//! row is claimed as a section header only when a populated block follows it,
//! otherwise it is left to the keyword filter.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::RemediationConfig;
use crate::error::{Result, TidyError};
use crate::table::{is_blank, is_numeric, is_year, RawTable};

/// Maximum number of leading rows considered for the header region.
const MAX_HEADER_ROWS: usize = 3;

/// Inferred column content type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// All non-blank body cells parse as numbers
    Numeric,
    /// All non-blank body cells look like dates or years
    Date,
    /// No non-blank body cell parses as a number
    Categorical,
    /// Anything else
    Mixed,
}

/// Per-column structural summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnProfile {
    /// Header text (joined across header rows), or `col{N}` when headerless
    pub name: String,
    /// Inferred content type of the body cells
    pub column_type: ColumnType,
    /// Distinct non-blank body values
    pub distinct_count: usize,
    /// Distinct count over body length
    pub unique_ratio: f64,
    /// Fraction of blank body cells
    pub blank_ratio: f64,
    /// Longest blank run directly following a non-blank value
    pub max_blank_run: usize,
    /// Header text matches a year or date pattern (wide-format signal)
    pub header_is_period: bool,
    /// First five non-blank body values
    pub sample_values: Vec<String>,
    /// Any body cell matches an aggregate keyword
    pub contains_total_labels: bool,
}

/// Aggregate structural profile of one raw table.
///
/// Produced once per table and consumed read-only by every downstream stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableProfile {
    /// Total rows, header region included
    pub row_count: usize,
    /// Uniform column count
    pub column_count: usize,
    /// Estimated height of the header region
    pub header_rows: usize,
    /// Per-column summaries
    pub columns: Vec<ColumnProfile>,
    /// Absolute indices of rows whose leading cell matches an aggregate marker
    pub aggregate_rows: Vec<usize>,
    /// Absolute indices of one-cell label rows sitting above populated blocks
    pub section_header_rows: Vec<usize>,
    /// Indices of columns showing the value-then-blank-run fill pattern
    pub forward_fill_columns: Vec<usize>,
}

/// Compile the configured aggregate regex list.
fn aggregate_regexes(config: &RemediationConfig) -> Result<Vec<Regex>> {
    config
        .aggregate_patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| TidyError::Config(format!("bad aggregate pattern '{p}': {e}")))
        })
        .collect()
}

fn matches_aggregate(cell: &str, config: &RemediationConfig, regexes: &[Regex]) -> bool {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return false;
    }
    let lowered = trimmed.to_lowercase();
    config.aggregate_keywords.iter().any(|k| *k == lowered)
        || regexes.iter().any(|r| r.is_match(trimmed))
}

/// A label-like cell: non-numeric text, or a period label such as a year,
/// which is numeric but belongs in headers.
fn is_label_like(cell: &str) -> bool {
    !is_numeric(cell) || is_year(cell) || is_date_like(cell)
}

/// Year or common date shapes.
pub(crate) fn is_date_like(cell: &str) -> bool {
    let s = cell.trim();
    if is_year(s) {
        return true;
    }
    let bytes = s.as_bytes();
    // yyyy-mm or yyyy/mm, optionally with a day part
    if s.len() >= 7
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && (bytes[4] == b'-' || bytes[4] == b'/')
    {
        return s[5..]
            .chars()
            .all(|c| c.is_ascii_digit() || c == '-' || c == '/');
    }
    // dd/mm/yy and friends
    let slashes = s.chars().filter(|c| *c == '/').count();
    slashes == 2 && s.chars().all(|c| c.is_ascii_digit() || c == '/')
}

fn non_blank_count(row: &[String]) -> usize {
    row.iter().filter(|c| !is_blank(c)).count()
}

/// One-cell label rows sitting above otherwise-populated rows.
fn detect_section_headers(table: &RawTable) -> Vec<usize> {
    let rows = table.rows();
    let mut sections = Vec::new();

    for (i, row) in rows.iter().enumerate() {
        if non_blank_count(row) != 1 {
            continue;
        }
        // Find the next row that is not itself a one-cell label row; the
        // candidate only counts when that row is populated.
        let below = rows[i + 1..]
            .iter()
            .find(|r| non_blank_count(r) != 1);
        if below.is_some_and(|r| non_blank_count(r) >= 2) {
            sections.push(i);
        }
    }
    sections
}

/// Estimate the header region height.
///
/// Leading rows (section headers skipped) stay in the header while a majority
/// of their non-blank cells are label-like and at least one numeric-bodied
/// column carries a label in the row. Tables with no numeric column fall back
/// to the one-header-row convention.
fn estimate_header_rows(table: &RawTable, sections: &[usize]) -> usize {
    let rows = table.rows();
    let start = (0..rows.len())
        .find(|i| !sections.contains(i))
        .unwrap_or(0);

    // Body type reference: numeric share per column, measured below the
    // deepest header the estimate could claim.
    let body_start = (start + MAX_HEADER_ROWS).min(rows.len());
    let numeric_body: Vec<bool> = (0..table.width())
        .map(|col| {
            let (mut numeric, mut seen) = (0usize, 0usize);
            for row in &rows[body_start.min(rows.len().saturating_sub(1))..] {
                let cell = &row[col];
                if is_blank(cell) {
                    continue;
                }
                seen += 1;
                if is_numeric(cell) && !is_year(cell) {
                    numeric += 1;
                }
            }
            seen > 0 && numeric * 2 > seen
        })
        .collect();
    let has_numeric_body = numeric_body.iter().any(|b| *b);

    let mut header_rows = 0;
    for (offset, row) in rows[start..].iter().enumerate() {
        if header_rows == MAX_HEADER_ROWS || start + offset + 1 >= rows.len() {
            break;
        }
        if sections.contains(&(start + offset)) {
            break;
        }
        let non_blank = non_blank_count(row);
        if non_blank == 0 {
            break;
        }
        let label_like = row.iter().filter(|c| !is_blank(c) && is_label_like(c)).count();
        let majority_labels = label_like * 2 > non_blank;

        let header_like = if has_numeric_body {
            majority_labels
                && numeric_body
                    .iter()
                    .enumerate()
                    .any(|(col, numeric)| *numeric && !is_blank(&row[col]) && is_label_like(&row[col]))
        } else {
            // All-categorical table: only the conventional single header row.
            offset == 0
        };

        if !header_like {
            break;
        }
        header_rows += 1;
    }
    header_rows
}

/// Compute the structural profile of a raw table.
///
/// Deterministic; fails only on a bad aggregate pattern in the configuration.
/// (Empty input is already rejected by [`RawTable::new`].)
pub fn profile(table: &RawTable, config: &RemediationConfig) -> Result<TableProfile> {
    let regexes = aggregate_regexes(config)?;
    let rows = table.rows();

    let section_header_rows = detect_section_headers(table);
    let header_rows = table
        .declared_header_rows()
        .map(|n| n.min(rows.len().saturating_sub(1)))
        .unwrap_or_else(|| estimate_header_rows(table, &section_header_rows));

    let header_start = (0..rows.len())
        .find(|i| !section_header_rows.contains(i))
        .unwrap_or(0);
    let body_start = header_start + header_rows;

    let aggregate_rows: Vec<usize> = (body_start..rows.len())
        .filter(|&i| matches_aggregate(&rows[i][0], config, &regexes))
        .collect();

    let mut columns = Vec::with_capacity(table.width());
    let mut forward_fill_columns = Vec::new();

    for col in 0..table.width() {
        let name = {
            let joined: Vec<&str> = rows[header_start..body_start]
                .iter()
                .map(|r| r[col].trim())
                .filter(|c| !is_blank(c))
                .collect();
            if joined.is_empty() {
                format!("col{col}")
            } else {
                joined.join(" ")
            }
        };

        // Section-header rows are labels, not observations; keep them out of
        // the column statistics.
        let body: Vec<&str> = (body_start..rows.len())
            .filter(|i| !section_header_rows.contains(i))
            .map(|i| rows[i][col].as_str())
            .collect();
        let non_blank: Vec<&str> = body.iter().copied().filter(|c| !is_blank(c)).collect();

        let column_type = infer_type(&non_blank);

        let mut distinct: Vec<&str> = non_blank.iter().map(|c| c.trim()).collect();
        distinct.sort_unstable();
        distinct.dedup();
        let distinct_count = distinct.len();

        let blank_count = body.len() - non_blank.len();
        let max_blank_run = max_blank_run(&body);
        if max_blank_run >= 2 {
            forward_fill_columns.push(col);
        }

        columns.push(ColumnProfile {
            header_is_period: is_date_like(&name),
            column_type,
            distinct_count,
            unique_ratio: if body.is_empty() {
                0.0
            } else {
                distinct_count as f64 / body.len() as f64
            },
            blank_ratio: if body.is_empty() {
                0.0
            } else {
                blank_count as f64 / body.len() as f64
            },
            max_blank_run,
            sample_values: non_blank.iter().take(5).map(|c| c.trim().to_string()).collect(),
            contains_total_labels: non_blank
                .iter()
                .any(|c| matches_aggregate(c, config, &regexes)),
            name,
        });
    }

    Ok(TableProfile {
        row_count: rows.len(),
        column_count: table.width(),
        header_rows,
        columns,
        aggregate_rows,
        section_header_rows,
        forward_fill_columns,
    })
}

fn infer_type(non_blank: &[&str]) -> ColumnType {
    if non_blank.is_empty() {
        return ColumnType::Categorical;
    }
    let numeric = non_blank.iter().filter(|c| is_numeric(c)).count();
    let dates = non_blank.iter().filter(|c| is_date_like(c)).count();
    if dates == non_blank.len() {
        ColumnType::Date
    } else if numeric == non_blank.len() {
        ColumnType::Numeric
    } else if numeric == 0 {
        ColumnType::Categorical
    } else {
        ColumnType::Mixed
    }
}

/// Longest blank run directly following a non-blank value. Leading blanks do
/// not count: they carry no value to fill forward.
fn max_blank_run(body: &[&str]) -> usize {
    let mut seen_value = false;
    let mut run = 0;
    let mut best = 0;
    for cell in body {
        if is_blank(cell) {
            if seen_value {
                run += 1;
                best = best.max(run);
            }
        } else {
            seen_value = true;
            run = 0;
        }
    }
    best
}
