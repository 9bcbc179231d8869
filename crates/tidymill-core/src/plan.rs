//! Diagnosis and remediation plan types
//!
//! [`Diagnosis`] is the advisory output of the first reasoning call;
//! [`RemediationPlan`] is the authoritative output of the second and the
//! single source of truth for both the synthesizer and the validator.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TidyError};

/// Coordinates of one cell in the raw table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CellRef {
    /// Absolute row index in the raw table
    pub row: usize,
    /// Column index
    pub column: usize,
}

/// Structured judgment from the diagnose stage. Advisory, never authoritative:
/// the validator checks the plan, not this.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Diagnosis {
    /// Header region spans more than one row
    pub hierarchical_header: bool,
    /// Height of the header region as judged by the oracle
    pub header_row_span: usize,
    /// Rows judged to be section labels
    #[serde(default)]
    pub section_header_rows: Vec<usize>,
    /// Rows judged to be embedded aggregates
    #[serde(default)]
    pub aggregate_rows: Vec<usize>,
    /// Columns whose header text is itself a data value (wide format)
    #[serde(default)]
    pub wide_value_columns: Vec<String>,
}

/// One flattened output column: the header cells it is assembled from and the
/// name it gets in the output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeaderMapping {
    /// Source header cells, top to bottom
    pub cells: Vec<CellRef>,
    /// Single output column name
    pub output_name: String,
}

/// How an injected implicit-variable column is populated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FillRule {
    /// Same value on every row
    Constant,
    /// Last non-blank value propagates downward
    ForwardFill,
}

/// Where an injected column's values come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InjectionSource {
    /// A single cell (title or merged label) applying to every row
    Cell(CellRef),
    /// The single cells of the listed section-header rows, each applying to
    /// the rows beneath it
    SectionRows {
        /// Absolute indices of the section-header rows
        rows: Vec<usize>,
    },
    /// A sparsely populated existing column
    Column {
        /// Column index in the raw table
        index: usize,
    },
}

/// One implicit-variable injection: a value present only in a header, title
/// or merged cell, materialised as its own column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Injection {
    /// Name of the new output column
    pub column_name: String,
    /// Value locator
    pub source: InjectionSource,
    /// Fill behaviour beneath the located values
    pub fill: FillRule,
}

/// Predicate marking rows for deletion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RowFilter {
    /// Literal text or regex, per `literal`
    pub pattern: String,
    /// Column the predicate applies to; leading column when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Treat `pattern` as literal text rather than a regex
    #[serde(default)]
    pub literal: bool,
}

impl RowFilter {
    /// Literal, case-insensitive whole-cell filter on the leading column.
    pub fn literal(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            column: None,
            literal: true,
        }
    }

    /// Compiled predicate. Literal patterns are escaped and anchored;
    /// matching is case-insensitive over the trimmed cell.
    pub fn regex(&self) -> Result<Regex> {
        let source = if self.literal {
            format!("(?i)^{}$", regex::escape(self.pattern.trim()))
        } else {
            format!("(?i){}", self.pattern)
        };
        Regex::new(&source)
            .map_err(|e| TidyError::Config(format!("bad row filter '{}': {e}", self.pattern)))
    }

    /// Whether a cell value triggers this filter.
    pub fn matches(&self, cell: &str) -> bool {
        self.regex().map(|r| r.is_match(cell.trim())).unwrap_or(false)
    }
}

fn default_variable_column() -> String {
    "variable".into()
}

fn default_value_column() -> String {
    "value".into()
}

/// The authoritative remediation plan produced by the strategize stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemediationPlan {
    /// Multi-row header cells → flat output column names
    #[serde(default)]
    pub header: Vec<HeaderMapping>,
    /// Implicit-variable injections
    #[serde(default)]
    pub injections: Vec<Injection>,
    /// Row deletion predicates
    #[serde(default)]
    pub row_filters: Vec<RowFilter>,
    /// Columns that identify an observation
    pub identity_columns: Vec<String>,
    /// Columns to collapse into variable-label/value rows
    #[serde(default)]
    pub measure_columns: Vec<String>,
    /// Name of the variable-label column produced by unpivoting
    #[serde(default = "default_variable_column")]
    pub variable_column: String,
    /// Name of the value column produced by unpivoting
    #[serde(default = "default_value_column")]
    pub value_column: String,
}

impl RemediationPlan {
    /// True when the plan collapses measure columns into long format.
    pub fn is_unpivot(&self) -> bool {
        !self.measure_columns.is_empty()
    }

    /// Whether any plan filter marks this cell's row for deletion.
    pub fn any_filter_matches(&self, cell: &str) -> bool {
        self.row_filters.iter().any(|f| f.matches(cell))
    }
}
