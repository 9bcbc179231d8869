//! Tidy-invariant validation
//!
//! The validator checks the executor's output against the tidy-data rules and
//! the structural expectations of the plan. Every check yields a distinct
//! violation kind with row/column locators, so a failed report can be fed back
//! to the synthesizer as concrete repair context.

use serde::{Deserialize, Serialize};

use crate::config::RemediationConfig;
use crate::plan::RemediationPlan;
use crate::table::CleanTable;

/// One invariant failure, with locators where they exist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// A cell still carries an un-split composite value
    Atomicity {
        /// Observation row index
        row: usize,
        /// Output column name
        column: String,
        /// Separator found inside the cell
        separator: String,
    },
    /// A data row duplicates the header
    MultipleHeaderRows {
        /// Observation row index
        row: usize,
    },
    /// A row still matches one of the plan's deletion predicates
    ResidualAggregate {
        /// Observation row index
        row: usize,
        /// Filter pattern that matched
        pattern: String,
    },
    /// A plan filter targets a column that is missing from the output
    MissingFilterColumn {
        /// Column the filter names
        column: String,
        /// Pattern of the unanchored filter
        pattern: String,
    },
    /// Two observations share the same identity (∪ variable label)
    IdentityDuplicate {
        /// Index of the later duplicate row
        row: usize,
    },
    /// An identity column named by the plan is missing from the output
    MissingIdentityColumn {
        /// Column name
        column: String,
    },
    /// A measure column named by the plan survived in the output header
    MeasureNotCollapsed {
        /// Column name
        column: String,
    },
    /// The plan unpivots but the variable-label/value pair is missing
    MissingUnpivotColumns {
        /// Expected variable-label column
        variable: String,
        /// Expected value column
        value: String,
    },
    /// No observation survived filtering
    EmptyResult,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Atomicity { row, column, separator } => write!(
                f,
                "row {row}, column '{column}': composite value with separator '{separator}'"
            ),
            Self::MultipleHeaderRows { row } => {
                write!(f, "row {row} duplicates the header row")
            }
            Self::ResidualAggregate { row, pattern } => {
                write!(f, "row {row} still matches filter pattern '{pattern}'")
            }
            Self::MissingFilterColumn { column, pattern } => write!(
                f,
                "filter column '{column}' for pattern '{pattern}' missing from output"
            ),
            Self::IdentityDuplicate { row } => {
                write!(f, "row {row} duplicates an earlier observation's identity")
            }
            Self::MissingIdentityColumn { column } => {
                write!(f, "identity column '{column}' missing from output")
            }
            Self::MeasureNotCollapsed { column } => {
                write!(f, "measure column '{column}' was not collapsed")
            }
            Self::MissingUnpivotColumns { variable, value } => write!(
                f,
                "expected unpivot columns '{variable}'/'{value}' missing from output"
            ),
            Self::EmptyResult => write!(f, "output has zero rows"),
        }
    }
}

/// Outcome of one validation pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationReport {
    violations: Vec<Violation>,
}

impl ValidationReport {
    /// True when every invariant held.
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// All violations found.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Consume the report, yielding the violations.
    pub fn into_violations(self) -> Vec<Violation> {
        self.violations
    }

    /// Human-readable summary, used as synthesizer repair context.
    pub fn summary(&self) -> String {
        self.violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validate a clean table against the tidy invariants and the plan.
pub fn validate(
    table: &CleanTable,
    plan: &RemediationPlan,
    config: &RemediationConfig,
) -> ValidationReport {
    let mut violations = Vec::new();

    if table.is_empty() {
        violations.push(Violation::EmptyResult);
    }

    check_atomicity(table, config, &mut violations);
    check_header_echo(table, &mut violations);
    check_residual_aggregates(table, plan, &mut violations);
    check_measure_collapse(table, plan, &mut violations);
    check_identity_uniqueness(table, plan, &mut violations);

    ValidationReport { violations }
}

fn check_atomicity(table: &CleanTable, config: &RemediationConfig, out: &mut Vec<Violation>) {
    for (i, row) in table.rows().iter().enumerate() {
        for (col, cell) in row.iter().enumerate() {
            // A cell that is exactly a separator is odd data, not a composite.
            let interior = cell.trim();
            if let Some(sep) = config
                .atomic_separators
                .iter()
                .find(|sep| interior.len() > sep.len() && interior.contains(sep.as_str()))
            {
                out.push(Violation::Atomicity {
                    row: i,
                    column: table.columns()[col].clone(),
                    separator: sep.clone(),
                });
            }
        }
    }
}

fn check_header_echo(table: &CleanTable, out: &mut Vec<Violation>) {
    for (i, row) in table.rows().iter().enumerate() {
        let echoes = row
            .iter()
            .zip(table.columns())
            .all(|(cell, name)| cell.trim().eq_ignore_ascii_case(name.trim()));
        if echoes {
            out.push(Violation::MultipleHeaderRows { row: i });
        }
    }
}

fn check_residual_aggregates(table: &CleanTable, plan: &RemediationPlan, out: &mut Vec<Violation>) {
    for filter in &plan.row_filters {
        // A named column must exist; falling back to the leading column would
        // scan the wrong data and mask real residuals.
        let col = match filter.column.as_deref() {
            Some(name) => match table.column_index(name) {
                Some(idx) => idx,
                None => {
                    out.push(Violation::MissingFilterColumn {
                        column: name.to_string(),
                        pattern: filter.pattern.clone(),
                    });
                    continue;
                }
            },
            None => 0,
        };
        for (i, row) in table.rows().iter().enumerate() {
            if filter.matches(&row[col]) {
                out.push(Violation::ResidualAggregate {
                    row: i,
                    pattern: filter.pattern.clone(),
                });
            }
        }
    }
}

fn check_measure_collapse(table: &CleanTable, plan: &RemediationPlan, out: &mut Vec<Violation>) {
    if !plan.is_unpivot() {
        return;
    }
    for measure in &plan.measure_columns {
        if table.column_index(measure).is_some() {
            out.push(Violation::MeasureNotCollapsed {
                column: measure.clone(),
            });
        }
    }
    if table.column_index(&plan.variable_column).is_none()
        || table.column_index(&plan.value_column).is_none()
    {
        out.push(Violation::MissingUnpivotColumns {
            variable: plan.variable_column.clone(),
            value: plan.value_column.clone(),
        });
    }
}

/// Uniqueness over identity ∪ variable-label when unpivoted, identity alone
/// otherwise: after unpivoting, one identity combination legitimately maps to
/// one row per measure label.
fn check_identity_uniqueness(table: &CleanTable, plan: &RemediationPlan, out: &mut Vec<Violation>) {
    if plan.identity_columns.is_empty() {
        return;
    }

    let mut key_columns = Vec::new();
    for name in &plan.identity_columns {
        match table.column_index(name) {
            Some(idx) => key_columns.push(idx),
            None => {
                out.push(Violation::MissingIdentityColumn {
                    column: name.clone(),
                });
                return;
            }
        }
    }
    if plan.is_unpivot() {
        match table.column_index(&plan.variable_column) {
            Some(idx) => key_columns.push(idx),
            // Already reported as MissingUnpivotColumns.
            None => return,
        }
    }

    let mut seen = std::collections::HashSet::new();
    for (i, row) in table.rows().iter().enumerate() {
        let key: Vec<String> = key_columns
            .iter()
            .map(|&c| row[c].trim().to_string())
            .collect();
        if !seen.insert(key) {
            out.push(Violation::IdentityDuplicate { row: i });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::RowFilter;

    fn cells(row: &[&str]) -> Vec<String> {
        row.iter().map(|s| s.to_string()).collect()
    }

    fn unpivot_plan() -> RemediationPlan {
        RemediationPlan {
            header: vec![],
            injections: vec![],
            row_filters: vec![RowFilter::literal("Total")],
            identity_columns: vec!["Region".into()],
            measure_columns: vec!["2020".into(), "2021".into()],
            variable_column: "Year".into(),
            value_column: "Value".into(),
        }
    }

    fn tidy_table() -> CleanTable {
        CleanTable::new(
            vec!["Region".into(), "Year".into(), "Value".into()],
            vec![cells(&["East", "2020", "10"]), cells(&["East", "2021", "20"])],
        )
        .unwrap()
    }

    #[test]
    fn tidy_output_passes() {
        let report = validate(&tidy_table(), &unpivot_plan(), &RemediationConfig::default());
        assert!(report.passed(), "unexpected: {}", report.summary());
    }

    #[test]
    fn residual_aggregate_is_flagged() {
        let table = CleanTable::new(
            vec!["Region".into(), "Year".into(), "Value".into()],
            vec![cells(&["East", "2020", "10"]), cells(&["Total", "2020", "30"])],
        )
        .unwrap();
        let report = validate(&table, &unpivot_plan(), &RemediationConfig::default());
        assert!(report
            .violations()
            .iter()
            .any(|v| matches!(v, Violation::ResidualAggregate { row: 1, .. })));
    }

    #[test]
    fn filter_on_missing_column_is_flagged_not_retargeted() {
        let table = CleanTable::new(
            vec!["Region".into(), "Value".into()],
            vec![cells(&["Total shipments", "10"]), cells(&["East", "20"])],
        )
        .unwrap();
        let plan = RemediationPlan {
            header: vec![],
            injections: vec![],
            row_filters: vec![RowFilter {
                pattern: "total".into(),
                column: Some("Notes".into()),
                literal: false,
            }],
            identity_columns: vec!["Region".into()],
            measure_columns: vec![],
            variable_column: "variable".into(),
            value_column: "value".into(),
        };

        let report = validate(&table, &plan, &RemediationConfig::default());
        // The leading column must not be scanned in the named column's place.
        assert!(!report
            .violations()
            .iter()
            .any(|v| matches!(v, Violation::ResidualAggregate { .. })));
        assert!(report.violations().iter().any(|v| matches!(
            v,
            Violation::MissingFilterColumn { column, .. } if column == "Notes"
        )));
    }

    #[test]
    fn duplicate_identity_and_label_is_flagged() {
        let table = CleanTable::new(
            vec!["Region".into(), "Year".into(), "Value".into()],
            vec![cells(&["East", "2020", "10"]), cells(&["East", "2020", "11"])],
        )
        .unwrap();
        let report = validate(&table, &unpivot_plan(), &RemediationConfig::default());
        assert_eq!(
            report.violations(),
            &[Violation::IdentityDuplicate { row: 1 }]
        );
    }

    #[test]
    fn same_identity_different_label_is_allowed() {
        // One row per measure label is the whole point of unpivoting.
        let report = validate(&tidy_table(), &unpivot_plan(), &RemediationConfig::default());
        assert!(report.passed());
    }

    #[test]
    fn surviving_measure_column_is_flagged() {
        let table = CleanTable::new(
            vec!["Region".into(), "2020".into(), "2021".into()],
            vec![cells(&["East", "10", "20"])],
        )
        .unwrap();
        let report = validate(&table, &unpivot_plan(), &RemediationConfig::default());
        assert!(report
            .violations()
            .iter()
            .any(|v| matches!(v, Violation::MeasureNotCollapsed { .. })));
        assert!(report
            .violations()
            .iter()
            .any(|v| matches!(v, Violation::MissingUnpivotColumns { .. })));
    }

    #[test]
    fn composite_cell_is_flagged() {
        let table = CleanTable::new(
            vec!["Region".into(), "Year".into(), "Value".into()],
            vec![cells(&["East; West", "2020", "10"])],
        )
        .unwrap();
        let report = validate(&table, &unpivot_plan(), &RemediationConfig::default());
        assert!(matches!(
            report.violations()[0],
            Violation::Atomicity { row: 0, .. }
        ));
    }

    #[test]
    fn empty_output_is_a_violation() {
        let table = CleanTable::new(
            vec!["Region".into(), "Year".into(), "Value".into()],
            vec![],
        )
        .unwrap();
        let report = validate(&table, &unpivot_plan(), &RemediationConfig::default());
        assert!(report.violations().contains(&Violation::EmptyResult));
    }

    #[test]
    fn header_echo_row_is_flagged() {
        let table = CleanTable::new(
            vec!["Region".into(), "Year".into(), "Value".into()],
            vec![
                cells(&["East", "2020", "10"]),
                cells(&["Region", "Year", "Value"]),
            ],
        )
        .unwrap();
        let report = validate(&table, &unpivot_plan(), &RemediationConfig::default());
        assert!(report
            .violations()
            .iter()
            .any(|v| matches!(v, Violation::MultipleHeaderRows { row: 1 })));
    }
}
