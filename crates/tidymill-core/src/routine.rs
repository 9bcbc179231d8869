//! Synthesized transformation routines
//!
//! A routine is the untrusted artifact produced by the synthesize stage. It is
//! modelled as a capability-restricted program over a closed set of pure
//! data-transformation operations: the allow-list *is* the operation set, so
//! filesystem, network, process or reflection access is unrepresentable. A
//! routine naming anything outside the set is rejected with
//! [`TidyError::UnsafeRoutine`] before it ever executes.
//!
//! Routines are never mutated; each synthesis attempt produces a new one,
//! identified by a blake3 fingerprint of its operations.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TidyError};
use crate::oracle::Stage;

/// Upper bound on operations per routine.
pub const MAX_OPS: usize = 64;

/// Upper bound on filter pattern length.
pub const MAX_PATTERN_LEN: usize = 256;

/// Operation names a routine may use. Everything else is a capability the
/// sandbox does not grant.
pub const ALLOWED_OPS: &[&str] = &[
    "flatten_header",
    "drop_rows",
    "section_to_column",
    "filter_rows",
    "forward_fill",
    "inject_column",
    "split_column",
    "rename_column",
    "unpivot",
];

/// One pure data-transformation step.
///
/// Row indices always refer to the current working table, so a routine that
/// drops rows must account for the shift in later operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformOp {
    /// Replace the leading `header_rows` rows with a single header of `names`
    FlattenHeader {
        /// Rows consumed from the top of the working table
        header_rows: usize,
        /// Flat output column names, one per column
        names: Vec<String>,
    },
    /// Delete the listed rows
    DropRows {
        /// Row indices in the current working table
        rows: Vec<usize>,
    },
    /// Materialise the single cells of the listed label rows as a new column
    /// filled down over the rows beneath each, then delete the label rows
    SectionToColumn {
        /// New output column name
        name: String,
        /// Indices of the one-cell label rows
        rows: Vec<usize>,
    },
    /// Delete rows whose cell in `column` (leading column when absent)
    /// matches the pattern, case-insensitively over the trimmed cell
    FilterRows {
        /// Regex applied to the trimmed cell
        pattern: String,
        /// Column name; requires a flattened header when present
        #[serde(default, skip_serializing_if = "Option::is_none")]
        column: Option<String>,
    },
    /// Propagate the last non-blank value downward over blanks
    ForwardFill {
        /// Column name
        column: String,
    },
    /// Append a constant-valued column
    InjectColumn {
        /// New column name
        name: String,
        /// Value on every row
        value: String,
    },
    /// Split a composite column into parts on a separator
    SplitColumn {
        /// Source column name
        column: String,
        /// Separator text
        separator: String,
        /// Names of the replacement columns
        into: Vec<String>,
    },
    /// Rename one column
    RenameColumn {
        /// Existing name
        from: String,
        /// New name
        to: String,
    },
    /// Collapse measure columns into variable-label/value rows
    Unpivot {
        /// Columns kept as observation identity
        identity: Vec<String>,
        /// Columns collapsed into rows
        measures: Vec<String>,
        /// Name of the variable-label output column
        variable: String,
        /// Name of the value output column
        value: String,
    },
}

impl TransformOp {
    /// Wire name of the operation.
    pub fn name(&self) -> &'static str {
        match self {
            Self::FlattenHeader { .. } => "flatten_header",
            Self::DropRows { .. } => "drop_rows",
            Self::SectionToColumn { .. } => "section_to_column",
            Self::FilterRows { .. } => "filter_rows",
            Self::ForwardFill { .. } => "forward_fill",
            Self::InjectColumn { .. } => "inject_column",
            Self::SplitColumn { .. } => "split_column",
            Self::RenameColumn { .. } => "rename_column",
            Self::Unpivot { .. } => "unpivot",
        }
    }
}

/// A vetted, versioned transformation program.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransformRoutine {
    ops: Vec<TransformOp>,
    fingerprint: String,
}

impl TransformRoutine {
    /// Build a routine from typed operations and run the static checks.
    pub fn new(ops: Vec<TransformOp>) -> Result<Self> {
        let routine = Self {
            fingerprint: fingerprint(&ops),
            ops,
        };
        routine.check()?;
        Ok(routine)
    }

    /// Decode a routine from the synthesizer's raw JSON output.
    ///
    /// The payload must be `{"ops": [{"op": <name>, ...}, ...]}`. Operation
    /// names are vetted against [`ALLOWED_OPS`] *before* typed decoding, so a
    /// routine asking for a capability outside the set fails with
    /// [`TidyError::UnsafeRoutine`] rather than a parse error.
    pub fn from_value(value: &Value) -> Result<Self> {
        let ops_value = value
            .get("ops")
            .and_then(Value::as_array)
            .ok_or_else(|| oracle_shape("routine payload has no 'ops' array"))?;

        let mut ops = Vec::with_capacity(ops_value.len());
        for (i, op_value) in ops_value.iter().enumerate() {
            let name = op_value
                .get("op")
                .and_then(Value::as_str)
                .ok_or_else(|| oracle_shape(&format!("op {i} has no 'op' name")))?;
            if !ALLOWED_OPS.contains(&name) {
                return Err(TidyError::UnsafeRoutine(format!(
                    "op {i} requests disallowed capability '{name}'"
                )));
            }
            let op: TransformOp = serde_json::from_value(op_value.clone())
                .map_err(|e| oracle_shape(&format!("op {i} ('{name}') is malformed: {e}")))?;
            ops.push(op);
        }

        Self::new(ops)
    }

    /// Static well-formedness bounds, applied before execution.
    pub fn check(&self) -> Result<()> {
        if self.ops.is_empty() {
            return Err(TidyError::UnsafeRoutine("routine has no operations".into()));
        }
        if self.ops.len() > MAX_OPS {
            return Err(TidyError::UnsafeRoutine(format!(
                "routine has {} operations, limit is {MAX_OPS}",
                self.ops.len()
            )));
        }

        for op in &self.ops {
            match op {
                TransformOp::FlattenHeader { names, .. } => {
                    if names.is_empty() || names.iter().any(|n| n.trim().is_empty()) {
                        return Err(unsafe_op(op, "empty column name"));
                    }
                }
                TransformOp::FilterRows { pattern, .. } => {
                    if pattern.len() > MAX_PATTERN_LEN {
                        return Err(unsafe_op(op, "pattern exceeds length bound"));
                    }
                    Regex::new(&format!("(?i){pattern}"))
                        .map_err(|e| unsafe_op(op, &format!("pattern does not compile: {e}")))?;
                }
                TransformOp::ForwardFill { column } => {
                    if column.trim().is_empty() {
                        return Err(unsafe_op(op, "empty column name"));
                    }
                }
                TransformOp::InjectColumn { name, .. }
                | TransformOp::SectionToColumn { name, .. } => {
                    if name.trim().is_empty() {
                        return Err(unsafe_op(op, "empty column name"));
                    }
                }
                TransformOp::SplitColumn {
                    column,
                    separator,
                    into,
                } => {
                    if column.trim().is_empty() || separator.is_empty() || into.is_empty() {
                        return Err(unsafe_op(op, "missing column, separator or targets"));
                    }
                }
                TransformOp::RenameColumn { from, to } => {
                    if from.trim().is_empty() || to.trim().is_empty() {
                        return Err(unsafe_op(op, "empty column name"));
                    }
                }
                TransformOp::Unpivot {
                    measures,
                    variable,
                    value,
                    ..
                } => {
                    if measures.is_empty() {
                        return Err(unsafe_op(op, "no measure columns"));
                    }
                    if variable.trim().is_empty() || value.trim().is_empty() {
                        return Err(unsafe_op(op, "empty output column name"));
                    }
                }
                TransformOp::DropRows { .. } => {}
            }
        }
        Ok(())
    }

    /// Operations, in execution order.
    pub fn ops(&self) -> &[TransformOp] {
        &self.ops
    }

    /// Blake3 fingerprint identifying this routine version.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

fn fingerprint(ops: &[TransformOp]) -> String {
    let encoded = serde_json::to_vec(ops).unwrap_or_default();
    blake3::hash(&encoded).to_hex().to_string()
}

fn oracle_shape(message: &str) -> TidyError {
    TidyError::OracleResponse {
        stage: Stage::Synthesize,
        message: message.to_string(),
    }
}

fn unsafe_op(op: &TransformOp, reason: &str) -> TidyError {
    TidyError::UnsafeRoutine(format!("op '{}': {reason}", op.name()))
}

/// One audit-trail entry. Not used for control flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    /// Operation wire name
    pub operation: String,
    /// Rows added or removed or rewritten by the operation
    pub rows_affected: usize,
    /// Columns added, removed or rewritten by the operation
    pub columns_affected: usize,
}

/// Ordered audit trail of one routine execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransformLog {
    entries: Vec<LogEntry>,
}

impl TransformLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry.
    pub fn push(&mut self, operation: &str, rows_affected: usize, columns_affected: usize) {
        self.entries.push(LogEntry {
            operation: operation.to_string(),
            rows_affected,
            columns_affected,
        });
    }

    /// Entries in execution order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_a_well_formed_routine() {
        let payload = json!({
            "ops": [
                {"op": "drop_rows", "rows": [0]},
                {"op": "flatten_header", "header_rows": 1, "names": ["Region", "2020", "2021"]},
                {"op": "filter_rows", "pattern": "^total$"},
                {"op": "unpivot", "identity": ["Region"], "measures": ["2020", "2021"],
                 "variable": "Year", "value": "Value"},
            ]
        });
        let routine = TransformRoutine::from_value(&payload).unwrap();
        assert_eq!(routine.ops().len(), 4);
        assert_eq!(routine.ops()[0].name(), "drop_rows");
        assert_eq!(routine.fingerprint().len(), 64);
    }

    #[test]
    fn disallowed_capability_is_unsafe_not_a_parse_error() {
        let payload = json!({"ops": [{"op": "read_file", "path": "/etc/passwd"}]});
        let err = TransformRoutine::from_value(&payload).unwrap_err();
        assert!(matches!(err, TidyError::UnsafeRoutine(_)));
        assert!(err.to_string().contains("read_file"));
    }

    #[test]
    fn malformed_known_op_is_an_oracle_error() {
        let payload = json!({"ops": [{"op": "forward_fill"}]});
        let err = TransformRoutine::from_value(&payload).unwrap_err();
        assert!(matches!(err, TidyError::OracleResponse { .. }));
    }

    #[test]
    fn bad_regex_is_rejected_statically() {
        let err = TransformRoutine::new(vec![TransformOp::FilterRows {
            pattern: "([".into(),
            column: None,
        }])
        .unwrap_err();
        assert!(matches!(err, TidyError::UnsafeRoutine(_)));
    }

    #[test]
    fn empty_routine_is_rejected() {
        let err = TransformRoutine::from_value(&json!({"ops": []})).unwrap_err();
        assert!(matches!(err, TidyError::UnsafeRoutine(_)));
    }

    #[test]
    fn identical_ops_share_a_fingerprint() {
        let ops = vec![TransformOp::InjectColumn {
            name: "Year".into(),
            value: "2020".into(),
        }];
        let a = TransformRoutine::new(ops.clone()).unwrap();
        let b = TransformRoutine::new(ops).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }
}
