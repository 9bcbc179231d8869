//! Attempt history and terminal outcomes
//!
//! The controller exclusively owns the [`AttemptRecord`] sequence for a table:
//! append-only, single-writer, never rewritten. Terminal outcomes always carry
//! the full history so a human can intervene on failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::{Diagnosis, RemediationPlan};
use crate::routine::TransformLog;
use crate::table::CleanTable;
use crate::validate::Violation;

/// Outcome of one synthesis attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttemptRecord {
    /// 1-based attempt index
    pub index: u32,
    /// Fingerprint of the synthesized routine, when synthesis got that far
    pub routine_fingerprint: Option<String>,
    /// The routine ran to completion in the sandbox
    pub executed: bool,
    /// The output passed validation
    pub validated: bool,
    /// Stable error kind tag when the attempt failed
    pub error_kind: Option<String>,
    /// Failure reason fed to the next attempt, if any
    pub failure: Option<String>,
    /// Violations found by the validator, when it ran and failed
    #[serde(default)]
    pub violations: Vec<Violation>,
    /// When the attempt concluded
    pub recorded_at: DateTime<Utc>,
}

impl AttemptRecord {
    /// Record for a winning attempt.
    pub fn success(index: u32, fingerprint: &str) -> Self {
        Self {
            index,
            routine_fingerprint: Some(fingerprint.to_string()),
            executed: true,
            validated: true,
            error_kind: None,
            failure: None,
            violations: Vec::new(),
            recorded_at: Utc::now(),
        }
    }
}

/// Success payload handed downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationSuccess {
    /// Identifier of the source table
    pub table_id: String,
    /// The tidy result
    pub clean_table: CleanTable,
    /// Audit trail of the winning routine
    pub transform_log: TransformLog,
    /// Full attempt history
    pub attempts: Vec<AttemptRecord>,
    /// Rows in the raw input
    pub rows_original: usize,
    /// Rows in the tidy output
    pub rows_cleaned: usize,
}

/// Terminal-failure payload: best-available diagnostic context, never a
/// partially-tidy table presented as valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationFailure {
    /// Identifier of the source table
    pub table_id: String,
    /// Stable kind tag of the terminal error
    pub error_kind: String,
    /// Terminal error message
    pub message: String,
    /// Full attempt history
    pub attempts: Vec<AttemptRecord>,
    /// Last diagnosis obtained, if any
    pub last_diagnosis: Option<Diagnosis>,
    /// Last plan obtained, if any
    pub last_plan: Option<RemediationPlan>,
}

/// Terminal outcome of the pipeline for one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RemediationOutcome {
    /// Validation passed; tidy table attached
    Succeeded(RemediationSuccess),
    /// Retry budgets exhausted or fatal input
    Failed(RemediationFailure),
}

impl RemediationOutcome {
    /// Attempt history, present on both sides.
    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            Self::Succeeded(s) => &s.attempts,
            Self::Failed(f) => &f.attempts,
        }
    }

    /// True for the success side.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serialises_with_status_tag() {
        let outcome = RemediationOutcome::Failed(RemediationFailure {
            table_id: "table1".into(),
            error_kind: "validation_violation".into(),
            message: "exhausted synthesis attempts".into(),
            attempts: vec![],
            last_diagnosis: None,
            last_plan: None,
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error_kind"], "validation_violation");
    }
}
