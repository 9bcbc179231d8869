//! Error types for Tidymill Core
//!
//! This module defines the error taxonomy used throughout the remediation
//! pipeline. We use `thiserror` for ergonomic error definitions with automatic
//! Display/Error implementations.
//!
//! Every variant maps to exactly one controller behaviour: fatal, stage-level
//! retry, or synthesis-level retry. The controller converts each failure into
//! a state transition; nothing escapes as an unhandled fault.

use thiserror::Error;

use crate::oracle::Stage;
use crate::validate::Violation;

/// Result type alias for Tidymill operations
pub type Result<T> = std::result::Result<T, TidyError>;

/// Main error type for the remediation pipeline
#[derive(Error, Debug)]
pub enum TidyError {
    /// Raw table is empty or structurally unusable. Fatal, never retried.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Oracle response did not parse into the expected stage schema, or the
    /// call timed out. Retried at stage level by the controller.
    #[error("oracle failure in {stage} stage: {message}")]
    OracleResponse {
        /// Reasoning stage that produced the unusable response
        stage: Stage,
        /// What went wrong (parse error, missing field, timeout)
        message: String,
    },

    /// Synthesized routine uses an operation outside the allow-list or breaks
    /// a static bound. Rejected before execution; counts against the
    /// synthesis retry budget.
    #[error("unsafe routine rejected: {0}")]
    UnsafeRoutine(String),

    /// Routine failed at runtime inside the sandbox. Carries the original
    /// message; counts against the synthesis retry budget.
    #[error("routine execution failed in '{operation}': {message}")]
    RoutineExecution {
        /// Name of the operation that faulted
        operation: String,
        /// Original failure message from the interpreter
        message: String,
    },

    /// Sandbox wall-clock timeout or memory ceiling exceeded. Partial output
    /// is discarded; counts against the synthesis retry budget.
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),

    /// Executed output violated one or more tidy invariants. The violations
    /// are fed back to the synthesizer as repair context.
    #[error("validation failed with {} violation(s)", .0.len())]
    Validation(Vec<Violation>),

    /// Configuration file or environment could not be loaded
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TidyError {
    /// Stable machine-readable kind tag, used in attempt records and in the
    /// downstream failure payload.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "malformed_input",
            Self::OracleResponse { .. } => "oracle_response",
            Self::UnsafeRoutine(_) => "unsafe_routine",
            Self::RoutineExecution { .. } => "routine_execution",
            Self::ResourceLimit(_) => "resource_limit",
            Self::Validation(_) => "validation_violation",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
        }
    }

    /// True when the failure consumes one synthesis attempt rather than
    /// aborting the pipeline or retrying a reasoning stage.
    pub fn counts_against_synthesis(&self) -> bool {
        matches!(
            self,
            Self::UnsafeRoutine(_)
                | Self::RoutineExecution { .. }
                | Self::ResourceLimit(_)
                | Self::Validation(_)
        ) || matches!(
            self,
            Self::OracleResponse {
                stage: Stage::Synthesize,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_stable() {
        let err = TidyError::MalformedInput("empty table".into());
        assert_eq!(err.kind(), "malformed_input");

        let err = TidyError::ResourceLimit("wall clock".into());
        assert_eq!(err.kind(), "resource_limit");
    }

    #[test]
    fn synthesis_budget_classification() {
        assert!(TidyError::UnsafeRoutine("fs access".into()).counts_against_synthesis());
        assert!(TidyError::Validation(vec![]).counts_against_synthesis());
        assert!(TidyError::OracleResponse {
            stage: Stage::Synthesize,
            message: "non-JSON payload".into(),
        }
        .counts_against_synthesis());

        assert!(!TidyError::MalformedInput("empty".into()).counts_against_synthesis());
        assert!(!TidyError::OracleResponse {
            stage: Stage::Diagnose,
            message: "timeout".into(),
        }
        .counts_against_synthesis());
    }
}
