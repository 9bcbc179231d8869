//! Tidymill Core - profiling, plans, routines and tidy validation
//!
//! This crate holds everything the remediation pipeline computes locally:
//! the table model, the structural profiler, the diagnosis/plan types shared
//! with the reasoning oracle, the capability-restricted transformation DSL,
//! the tidy-invariant validator, configuration and the error taxonomy.
//!
//! # Architecture
//!
//! The pipeline over these pieces is a state machine owned by the engine
//! crate:
//!
//! 1. **Profiler** (`profile`): deterministic structural summary of the raw table
//! 2. **Plan types** (`plan`): advisory diagnosis, authoritative remediation plan
//! 3. **Routine DSL** (`routine`): vetted, fingerprinted transformation programs
//! 4. **Validator** (`validate`): tidy-invariant checks with violation locators
//!
//! Everything here is a pure function over its inputs; only the controller
//! (in `tidymill-engine`) holds state, and only the sandbox (in
//! `tidymill-sandbox`) runs untrusted routines.
//!
//! # Design principles
//!
//! 1. **The plan is authoritative**: the validator checks the plan's
//!    expectations, never the oracle's advisory diagnosis
//! 2. **Immutability by default**: raw tables and routines are never mutated,
//!    only superseded
//! 3. **Closed capability set**: routines can only name pure
//!    data-transformation operations

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod config;
pub mod error;
pub mod oracle;
pub mod plan;
pub mod profile;
pub mod report;
pub mod routine;
pub mod table;
pub mod validate;

// Re-export commonly used types for convenience
pub use config::{OracleConfig, RemediationConfig, SandboxLimits};
pub use error::{Result, TidyError};
pub use oracle::{OracleRequest, Stage};
pub use plan::{Diagnosis, RemediationPlan, RowFilter};
pub use profile::{profile, ColumnProfile, ColumnType, TableProfile};
pub use report::{AttemptRecord, RemediationFailure, RemediationOutcome, RemediationSuccess};
pub use routine::{TransformLog, TransformOp, TransformRoutine};
pub use table::{CleanTable, RawTable};
pub use validate::{validate, ValidationReport, Violation};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
