//! Tidymill Engine
//!
//! Wires the deterministic core to the reasoning oracle: provider clients,
//! the three stage adapters, and the remediation controller that drives a
//! raw table to a terminal outcome. Everything non-deterministic enters the
//! pipeline through the [`providers::Oracle`] trait, so tests drive the full
//! state machine with scripted responses.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod controller;
pub mod providers;
pub mod stages;

pub use controller::{PipelineState, RemediationController};
pub use providers::{OpenAICompatibleClient, Oracle, ScriptedOracle};
pub use stages::StageRunner;
