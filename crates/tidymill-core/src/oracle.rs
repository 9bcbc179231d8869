//! Shared oracle request schema
//!
//! All three reasoning calls use one request shape, serialised as the user
//! payload of the completion request. The stage-specific output schemas live
//! with their parsed types in [`crate::plan`] and [`crate::routine`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::profile::TableProfile;

/// Reasoning stage being invoked.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Classify structural defects from the profile
    Diagnose,
    /// Turn a diagnosis into a concrete remediation plan
    Strategize,
    /// Compile the approved plan into an executable routine
    Synthesize,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Diagnose => write!(f, "diagnose"),
            Self::Strategize => write!(f, "strategize"),
            Self::Synthesize => write!(f, "synthesize"),
        }
    }
}

/// Uniform request payload for the three reasoning calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleRequest {
    /// Which reasoning step this payload drives
    pub stage: Stage,
    /// Structural profile of the raw table, read-only for all stages
    pub profile: TableProfile,
    /// Output of the previous reasoning stage, when one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior_output: Option<Value>,
    /// Failure reason from the previous attempt, for feedback-guided repair
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_context: Option<String>,
}

impl OracleRequest {
    /// Request with no prior stage output (the diagnose stage).
    pub fn new(stage: Stage, profile: TableProfile) -> Self {
        Self {
            stage,
            profile,
            prior_output: None,
            failure_context: None,
        }
    }

    /// Attach the previous stage's parsed output.
    pub fn with_prior_output(mut self, prior: Value) -> Self {
        self.prior_output = Some(prior);
        self
    }

    /// Attach repair feedback from a failed attempt.
    pub fn with_failure_context(mut self, context: impl Into<String>) -> Self {
        self.failure_context = Some(context.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_serialises_lowercase() {
        assert_eq!(serde_json::to_string(&Stage::Diagnose).unwrap(), "\"diagnose\"");
        assert_eq!(Stage::Synthesize.to_string(), "synthesize");
    }
}
