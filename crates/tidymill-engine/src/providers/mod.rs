//! Reasoning-oracle providers
//!
//! The pipeline talks to the oracle through the [`Oracle`] trait: one
//! completion call, no retries, no state. The HTTP provider lives in
//! [`openai_compatible`]; [`ScriptedOracle`] replays canned responses for
//! tests and dry runs.

pub mod openai_compatible;

pub use openai_compatible::OpenAICompatibleClient;

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;

/// A blocking external reasoning dependency. Implementations perform exactly
/// one completion per call; timeout and retry policy belong to the caller.
#[async_trait::async_trait]
pub trait Oracle: Send + Sync + std::fmt::Debug {
    /// Provider name, for logs and attempt records.
    fn name(&self) -> &str;

    /// One completion over a system and user prompt, returning the raw text.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// Replays a fixed sequence of responses. Each call pops the front; calling
/// past the end fails like a dead endpoint would.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedOracle {
    /// Oracle that will answer with `responses`, in order.
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }

    /// Queue one more response.
    pub fn push(&self, response: impl Into<String>) {
        self.responses
            .lock()
            .expect("scripted oracle poisoned")
            .push_back(response.into());
    }

    /// Responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.responses.lock().expect("scripted oracle poisoned").len()
    }
}

#[async_trait::async_trait]
impl Oracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
        self.responses
            .lock()
            .expect("scripted oracle poisoned")
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("scripted oracle has no responses left"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_oracle_replays_in_order() {
        let oracle = ScriptedOracle::new(vec!["one".into(), "two".into()]);
        assert_eq!(oracle.complete("s", "u").await.unwrap(), "one");
        assert_eq!(oracle.complete("s", "u").await.unwrap(), "two");
        assert!(oracle.complete("s", "u").await.is_err());
    }
}
