//! Pipeline configuration
//!
//! [`RemediationConfig`] carries every externally overridable knob: the
//! aggregate-keyword list, retry bounds, oracle timeout and sandbox ceilings.
//! [`OracleConfig`] holds the reasoning-endpoint credentials and sampling
//! parameters, loaded from `TIDYMILL_*` environment variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TidyError};

/// Default keyword set marking aggregate rows.
pub const DEFAULT_AGGREGATE_KEYWORDS: &[&str] =
    &["total", "grand total", "subtotal", "sum", "overall"];

/// Resource ceilings for one sandboxed routine execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Hard wall-clock timeout in milliseconds
    pub timeout_ms: u64,
    /// Memory ceiling in bytes, enforced as a derived cell budget
    pub memory_limit_bytes: u64,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            memory_limit_bytes: 64 * 1024 * 1024,
        }
    }
}

impl SandboxLimits {
    /// Wall-clock timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Cell budget derived from the byte ceiling. A working cell is costed at
    /// 64 bytes; the interpreter checks the budget after every operation.
    pub fn max_cells(&self) -> u64 {
        (self.memory_limit_bytes / 64).max(1)
    }
}

/// Every externally overridable pipeline setting, with the defaults the
/// controller state machine documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemediationConfig {
    /// Case-insensitive keywords marking aggregate rows
    pub aggregate_keywords: Vec<String>,
    /// Additional regex patterns for aggregate rows
    pub aggregate_patterns: Vec<String>,
    /// Separators whose presence inside a cell violates atomicity
    pub atomic_separators: Vec<String>,
    /// Retries per reasoning stage (diagnose/strategize) after the first failure
    pub oracle_retries: u32,
    /// Total synthesis attempts per table
    pub synthesis_attempts: u32,
    /// Timeout for a single oracle call, in seconds
    pub oracle_timeout_secs: u64,
    /// Sandbox resource ceilings
    pub sandbox: SandboxLimits,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            aggregate_keywords: DEFAULT_AGGREGATE_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            aggregate_patterns: Vec::new(),
            atomic_separators: vec![";".into(), "|".into()],
            oracle_retries: 2,
            synthesis_attempts: 3,
            oracle_timeout_secs: 60,
            sandbox: SandboxLimits::default(),
        }
    }
}

impl RemediationConfig {
    /// Configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML file; missing keys fall back to defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| TidyError::Config(format!("{}: {e}", path.display())))
    }

    /// Override the aggregate keyword list.
    pub fn with_aggregate_keywords(mut self, keywords: Vec<String>) -> Self {
        self.aggregate_keywords = keywords;
        self
    }

    /// Override the synthesis attempt bound.
    pub fn with_synthesis_attempts(mut self, attempts: u32) -> Self {
        self.synthesis_attempts = attempts;
        self
    }

    /// Override the per-stage oracle retry bound.
    pub fn with_oracle_retries(mut self, retries: u32) -> Self {
        self.oracle_retries = retries;
        self
    }

    /// Override the sandbox ceilings.
    pub fn with_sandbox_limits(mut self, limits: SandboxLimits) -> Self {
        self.sandbox = limits;
        self
    }

    /// Oracle call timeout as a [`Duration`].
    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }
}

/// Credentials and sampling parameters for the reasoning endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Bearer token for the OpenAI-compatible endpoint
    pub api_key: String,
    /// Endpoint base URL
    pub base_url: String,
    /// Model name
    pub model: String,
    /// Sampling temperature
    pub temperature: f64,
    /// Completion token cap
    pub max_tokens: u32,
}

impl OracleConfig {
    /// Load from the environment. `TIDYMILL_API_KEY` is required; the rest
    /// default to the values the original deployment shipped with.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("TIDYMILL_API_KEY").map_err(|_| {
            TidyError::Config(
                "TIDYMILL_API_KEY is not set; export it or add it to .env".into(),
            )
        })?;

        let temperature = match std::env::var("TIDYMILL_TEMPERATURE") {
            Ok(v) => v
                .parse()
                .map_err(|_| TidyError::Config(format!("invalid TIDYMILL_TEMPERATURE: {v}")))?,
            Err(_) => 0.2,
        };
        let max_tokens = match std::env::var("TIDYMILL_MAX_TOKENS") {
            Ok(v) => v
                .parse()
                .map_err(|_| TidyError::Config(format!("invalid TIDYMILL_MAX_TOKENS: {v}")))?,
            Err(_) => 4096,
        };

        Ok(Self {
            api_key,
            base_url: std::env::var("TIDYMILL_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta/openai".into()),
            model: std::env::var("TIDYMILL_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".into()),
            temperature,
            max_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_bounds() {
        let config = RemediationConfig::default();
        assert_eq!(config.oracle_retries, 2);
        assert_eq!(config.synthesis_attempts, 3);
        assert!(config.aggregate_keywords.contains(&"grand total".to_string()));
    }

    #[test]
    fn sandbox_cell_budget_derivation() {
        let limits = SandboxLimits {
            timeout_ms: 1_000,
            memory_limit_bytes: 6_400,
        };
        assert_eq!(limits.max_cells(), 100);
        assert_eq!(limits.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let parsed: RemediationConfig =
            toml::from_str("synthesis_attempts = 5\n[sandbox]\ntimeout_ms = 100\nmemory_limit_bytes = 1024\n")
                .unwrap();
        assert_eq!(parsed.synthesis_attempts, 5);
        assert_eq!(parsed.oracle_retries, 2);
        assert_eq!(parsed.sandbox.timeout_ms, 100);
    }
}
