//! Stage adapters for the three reasoning calls
//!
//! Each adapter is stateless: build the uniform request payload, invoke the
//! oracle under a timeout, parse the response into the stage's structured
//! type. A response that does not parse, or a timed-out call, is an
//! [`TidyError::OracleResponse`] failure. Retry policy belongs exclusively
//! to the controller.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use tidymill_core::{
    Diagnosis, OracleRequest, RemediationPlan, Result, Stage, TableProfile, TidyError,
    TransformRoutine,
};

use crate::providers::Oracle;

const DIAGNOSE_SYSTEM_PROMPT: &str = "\
You are a data-structure analyst. You receive the structural profile of one \
messy extracted table and classify its defects. Respond with ONLY a JSON \
object, no prose, of the shape: {\"hierarchical_header\": bool, \
\"header_row_span\": int, \"section_header_rows\": [int], \
\"aggregate_rows\": [int], \"wide_value_columns\": [string]}. \
wide_value_columns lists columns whose header text is itself a data value, \
such as a year.";

const STRATEGIZE_SYSTEM_PROMPT: &str = "\
You are a data-remediation strategist. You receive a table profile and a \
defect diagnosis and produce the authoritative remediation plan. Respond \
with ONLY a JSON object of the shape: {\"header\": [{\"cells\": [{\"row\": \
int, \"column\": int}], \"output_name\": string}], \"injections\": \
[{\"column_name\": string, \"source\": {\"kind\": \"cell\"|\"section_rows\"|\
\"column\", ...}, \"fill\": \"constant\"|\"forward_fill\"}], \"row_filters\": \
[{\"pattern\": string, \"literal\": bool}], \"identity_columns\": [string], \
\"measure_columns\": [string], \"variable_column\": string, \
\"value_column\": string}. Identity columns identify an observation; measure \
columns are collapsed into variable/value rows; row filters delete aggregate \
rows such as totals.";

const SYNTHESIZE_SYSTEM_PROMPT: &str = "\
You compile a remediation plan into an executable routine. Respond with ONLY \
a JSON object {\"ops\": [...]} where each op is one of: \
{\"op\": \"flatten_header\", \"header_rows\": int, \"names\": [string]}, \
{\"op\": \"drop_rows\", \"rows\": [int]}, \
{\"op\": \"section_to_column\", \"name\": string, \"rows\": [int]}, \
{\"op\": \"filter_rows\", \"pattern\": string, \"column\"?: string}, \
{\"op\": \"forward_fill\", \"column\": string}, \
{\"op\": \"inject_column\", \"name\": string, \"value\": string}, \
{\"op\": \"split_column\", \"column\": string, \"separator\": string, \
\"into\": [string]}, \
{\"op\": \"rename_column\", \"from\": string, \"to\": string}, \
{\"op\": \"unpivot\", \"identity\": [string], \"measures\": [string], \
\"variable\": string, \"value\": string}. \
Row indices refer to the current working table after earlier ops. No other \
operation exists. If failure_context is present, the previous routine failed \
for that reason; produce a corrected routine.";

/// Runs one reasoning stage at a time against a borrowed oracle.
pub struct StageRunner<'a> {
    oracle: &'a dyn Oracle,
    timeout: Duration,
}

impl<'a> StageRunner<'a> {
    /// Runner with the configured per-call timeout.
    pub fn new(oracle: &'a dyn Oracle, timeout: Duration) -> Self {
        Self { oracle, timeout }
    }

    /// Classify structural defects from the profile. Advisory output.
    pub async fn diagnose(&self, profile: &TableProfile) -> Result<Diagnosis> {
        let request = OracleRequest::new(Stage::Diagnose, profile.clone());
        let text = self.call(Stage::Diagnose, DIAGNOSE_SYSTEM_PROMPT, &request).await?;
        parse_stage_output(Stage::Diagnose, &text)
    }

    /// Turn a diagnosis into the authoritative remediation plan.
    pub async fn strategize(
        &self,
        profile: &TableProfile,
        diagnosis: &Diagnosis,
    ) -> Result<RemediationPlan> {
        let request = OracleRequest::new(Stage::Strategize, profile.clone())
            .with_prior_output(serde_json::to_value(diagnosis)?);
        let text = self
            .call(Stage::Strategize, STRATEGIZE_SYSTEM_PROMPT, &request)
            .await?;
        parse_stage_output(Stage::Strategize, &text)
    }

    /// Compile the plan into a vetted routine. `failure_context` carries the
    /// previous attempt's failure reason for feedback-guided regeneration.
    pub async fn synthesize(
        &self,
        profile: &TableProfile,
        plan: &RemediationPlan,
        failure_context: Option<&str>,
    ) -> Result<TransformRoutine> {
        let mut request = OracleRequest::new(Stage::Synthesize, profile.clone())
            .with_prior_output(serde_json::to_value(plan)?);
        if let Some(context) = failure_context {
            request = request.with_failure_context(context);
        }
        let text = self
            .call(Stage::Synthesize, SYNTHESIZE_SYSTEM_PROMPT, &request)
            .await?;

        let value: Value = serde_json::from_str(strip_code_fences(&text)).map_err(|e| {
            TidyError::OracleResponse {
                stage: Stage::Synthesize,
                message: format!("non-JSON payload: {e}"),
            }
        })?;
        TransformRoutine::from_value(&value)
    }

    async fn call(
        &self,
        stage: Stage,
        system_prompt: &str,
        request: &OracleRequest,
    ) -> Result<String> {
        let user_prompt = serde_json::to_string_pretty(request)?;
        let started = std::time::Instant::now();

        let outcome = tokio::time::timeout(
            self.timeout,
            self.oracle.complete(system_prompt, &user_prompt),
        )
        .await;

        match outcome {
            Err(_) => Err(TidyError::OracleResponse {
                stage,
                message: format!("timed out after {}s", self.timeout.as_secs()),
            }),
            Ok(Err(e)) => Err(TidyError::OracleResponse {
                stage,
                message: e.to_string(),
            }),
            Ok(Ok(text)) => {
                tracing::debug!(
                    %stage,
                    oracle = self.oracle.name(),
                    latency_ms = started.elapsed().as_millis() as u64,
                    "oracle call completed"
                );
                Ok(text)
            }
        }
    }
}

/// Strip markdown code fences the oracle tends to wrap JSON in.
pub fn strip_code_fences(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```") {
        // Drop the info string ("json") up to the first newline.
        s = match rest.find('\n') {
            Some(i) => &rest[i + 1..],
            None => rest,
        };
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

fn parse_stage_output<T: DeserializeOwned>(stage: Stage, text: &str) -> Result<T> {
    serde_json::from_str(strip_code_fences(text)).map_err(|e| TidyError::OracleResponse {
        stage,
        message: format!("response does not match the {stage} schema: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ScriptedOracle;
    use tidymill_core::{profile, RawTable, RemediationConfig};

    fn sample_profile() -> TableProfile {
        let table = RawTable::new(vec![
            vec!["Region".into(), "Value".into()],
            vec!["East".into(), "10".into()],
        ])
        .unwrap();
        profile(&table, &RemediationConfig::default()).unwrap()
    }

    #[test]
    fn fence_stripping() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[tokio::test]
    async fn diagnose_parses_fenced_json() {
        let oracle = ScriptedOracle::new(vec![
            "```json\n{\"hierarchical_header\": false, \"header_row_span\": 1}\n```".into(),
        ]);
        let runner = StageRunner::new(&oracle, Duration::from_secs(5));
        let diagnosis = runner.diagnose(&sample_profile()).await.unwrap();
        assert!(!diagnosis.hierarchical_header);
        assert_eq!(diagnosis.header_row_span, 1);
    }

    #[tokio::test]
    async fn garbage_response_is_an_oracle_error() {
        let oracle = ScriptedOracle::new(vec!["the table looks messy".into()]);
        let runner = StageRunner::new(&oracle, Duration::from_secs(5));
        let err = runner.diagnose(&sample_profile()).await.unwrap_err();
        assert!(matches!(
            err,
            TidyError::OracleResponse {
                stage: Stage::Diagnose,
                ..
            }
        ));
    }

    #[derive(Debug)]
    struct StalledOracle;

    #[async_trait::async_trait]
    impl Oracle for StalledOracle {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn complete(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn timeout_is_an_oracle_error() {
        let oracle = StalledOracle;
        let runner = StageRunner::new(&oracle, Duration::from_millis(10));
        let err = runner.diagnose(&sample_profile()).await.unwrap_err();
        assert!(matches!(err, TidyError::OracleResponse { .. }));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn synthesize_rejects_disallowed_ops() {
        let oracle = ScriptedOracle::new(vec![
            "{\"ops\": [{\"op\": \"spawn_process\", \"cmd\": \"rm\"}]}".into(),
        ]);
        let runner = StageRunner::new(&oracle, Duration::from_secs(5));
        let plan = RemediationPlan {
            header: vec![],
            injections: vec![],
            row_filters: vec![],
            identity_columns: vec!["Region".into()],
            measure_columns: vec![],
            variable_column: "variable".into(),
            value_column: "value".into(),
        };
        let err = runner
            .synthesize(&sample_profile(), &plan, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TidyError::UnsafeRoutine(_)));
    }
}
