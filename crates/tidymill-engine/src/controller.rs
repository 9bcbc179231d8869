//! Remediation controller
//!
//! Owns the per-table state machine: profile once, diagnose and strategize
//! with a bounded stage-retry budget, then loop synthesize/execute/validate
//! under the synthesis-attempt budget, feeding each failure back into the
//! next synthesis request. Every path ends in a terminal
//! [`RemediationOutcome`] carrying the full attempt history.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use tidymill_core::{
    profile, validate, AttemptRecord, Diagnosis, RawTable, RemediationConfig, RemediationFailure,
    RemediationOutcome, RemediationPlan, RemediationSuccess, Result, Stage, TableProfile,
    TidyError,
};
use tidymill_sandbox::Sandbox;

use crate::providers::Oracle;
use crate::stages::StageRunner;

/// Position in the remediation state machine. Profiling is never revisited;
/// Validating is never skipped on the way to Succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Deterministic structural profiling
    Profiling,
    /// Defect classification
    Diagnosing,
    /// Plan production
    Strategizing,
    /// Routine compilation
    Synthesizing,
    /// Sandboxed routine execution
    Executing,
    /// Tidy-shape validation
    Validating,
    /// An attempt failed with budget remaining; feedback queued
    Retrying,
    /// Terminal success
    Succeeded,
    /// Terminal failure
    Failed,
}

/// Drives one table through the full pipeline.
#[derive(Debug)]
pub struct RemediationController {
    oracle: Arc<dyn Oracle>,
    config: RemediationConfig,
}

impl RemediationController {
    /// Controller over a shared oracle with the given budgets and limits.
    pub fn new(oracle: Arc<dyn Oracle>, config: RemediationConfig) -> Self {
        Self { oracle, config }
    }

    /// The active configuration.
    pub fn config(&self) -> &RemediationConfig {
        &self.config
    }

    /// Remediate one raw table to a terminal outcome. Never panics on oracle
    /// or routine misbehavior; every failure is folded into the outcome.
    pub async fn run(&self, table_id: &str, table: &RawTable) -> RemediationOutcome {
        let run_id = Uuid::new_v4();
        tracing::info!(%table_id, %run_id, rows = table.height(), "remediation started");

        let mut state = PipelineState::Profiling;
        let mut attempts: Vec<AttemptRecord> = Vec::new();

        let table_profile = match profile(table, &self.config) {
            Ok(p) => p,
            Err(e) => {
                return self.fail(table_id, &mut state, e, attempts, None, None);
            }
        };
        tracing::debug!(
            %table_id,
            header_rows = table_profile.header_rows,
            sections = table_profile.section_header_rows.len(),
            aggregates = table_profile.aggregate_rows.len(),
            "profile complete"
        );

        let runner = StageRunner::new(self.oracle.as_ref(), self.config.oracle_timeout());

        transition(&mut state, PipelineState::Diagnosing);
        let diagnosis = match self.diagnose_with_retry(&runner, &table_profile).await {
            Ok(d) => d,
            Err(e) => return self.fail(table_id, &mut state, e, attempts, None, None),
        };

        transition(&mut state, PipelineState::Strategizing);
        let plan = match self
            .strategize_with_retry(&runner, &table_profile, &diagnosis)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                return self.fail(table_id, &mut state, e, attempts, Some(diagnosis), None);
            }
        };

        let sandbox = Sandbox::new(self.config.sandbox.clone());
        let mut failure_context: Option<String> = None;
        let mut last_error: Option<TidyError> = None;

        for attempt in 1..=self.config.synthesis_attempts {
            transition(&mut state, PipelineState::Synthesizing);
            let routine = match runner
                .synthesize(&table_profile, &plan, failure_context.as_deref())
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    if !e.counts_against_synthesis() {
                        return self.fail(
                            table_id,
                            &mut state,
                            e,
                            attempts,
                            Some(diagnosis.clone()),
                            Some(plan.clone()),
                        );
                    }
                    tracing::warn!(%table_id, attempt, error = %e, "synthesis failed");
                    attempts.push(failed_attempt(attempt, None, false, &e));
                    failure_context = Some(e.to_string());
                    last_error = Some(e);
                    if attempt < self.config.synthesis_attempts {
                        transition(&mut state, PipelineState::Retrying);
                    }
                    continue;
                }
            };

            transition(&mut state, PipelineState::Executing);
            let fingerprint = routine.fingerprint().to_string();
            let (clean_table, transform_log) = match sandbox.execute(&routine, table).await {
                Ok(output) => output,
                Err(e) => {
                    if !e.counts_against_synthesis() {
                        return self.fail(
                            table_id,
                            &mut state,
                            e,
                            attempts,
                            Some(diagnosis.clone()),
                            Some(plan.clone()),
                        );
                    }
                    tracing::warn!(%table_id, attempt, error = %e, "routine execution failed");
                    attempts.push(failed_attempt(attempt, Some(&fingerprint), false, &e));
                    failure_context = Some(e.to_string());
                    last_error = Some(e);
                    if attempt < self.config.synthesis_attempts {
                        transition(&mut state, PipelineState::Retrying);
                    }
                    continue;
                }
            };

            transition(&mut state, PipelineState::Validating);
            let report = validate(&clean_table, &plan, &self.config);
            if report.passed() {
                transition(&mut state, PipelineState::Succeeded);
                attempts.push(AttemptRecord::success(attempt, &fingerprint));
                tracing::info!(
                    %table_id,
                    attempt,
                    rows_cleaned = clean_table.height(),
                    "remediation succeeded"
                );
                return RemediationOutcome::Succeeded(RemediationSuccess {
                    table_id: table_id.to_string(),
                    rows_original: table.height(),
                    rows_cleaned: clean_table.height(),
                    clean_table,
                    transform_log,
                    attempts,
                });
            }

            let summary = report.summary();
            tracing::warn!(%table_id, attempt, violations = %summary, "validation failed");
            let error = TidyError::Validation(report.into_violations());
            let mut record = failed_attempt(attempt, Some(&fingerprint), true, &error);
            record.failure = Some(summary.clone());
            attempts.push(record);
            failure_context = Some(format!("output failed validation: {summary}"));
            last_error = Some(error);
            if attempt < self.config.synthesis_attempts {
                transition(&mut state, PipelineState::Retrying);
            }
        }

        let terminal = last_error.unwrap_or_else(|| TidyError::OracleResponse {
            stage: Stage::Synthesize,
            message: "no synthesis attempt was made".to_string(),
        });
        self.fail(
            table_id,
            &mut state,
            terminal,
            attempts,
            Some(diagnosis),
            Some(plan),
        )
    }

    async fn diagnose_with_retry(
        &self,
        runner: &StageRunner<'_>,
        table_profile: &TableProfile,
    ) -> Result<Diagnosis> {
        let budget = 1 + self.config.oracle_retries;
        let mut last = None;
        for call in 1..=budget {
            match runner.diagnose(table_profile).await {
                Ok(d) => return Ok(d),
                Err(e @ TidyError::OracleResponse { .. }) => {
                    tracing::warn!(call, budget, error = %e, "diagnosis call failed");
                    last = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or_else(|| TidyError::OracleResponse {
            stage: Stage::Diagnose,
            message: "stage retry budget is zero".to_string(),
        }))
    }

    async fn strategize_with_retry(
        &self,
        runner: &StageRunner<'_>,
        table_profile: &TableProfile,
        diagnosis: &Diagnosis,
    ) -> Result<RemediationPlan> {
        let budget = 1 + self.config.oracle_retries;
        let mut last = None;
        for call in 1..=budget {
            match runner.strategize(table_profile, diagnosis).await {
                Ok(p) => return Ok(p),
                Err(e @ TidyError::OracleResponse { .. }) => {
                    tracing::warn!(call, budget, error = %e, "strategy call failed");
                    last = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or_else(|| TidyError::OracleResponse {
            stage: Stage::Strategize,
            message: "stage retry budget is zero".to_string(),
        }))
    }

    fn fail(
        &self,
        table_id: &str,
        state: &mut PipelineState,
        error: TidyError,
        attempts: Vec<AttemptRecord>,
        last_diagnosis: Option<Diagnosis>,
        last_plan: Option<RemediationPlan>,
    ) -> RemediationOutcome {
        transition(state, PipelineState::Failed);
        tracing::error!(%table_id, error = %error, kind = error.kind(), "remediation failed");
        RemediationOutcome::Failed(RemediationFailure {
            table_id: table_id.to_string(),
            error_kind: error.kind().to_string(),
            message: error.to_string(),
            attempts,
            last_diagnosis,
            last_plan,
        })
    }
}

fn transition(state: &mut PipelineState, next: PipelineState) {
    tracing::debug!(from = ?state, to = ?next, "state transition");
    *state = next;
}

fn failed_attempt(
    index: u32,
    fingerprint: Option<&str>,
    executed: bool,
    error: &TidyError,
) -> AttemptRecord {
    let violations = match error {
        TidyError::Validation(v) => v.clone(),
        _ => Vec::new(),
    };
    AttemptRecord {
        index,
        routine_fingerprint: fingerprint.map(str::to_string),
        executed,
        validated: false,
        error_kind: Some(error.kind().to_string()),
        failure: Some(error.to_string()),
        violations,
        recorded_at: Utc::now(),
    }
}
