//! Tidymill Sandbox - isolated execution of synthesized routines
//!
//! Runs a vetted [`TransformRoutine`] against a raw table with no ambient
//! capability beyond the table value itself, under a hard wall-clock timeout
//! and a memory ceiling. Execution is single-attempt and side-effect-free:
//! the sandbox never retries and never mutates its input, and any violation
//! discards all partial output.

mod interpreter;

use std::time::Instant;

use tidymill_core::{
    CleanTable, RawTable, Result, SandboxLimits, TidyError, TransformLog, TransformRoutine,
};

/// Isolated executor for one routine at a time.
#[derive(Debug, Clone)]
pub struct Sandbox {
    limits: SandboxLimits,
}

impl Sandbox {
    /// Sandbox with the given resource ceilings.
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }

    /// Ceilings this sandbox enforces.
    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Execute a routine against a raw table.
    ///
    /// The routine's static checks are re-run first; the interpreter then
    /// runs on a blocking worker with a deadline and cell budget checked
    /// after every operation. An outer timeout (with a small grace over the
    /// interpreter deadline) guards against a wedged worker. A panic inside
    /// the interpreter is caught and reported as a routine failure, never
    /// propagated as a crash of the caller.
    pub async fn execute(
        &self,
        routine: &TransformRoutine,
        table: &RawTable,
    ) -> Result<(CleanTable, TransformLog)> {
        routine.check()?;

        let ops = routine.ops().to_vec();
        let rows = table.rows().to_vec();
        let max_cells = self.limits.max_cells();
        let timeout = self.limits.timeout();
        let deadline = Instant::now() + timeout;

        tracing::debug!(
            ops = ops.len(),
            rows = rows.len(),
            timeout_ms = self.limits.timeout_ms,
            "executing routine in sandbox"
        );

        let worker =
            tokio::task::spawn_blocking(move || interpreter::run(&ops, rows, max_cells, deadline));

        let grace = std::time::Duration::from_millis(250);
        match tokio::time::timeout(timeout + grace, worker).await {
            Err(_) => Err(TidyError::ResourceLimit(format!(
                "wall-clock timeout after {}ms",
                self.limits.timeout_ms
            ))),
            Ok(Err(join_err)) => Err(TidyError::RoutineExecution {
                operation: "sandbox".into(),
                message: format!("routine worker panicked: {join_err}"),
            }),
            Ok(Ok(result)) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidymill_core::TransformOp;

    fn raw(rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
        .unwrap()
    }

    fn sales_report() -> RawTable {
        raw(&[
            &["Sales Report", "", ""],
            &["Region", "2020", "2021"],
            &["East", "10", "20"],
            &["Total", "10", "20"],
        ])
    }

    fn scenario_routine() -> TransformRoutine {
        TransformRoutine::new(vec![
            TransformOp::DropRows { rows: vec![0] },
            TransformOp::FlattenHeader {
                header_rows: 1,
                names: vec!["Region".into(), "2020".into(), "2021".into()],
            },
            TransformOp::FilterRows {
                pattern: "^total$".into(),
                column: None,
            },
            TransformOp::Unpivot {
                identity: vec!["Region".into()],
                measures: vec!["2020".into(), "2021".into()],
                variable: "Year".into(),
                value: "Value".into(),
            },
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn runs_the_sales_report_scenario() {
        let sandbox = Sandbox::new(SandboxLimits::default());
        let (clean, log) = sandbox
            .execute(&scenario_routine(), &sales_report())
            .await
            .unwrap();

        assert_eq!(clean.columns(), ["Region", "Year", "Value"]);
        assert_eq!(
            clean.rows(),
            [
                vec!["East".to_string(), "2020".into(), "10".into()],
                vec!["East".to_string(), "2021".into(), "20".into()],
            ]
        );
        assert_eq!(log.len(), 4);
        assert_eq!(log.entries()[2].operation, "filter_rows");
        assert_eq!(log.entries()[2].rows_affected, 1);
    }

    #[tokio::test]
    async fn input_table_is_never_mutated() {
        let table = sales_report();
        let sandbox = Sandbox::new(SandboxLimits::default());
        let before = table.clone();
        sandbox.execute(&scenario_routine(), &table).await.unwrap();
        assert_eq!(table, before);
    }

    #[tokio::test]
    async fn unknown_column_is_a_routine_execution_error() {
        let routine = TransformRoutine::new(vec![
            TransformOp::FlattenHeader {
                header_rows: 1,
                names: vec!["a".into(), "b".into(), "c".into()],
            },
            TransformOp::ForwardFill {
                column: "missing".into(),
            },
        ])
        .unwrap();

        let sandbox = Sandbox::new(SandboxLimits::default());
        let err = sandbox
            .execute(&routine, &sales_report())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TidyError::RoutineExecution { ref operation, .. } if operation == "forward_fill"
        ));
    }

    #[tokio::test]
    async fn exhausted_deadline_is_a_resource_limit() {
        let limits = SandboxLimits {
            timeout_ms: 0,
            ..SandboxLimits::default()
        };
        let sandbox = Sandbox::new(limits);
        let err = sandbox
            .execute(&scenario_routine(), &sales_report())
            .await
            .unwrap_err();
        assert!(matches!(err, TidyError::ResourceLimit(_)));
    }

    #[tokio::test]
    async fn cell_budget_is_a_resource_limit() {
        let limits = SandboxLimits {
            timeout_ms: 5_000,
            memory_limit_bytes: 64 * 4, // four cells
        };
        let sandbox = Sandbox::new(limits);
        let err = sandbox
            .execute(&scenario_routine(), &sales_report())
            .await
            .unwrap_err();
        assert!(matches!(err, TidyError::ResourceLimit(_)));
    }
}
