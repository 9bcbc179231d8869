//! Interpreter for the transformation DSL
//!
//! Pure row/column manipulation over owned data. The deadline and cell budget
//! are checked after every operation so a runaway routine stops on the worker
//! thread too, not only at the outer timeout.

use std::time::Instant;

use regex::Regex;

use tidymill_core::table::is_blank;
use tidymill_core::{CleanTable, Result, TidyError, TransformLog, TransformOp};

/// Working table state during interpretation.
struct Working {
    columns: Option<Vec<String>>,
    rows: Vec<Vec<String>>,
}

impl Working {
    fn width(&self) -> usize {
        self.columns
            .as_ref()
            .map(Vec::len)
            .or_else(|| self.rows.first().map(Vec::len))
            .unwrap_or(0)
    }

    fn cells(&self) -> u64 {
        (self.rows.len() as u64 + 1) * self.width() as u64
    }

    fn column_index(&self, op: &str, name: &str) -> Result<usize> {
        let columns = self
            .columns
            .as_ref()
            .ok_or_else(|| fault(op, "header not flattened yet"))?;
        columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| fault(op, &format!("no column named '{name}'")))
    }
}

fn fault(operation: &str, message: &str) -> TidyError {
    TidyError::RoutineExecution {
        operation: operation.to_string(),
        message: message.to_string(),
    }
}

/// Run a vetted operation sequence over the raw rows.
pub(crate) fn run(
    ops: &[TransformOp],
    rows: Vec<Vec<String>>,
    max_cells: u64,
    deadline: Instant,
) -> Result<(CleanTable, TransformLog)> {
    let mut state = Working {
        columns: None,
        rows,
    };
    let mut log = TransformLog::new();

    check_limits(&state, max_cells, deadline)?;

    for op in ops {
        let entry = apply(op, &mut state, max_cells)?;
        log.push(op.name(), entry.0, entry.1);
        check_limits(&state, max_cells, deadline)?;
    }

    let columns = state
        .columns
        .ok_or_else(|| fault("finish", "routine never established a header"))?;
    let clean = CleanTable::new(columns, state.rows)?;
    Ok((clean, log))
}

fn check_limits(state: &Working, max_cells: u64, deadline: Instant) -> Result<()> {
    if Instant::now() >= deadline {
        return Err(TidyError::ResourceLimit("execution deadline exceeded".into()));
    }
    let cells = state.cells();
    if cells > max_cells {
        return Err(TidyError::ResourceLimit(format!(
            "working table holds {cells} cells, budget is {max_cells}"
        )));
    }
    Ok(())
}

/// Apply one operation, returning (rows_affected, columns_affected).
fn apply(op: &TransformOp, state: &mut Working, max_cells: u64) -> Result<(usize, usize)> {
    match op {
        TransformOp::FlattenHeader { header_rows, names } => {
            if state.columns.is_some() {
                return Err(fault(op.name(), "header already flattened"));
            }
            if *header_rows > state.rows.len() {
                return Err(fault(
                    op.name(),
                    &format!("cannot consume {header_rows} header rows of {}", state.rows.len()),
                ));
            }
            if names.len() != state.width() {
                return Err(fault(
                    op.name(),
                    &format!("{} names for {} columns", names.len(), state.width()),
                ));
            }
            state.rows.drain(..*header_rows);
            state.columns = Some(names.clone());
            Ok((*header_rows, names.len()))
        }

        TransformOp::DropRows { rows } => {
            let mut targets: Vec<usize> = rows.clone();
            targets.sort_unstable();
            targets.dedup();
            if let Some(&bad) = targets.iter().find(|&&i| i >= state.rows.len()) {
                return Err(fault(
                    op.name(),
                    &format!("row {bad} out of bounds ({} rows)", state.rows.len()),
                ));
            }
            for &i in targets.iter().rev() {
                state.rows.remove(i);
            }
            Ok((targets.len(), 0))
        }

        TransformOp::SectionToColumn { name, rows } => {
            let columns = state
                .columns
                .as_mut()
                .ok_or_else(|| fault(op.name(), "header not flattened yet"))?;
            let mut targets: Vec<usize> = rows.clone();
            targets.sort_unstable();
            targets.dedup();
            if let Some(&bad) = targets.iter().find(|&&i| i >= state.rows.len()) {
                return Err(fault(
                    op.name(),
                    &format!("row {bad} out of bounds ({} rows)", state.rows.len()),
                ));
            }

            columns.push(name.clone());
            let mut label = String::new();
            let mut kept = Vec::with_capacity(state.rows.len());
            for (i, mut row) in std::mem::take(&mut state.rows).into_iter().enumerate() {
                if targets.binary_search(&i).is_ok() {
                    label = row
                        .iter()
                        .find(|c| !is_blank(c))
                        .map(|c| c.trim().to_string())
                        .unwrap_or_default();
                } else {
                    row.push(label.clone());
                    kept.push(row);
                }
            }
            state.rows = kept;
            Ok((targets.len(), 1))
        }

        TransformOp::FilterRows { pattern, column } => {
            // Vetting already proved the pattern compiles.
            let regex = Regex::new(&format!("(?i){pattern}"))
                .map_err(|e| fault(op.name(), &e.to_string()))?;
            let col = match column {
                Some(name) => state.column_index(op.name(), name)?,
                None => 0,
            };
            let before = state.rows.len();
            state.rows.retain(|row| !regex.is_match(row[col].trim()));
            Ok((before - state.rows.len(), 0))
        }

        TransformOp::ForwardFill { column } => {
            let col = state.column_index(op.name(), column)?;
            let mut last: Option<String> = None;
            let mut filled = 0;
            for row in &mut state.rows {
                if is_blank(&row[col]) {
                    if let Some(value) = &last {
                        row[col] = value.clone();
                        filled += 1;
                    }
                } else {
                    last = Some(row[col].trim().to_string());
                }
            }
            Ok((filled, 1))
        }

        TransformOp::InjectColumn { name, value } => {
            let columns = state
                .columns
                .as_mut()
                .ok_or_else(|| fault(op.name(), "header not flattened yet"))?;
            columns.push(name.clone());
            for row in &mut state.rows {
                row.push(value.clone());
            }
            Ok((state.rows.len(), 1))
        }

        TransformOp::SplitColumn {
            column,
            separator,
            into,
        } => {
            let col = state.column_index(op.name(), column)?;
            let columns = state.columns.as_mut().expect("checked by column_index");
            columns.splice(col..=col, into.iter().cloned());
            for row in &mut state.rows {
                let cell = row[col].clone();
                let mut parts: Vec<String> = cell
                    .splitn(into.len(), separator.as_str())
                    .map(|p| p.trim().to_string())
                    .collect();
                parts.resize(into.len(), String::new());
                row.splice(col..=col, parts);
            }
            Ok((state.rows.len(), into.len()))
        }

        TransformOp::RenameColumn { from, to } => {
            let col = state.column_index(op.name(), from)?;
            state.columns.as_mut().expect("checked by column_index")[col] = to.clone();
            Ok((0, 1))
        }

        TransformOp::Unpivot {
            identity,
            measures,
            variable,
            value,
        } => {
            let identity_idx: Vec<usize> = identity
                .iter()
                .map(|name| state.column_index(op.name(), name))
                .collect::<Result<_>>()?;
            let measure_idx: Vec<usize> = measures
                .iter()
                .map(|name| state.column_index(op.name(), name))
                .collect::<Result<_>>()?;

            // The long table can be much larger than the wide one; check the
            // budget before materialising it.
            let out_width = identity.len() + 2;
            let out_cells =
                (state.rows.len() as u64) * (measures.len() as u64) * (out_width as u64);
            if out_cells > max_cells {
                return Err(TidyError::ResourceLimit(format!(
                    "unpivot would produce {out_cells} cells, budget is {max_cells}"
                )));
            }

            let mut out_rows = Vec::with_capacity(state.rows.len() * measures.len());
            for row in &state.rows {
                for (m, &midx) in measure_idx.iter().enumerate() {
                    let mut out = Vec::with_capacity(out_width);
                    for &idx in &identity_idx {
                        out.push(row[idx].clone());
                    }
                    out.push(measures[m].clone());
                    out.push(row[midx].clone());
                    out_rows.push(out);
                }
            }

            let mut columns = identity.clone();
            columns.push(variable.clone());
            columns.push(value.clone());
            let affected = out_rows.len();
            state.columns = Some(columns);
            state.rows = out_rows;
            Ok((affected, out_width))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(10)
    }

    #[test]
    fn forward_fill_materialises_the_year_everywhere() {
        let ops = vec![
            TransformOp::FlattenHeader {
                header_rows: 1,
                names: vec!["Year".into(), "Value".into()],
            },
            TransformOp::ForwardFill {
                column: "Year".into(),
            },
        ];
        let data = rows(&[
            &["Year", "Value"],
            &["2020", "1"],
            &["", "2"],
            &["", "3"],
            &["", "4"],
            &["", "5"],
            &["", "6"],
        ]);

        let (clean, log) = run(&ops, data, 10_000, far_deadline()).unwrap();
        assert!(clean.rows().iter().all(|r| r[0] == "2020"));
        assert_eq!(log.entries()[1].rows_affected, 5);
    }

    #[test]
    fn section_to_column_fills_and_removes_labels() {
        let ops = vec![
            TransformOp::FlattenHeader {
                header_rows: 1,
                names: vec!["Region".into(), "Value".into()],
            },
            TransformOp::SectionToColumn {
                name: "Year".into(),
                rows: vec![0, 3],
            },
        ];
        let data = rows(&[
            &["Region", "Value"],
            &["2020", ""],
            &["East", "1"],
            &["West", "2"],
            &["2021", ""],
            &["East", "3"],
        ]);

        let (clean, _) = run(&ops, data, 10_000, far_deadline()).unwrap();
        assert_eq!(clean.columns(), ["Region", "Value", "Year"]);
        assert_eq!(clean.rows().len(), 3);
        assert_eq!(clean.rows()[0], ["East", "1", "2020"]);
        assert_eq!(clean.rows()[2], ["East", "3", "2021"]);
    }

    #[test]
    fn split_column_restores_atomicity() {
        let ops = vec![
            TransformOp::FlattenHeader {
                header_rows: 1,
                names: vec!["Place".into(), "Value".into()],
            },
            TransformOp::SplitColumn {
                column: "Place".into(),
                separator: ";".into(),
                into: vec!["City".into(), "State".into()],
            },
        ];
        let data = rows(&[&["Place", "Value"], &["Springfield; IL", "1"]]);

        let (clean, _) = run(&ops, data, 10_000, far_deadline()).unwrap();
        assert_eq!(clean.columns(), ["City", "State", "Value"]);
        assert_eq!(clean.rows()[0], ["Springfield", "IL", "1"]);
    }

    #[test]
    fn filtering_twice_matches_filtering_once() {
        let filter = TransformOp::FilterRows {
            pattern: "^total$".into(),
            column: None,
        };
        let ops_once = vec![
            TransformOp::FlattenHeader {
                header_rows: 1,
                names: vec!["Region".into(), "Value".into()],
            },
            filter.clone(),
        ];
        let ops_twice = vec![
            TransformOp::FlattenHeader {
                header_rows: 1,
                names: vec!["Region".into(), "Value".into()],
            },
            filter.clone(),
            filter,
        ];
        let data = rows(&[
            &["Region", "Value"],
            &["East", "1"],
            &["Total", "1"],
            &["West", "2"],
        ]);

        let (once, _) = run(&ops_once, data.clone(), 10_000, far_deadline()).unwrap();
        let (twice, _) = run(&ops_twice, data, 10_000, far_deadline()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn header_must_be_established() {
        let ops = vec![TransformOp::DropRows { rows: vec![0] }];
        let data = rows(&[&["a", "b"], &["1", "2"]]);
        let err = run(&ops, data, 10_000, far_deadline()).unwrap_err();
        assert!(matches!(err, TidyError::RoutineExecution { .. }));
    }

    #[test]
    fn unpivot_budget_is_checked_before_materialising() {
        let ops = vec![
            TransformOp::FlattenHeader {
                header_rows: 1,
                names: vec!["R".into(), "a".into(), "b".into(), "c".into(), "d".into()],
            },
            TransformOp::Unpivot {
                identity: vec!["R".into()],
                measures: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                variable: "Year".into(),
                value: "Value".into(),
            },
        ];
        let data = rows(&[
            &["R", "a", "b", "c", "d"],
            &["x", "1", "2", "3", "4"],
            &["y", "1", "2", "3", "4"],
            &["z", "1", "2", "3", "4"],
        ]);
        // 25 cells fit the wide table but not the 36-cell long one.
        let err = run(&ops, data, 25, far_deadline()).unwrap_err();
        assert!(matches!(err, TidyError::ResourceLimit(_)));
        let msg = err.to_string();
        assert!(msg.contains("unpivot"), "unexpected: {msg}");
    }
}
