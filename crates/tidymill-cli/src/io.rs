//! CSV and report file handling.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use tidymill_core::{CleanTable, RawTable, RemediationOutcome};

/// Read a raw extracted table from CSV. No row is treated as a header: the
/// header region is part of the mess the pipeline has to sort out.
pub fn read_raw_table(path: &Path) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("cannot open {}", path.display()))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("bad CSV record in {}", path.display()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    RawTable::new(rows).with_context(|| format!("unusable table in {}", path.display()))
}

/// Write a tidy table as CSV with a single header row.
pub fn write_clean_table(path: &Path, table: &CleanTable) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("cannot create {}", path.display()))?;
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the full outcome (attempt history included) as a JSON report.
pub fn write_outcome_report(path: &Path, outcome: &RemediationOutcome) -> Result<()> {
    let json = serde_json::to_string_pretty(outcome)?;
    std::fs::write(path, json).with_context(|| format!("cannot write {}", path.display()))
}

/// File stem used as the table identifier and in output names.
pub fn table_id(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "table".to_string())
}

/// `cleaned_<stem>.csv` next to the input unless an output directory is given.
pub fn cleaned_path(input: &Path, out_dir: Option<&Path>) -> PathBuf {
    output_dir(input, out_dir).join(format!("cleaned_{}.csv", table_id(input)))
}

/// `log_<stem>.json` next to the input unless an output directory is given.
pub fn report_path(input: &Path, out_dir: Option<&Path>) -> PathBuf {
    output_dir(input, out_dir).join(format!("log_{}.json", table_id(input)))
}

fn output_dir(input: &Path, out_dir: Option<&Path>) -> PathBuf {
    match out_dir {
        Some(dir) => dir.to_path_buf(),
        None => input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn reads_ragged_csv_without_a_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Sales Report").unwrap();
        writeln!(file, "Region,2020,2021").unwrap();
        writeln!(file, "East,10,20").unwrap();
        drop(file);

        let table = read_raw_table(&path).unwrap();
        assert_eq!(table.height(), 3);
        // Short rows are padded to the widest row.
        assert_eq!(table.width(), 3);
        assert_eq!(table.cell(0, 0), Some("Sales Report"));
        assert_eq!(table.cell(0, 2), Some(""));
    }

    #[test]
    fn output_names_derive_from_the_input_stem() {
        let input = Path::new("/data/q1_sales.csv");
        assert_eq!(table_id(input), "q1_sales");
        assert_eq!(
            cleaned_path(input, None),
            PathBuf::from("/data/cleaned_q1_sales.csv")
        );
        assert_eq!(
            report_path(input, Some(Path::new("/tmp/out"))),
            PathBuf::from("/tmp/out/log_q1_sales.json")
        );
    }

    #[test]
    fn clean_table_round_trips_through_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cleaned.csv");
        let table = CleanTable::new(
            vec!["Region".into(), "Year".into(), "Value".into()],
            vec![vec!["East".into(), "2020".into(), "10".into()]],
        )
        .unwrap();

        write_clean_table(&path, &table).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Region,Year,Value\nEast,2020,10\n");
    }
}
