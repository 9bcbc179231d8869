use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use tidymill_core::{profile, OracleConfig, RemediationConfig, RemediationOutcome};
use tidymill_engine::{OpenAICompatibleClient, RemediationController};

mod io;

/// Tidymill - remediates messy extracted tables into tidy long-format data
#[derive(Parser)]
#[command(name = "tidymill", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Profile a raw CSV table; no oracle involved
    Profile {
        /// Raw CSV file, read without a header row
        input: PathBuf,

        /// Emit the profile as JSON for integrations
        #[arg(long)]
        json: bool,

        /// Known height of the header region, when the upstream extractor
        /// reports one
        #[arg(long, value_name = "N")]
        header_rows: Option<usize>,
    },

    /// Run the full remediation pipeline on a raw CSV table
    Tidy {
        /// Raw CSV file, read without a header row
        input: PathBuf,

        /// Directory for cleaned_<stem>.csv and log_<stem>.json
        /// (defaults to the input's directory)
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,

        /// Known height of the header region
        #[arg(long, value_name = "N")]
        header_rows: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tidymill=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Profile {
            input,
            json,
            header_rows,
        } => {
            let mut table = io::read_raw_table(&input)?;
            if let Some(n) = header_rows {
                table = table.with_declared_header_rows(n);
            }
            let table_profile = profile(&table, &config)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&table_profile)?);
            } else {
                println!("TABLE: {}", io::table_id(&input));
                println!(
                    "SHAPE: {} rows x {} columns",
                    table_profile.row_count, table_profile.column_count
                );
                println!("HEADER ROWS: {}", table_profile.header_rows);
                println!("SECTION ROWS: {:?}", table_profile.section_header_rows);
                println!("AGGREGATE ROWS: {:?}", table_profile.aggregate_rows);
                for column in &table_profile.columns {
                    println!(
                        "  {} [{:?}] blank {:.0}% unique {:.0}%",
                        column.name,
                        column.column_type,
                        column.blank_ratio * 100.0,
                        column.unique_ratio * 100.0
                    );
                }
            }
        }

        Commands::Tidy {
            input,
            out,
            header_rows,
        } => {
            let mut table = io::read_raw_table(&input)?;
            if let Some(n) = header_rows {
                table = table.with_declared_header_rows(n);
            }

            let oracle_config =
                OracleConfig::from_env().context("oracle configuration missing")?;
            let oracle = Arc::new(OpenAICompatibleClient::from_config(&oracle_config));
            let controller = RemediationController::new(oracle, config);

            let table_id = io::table_id(&input);
            let outcome = controller.run(&table_id, &table).await;

            if let Some(dir) = &out {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("cannot create {}", dir.display()))?;
            }
            let report_path = io::report_path(&input, out.as_deref());
            io::write_outcome_report(&report_path, &outcome)?;

            match &outcome {
                RemediationOutcome::Succeeded(success) => {
                    let cleaned_path = io::cleaned_path(&input, out.as_deref());
                    io::write_clean_table(&cleaned_path, &success.clean_table)?;
                    println!(
                        "OK: {} rows -> {} tidy rows in {} attempt(s)",
                        success.rows_original,
                        success.rows_cleaned,
                        success.attempts.len()
                    );
                    println!("CLEANED: {}", cleaned_path.display());
                    println!("REPORT:  {}", report_path.display());
                }
                RemediationOutcome::Failed(failure) => {
                    eprintln!(
                        "FAILED ({}) after {} attempt(s): {}",
                        failure.error_kind,
                        failure.attempts.len(),
                        failure.message
                    );
                    eprintln!("REPORT: {}", report_path.display());
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<RemediationConfig> {
    match path {
        Some(p) => RemediationConfig::from_toml_file(p)
            .with_context(|| format!("cannot load config from {}", p.display())),
        None => Ok(RemediationConfig::default()),
    }
}
