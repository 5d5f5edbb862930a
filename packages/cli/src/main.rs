#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for dengue forecasts.
//!
//! ```text
//! dengue_watch predict 3106200 2025 3 [--format summary|json|xml]
//! dengue_watch history 3106200
//! dengue_watch municipalities
//! dengue_watch predict-all 2025 3 [--format summary|json|xml]
//! ```
//!
//! The master table path comes from `--table`, then `$DENGUE_WATCH_TABLE`,
//! then `data/master_table.csv`. Log verbosity follows `RUST_LOG`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use dengue_watch_alert::AlertDocument;
use dengue_watch_cli_utils::IndicatifProgress;
use dengue_watch_forecast::config::ForecastConfig;
use dengue_watch_forecast::{ForecastEngine, ForecastError};
use dengue_watch_forecast_models::ForecastRequest;
use dengue_watch_series::SeriesLoader;
use dengue_watch_series::registry::MunicipalityRegistry;
use dengue_watch_series::table::CsvTable;
use dengue_watch_series_models::YearMonth;

/// Environment variable that overrides the default table path.
const TABLE_ENV: &str = "DENGUE_WATCH_TABLE";

/// Table path used when neither `--table` nor [`TABLE_ENV`] is set.
const DEFAULT_TABLE_PATH: &str = "data/master_table.csv";

#[derive(Parser)]
#[command(
    name = "dengue_watch",
    about = "Forecast monthly dengue cases and issue severity alerts"
)]
struct Cli {
    /// Master table CSV (`;`-separated)
    #[arg(long, global = true)]
    table: Option<PathBuf>,

    /// Municipality registry TOML replacing the built-in one
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    /// Engine configuration TOML replacing the built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forecast one municipality for one month
    Predict {
        /// IBGE municipality code
        municipality_id: String,
        /// Target year
        year: i32,
        /// Target month (1-12)
        month: u32,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },
    /// Print the monthly case history of a municipality
    History {
        /// IBGE municipality code
        municipality_id: String,
    },
    /// List the supported municipalities
    Municipalities,
    /// Forecast every registered municipality for one month
    PredictAll {
        /// Target year
        year: i32,
        /// Target month (1-12)
        month: u32,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable summary
    Summary,
    /// Pretty-printed JSON
    Json,
    /// Dublin Core XML record
    Xml,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = dengue_watch_cli_utils::init_logger();
    let cli = Cli::parse();

    let registry = match &cli.registry {
        Some(path) => MunicipalityRegistry::from_path(path)?,
        None => MunicipalityRegistry::embedded(),
    };

    if matches!(cli.command, Commands::Municipalities) {
        println!("{:<8} {:<28} {:<5} {:>9} {:>9}", "CODE", "NAME", "UF", "LAT", "LON");
        println!("{}", "-".repeat(63));
        for m in registry.iter() {
            println!(
                "{:<8} {:<28} {:<5} {:>9.4} {:>9.4}",
                m.code, m.name, m.state, m.latitude, m.longitude
            );
        }
        println!("\n{} municipalities", registry.len());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => ForecastConfig::from_path(path)?,
        None => ForecastConfig::embedded(),
    };
    let table_path = cli
        .table
        .clone()
        .or_else(|| std::env::var_os(TABLE_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TABLE_PATH));
    log::debug!("Reading master table from {}", table_path.display());

    let engine = ForecastEngine::new(
        SeriesLoader::new(registry, CsvTable::new(table_path)),
        config,
    );

    match cli.command {
        Commands::Predict {
            municipality_id,
            year,
            month,
            format,
        } => {
            let payload = engine.predict(&ForecastRequest::new(municipality_id, year, month))?;
            let document = AlertDocument::issue(&payload);
            println!("{}", render(&document, format)?);
        }
        Commands::History { municipality_id } => {
            let history = engine.get_history(&municipality_id)?;
            if history.is_empty() {
                println!("No records for {municipality_id}.");
                return Ok(());
            }
            println!("{:<8} {:>8}", "MONTH", "CASES");
            for point in &history {
                println!("{:04}-{:02}  {:>8}", point.year, point.month, point.case_count);
            }
            println!("\n{} month(s)", history.len());
        }
        Commands::PredictAll {
            year,
            month,
            format,
        } => {
            let target =
                YearMonth::new(year, month).ok_or(ForecastError::InvalidPeriod { year, month })?;
            let ids: Vec<String> = engine.registry().iter().map(|m| m.code.clone()).collect();

            let progress = IndicatifProgress::steps_bar(
                &multi,
                &format!("Forecasting {target}"),
                ids.len() as u64,
            );
            let results = engine.predict_many(target, &ids, progress.as_ref());

            let documents: Vec<AlertDocument> = results
                .iter()
                .filter_map(|(_, result)| result.as_ref().ok())
                .map(AlertDocument::issue)
                .collect();

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&documents)?),
                _ => {
                    for document in &documents {
                        println!("{}\n", render(document, format)?);
                    }
                }
            }

            for (id, result) in &results {
                if let Err(e) = result {
                    eprintln!("{id}: {e}");
                }
            }
            if documents.is_empty() && !ids.is_empty() {
                return Err(format!("No forecast succeeded for {target}").into());
            }
        }
        Commands::Municipalities => {}
    }

    Ok(())
}

fn render(
    document: &AlertDocument,
    format: OutputFormat,
) -> Result<String, dengue_watch_alert::AlertError> {
    Ok(match format {
        OutputFormat::Summary => document.summary(),
        OutputFormat::Json => document.to_json()?,
        OutputFormat::Xml => document.to_xml(),
    })
}
