//! Master table reader.
//!
//! The ETL scripts write one `;`-separated CSV with a header row. Only the
//! columns listed in [`REQUIRED_COLUMNS`] are read; anything else (names,
//! other arboviruses, totals) is ignored. Rows are filtered by municipality
//! before their remaining cells are parsed, so a malformed row of an
//! unrelated municipality does not block a forecast.

use std::io::Read;
use std::path::PathBuf;

use csv::StringRecord;
use dengue_watch_series_models::MonthlyRecord;

use crate::SeriesError;

/// Field delimiter used by the ETL scripts.
pub const DEFAULT_DELIMITER: u8 = b';';

/// Column names of the master table.
pub mod columns {
    /// IBGE municipality code.
    pub const MUNICIPALITY_CODE: &str = "municipality_code_ibge";
    /// Calendar year.
    pub const YEAR: &str = "year";
    /// Month of the year.
    pub const MONTH: &str = "month";
    /// Monthly dengue case count.
    pub const DENGUE_CASES: &str = "dengue_cases";
    /// Estimated resident population.
    pub const ESTIMATED_POPULATION: &str = "estimated_population";
    /// Accumulated rainfall in millimetres.
    pub const RAINFALL_MM: &str = "rainfall_mm";
    /// Mean temperature in degrees Celsius.
    pub const AVERAGE_TEMPERATURE: &str = "average_temperature";
    /// Mean relative humidity in percent.
    pub const AVERAGE_HUMIDITY: &str = "average_humidity";
}

/// Columns that must be present in the header row.
pub const REQUIRED_COLUMNS: &[&str] = &[
    columns::MUNICIPALITY_CODE,
    columns::YEAR,
    columns::MONTH,
    columns::DENGUE_CASES,
    columns::ESTIMATED_POPULATION,
    columns::RAINFALL_MM,
    columns::AVERAGE_TEMPERATURE,
    columns::AVERAGE_HUMIDITY,
];

/// Something that can produce the monthly records of one municipality.
///
/// Implementations must be `Send + Sync` so a loader can be shared by a
/// long-lived engine.
pub trait RecordSource: Send + Sync {
    /// Returns every record for `municipality_id`, in any order.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError`] if the backing data cannot be read or is
    /// missing a required column or value.
    fn read_municipality(&self, municipality_id: &str) -> Result<Vec<MonthlyRecord>, SeriesError>;
}

#[derive(Debug, Clone)]
enum CsvInput {
    Path(PathBuf),
    Text(String),
}

/// The master table as a CSV file (or in-memory CSV text).
#[derive(Debug, Clone)]
pub struct CsvTable {
    input: CsvInput,
    delimiter: u8,
}

impl CsvTable {
    /// Creates a reader for the CSV file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            input: CsvInput::Path(path.into()),
            delimiter: DEFAULT_DELIMITER,
        }
    }

    /// Creates a reader over CSV text already in memory.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            input: CsvInput::Text(text.into()),
            delimiter: DEFAULT_DELIMITER,
        }
    }

    /// Sets the field delimiter (defaults to `;`).
    #[must_use]
    pub const fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Reads every record of every municipality.
    ///
    /// # Errors
    ///
    /// Same conditions as [`RecordSource::read_municipality`].
    pub fn read_all(&self) -> Result<Vec<MonthlyRecord>, SeriesError> {
        self.read_filtered(None)
    }

    fn read_filtered(&self, municipality_id: Option<&str>) -> Result<Vec<MonthlyRecord>, SeriesError> {
        match &self.input {
            CsvInput::Path(path) => {
                let file = std::fs::File::open(path)?;
                log::debug!("Reading master table from {}", path.display());
                read_records(file, self.delimiter, municipality_id)
            }
            CsvInput::Text(text) => read_records(text.as_bytes(), self.delimiter, municipality_id),
        }
    }
}

impl RecordSource for CsvTable {
    fn read_municipality(&self, municipality_id: &str) -> Result<Vec<MonthlyRecord>, SeriesError> {
        self.read_filtered(Some(municipality_id))
    }
}

/// Records held in memory, for callers that already have the table loaded.
#[derive(Debug, Clone, Default)]
pub struct StaticTable {
    records: Vec<MonthlyRecord>,
}

impl StaticTable {
    /// Wraps a list of records.
    #[must_use]
    pub const fn new(records: Vec<MonthlyRecord>) -> Self {
        Self { records }
    }
}

impl RecordSource for StaticTable {
    fn read_municipality(&self, municipality_id: &str) -> Result<Vec<MonthlyRecord>, SeriesError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.municipality_id == municipality_id)
            .cloned()
            .collect())
    }
}

/// Header positions of the required columns.
struct ColumnIndex {
    code: usize,
    year: usize,
    month: usize,
    cases: usize,
    population: usize,
    rainfall: usize,
    temperature: usize,
    humidity: usize,
}

impl ColumnIndex {
    fn from_headers(headers: &StringRecord) -> Result<Self, SeriesError> {
        let names: Vec<&str> = headers.iter().map(str::trim).collect();
        let find = |column: &str| {
            names
                .iter()
                .position(|name| *name == column)
                .ok_or_else(|| SeriesError::MissingRequiredColumn {
                    column: column.to_string(),
                })
        };

        Ok(Self {
            code: find(columns::MUNICIPALITY_CODE)?,
            year: find(columns::YEAR)?,
            month: find(columns::MONTH)?,
            cases: find(columns::DENGUE_CASES)?,
            population: find(columns::ESTIMATED_POPULATION)?,
            rainfall: find(columns::RAINFALL_MM)?,
            temperature: find(columns::AVERAGE_TEMPERATURE)?,
            humidity: find(columns::AVERAGE_HUMIDITY)?,
        })
    }
}

fn read_records<R: Read>(
    reader: R,
    delimiter: u8,
    municipality_id: Option<&str>,
) -> Result<Vec<MonthlyRecord>, SeriesError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(reader);

    let index = ColumnIndex::from_headers(reader.headers()?)?;
    let mut records = Vec::new();

    for result in reader.records() {
        let row = result?;
        let line = row.position().map_or(0, csv::Position::line);
        let code = normalize_code(row.get(index.code).unwrap_or(""));

        if code.is_empty() || municipality_id.is_some_and(|id| id != code) {
            continue;
        }

        records.push(parse_row(&row, &index, line, code)?);
    }

    Ok(records)
}

fn parse_row(
    row: &StringRecord,
    index: &ColumnIndex,
    line: u64,
    municipality_id: String,
) -> Result<MonthlyRecord, SeriesError> {
    let cell = |idx: usize| row.get(idx).unwrap_or("").trim();
    let invalid = |column: &str, value: &str| SeriesError::InvalidValue {
        line,
        column: column.to_string(),
        value: value.to_string(),
    };

    let year = parse_integer(cell(index.year))
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| invalid(columns::YEAR, cell(index.year)))?;
    let month = parse_integer(cell(index.month))
        .and_then(|v| u32::try_from(v).ok())
        .filter(|m| (1..=12).contains(m))
        .ok_or_else(|| invalid(columns::MONTH, cell(index.month)))?;
    let case_count = parse_integer(cell(index.cases))
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| invalid(columns::DENGUE_CASES, cell(index.cases)))?;
    let estimated_population = parse_integer(cell(index.population))
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| invalid(columns::ESTIMATED_POPULATION, cell(index.population)))?;

    let rainfall_mm = parse_reading(cell(index.rainfall))
        .map_err(|()| invalid(columns::RAINFALL_MM, cell(index.rainfall)))?
        .map(|v| if v < 0.0 { Err(()) } else { Ok(v) })
        .transpose()
        .map_err(|()| invalid(columns::RAINFALL_MM, cell(index.rainfall)))?;
    let avg_temperature_c = parse_reading(cell(index.temperature))
        .map_err(|()| invalid(columns::AVERAGE_TEMPERATURE, cell(index.temperature)))?;
    let avg_humidity_pct = parse_reading(cell(index.humidity))
        .map_err(|()| invalid(columns::AVERAGE_HUMIDITY, cell(index.humidity)))?
        .map(|v| if (0.0..=100.0).contains(&v) { Ok(v) } else { Err(()) })
        .transpose()
        .map_err(|()| invalid(columns::AVERAGE_HUMIDITY, cell(index.humidity)))?;

    Ok(MonthlyRecord {
        municipality_id,
        year,
        month,
        case_count,
        rainfall_mm,
        avg_temperature_c,
        avg_humidity_pct,
        estimated_population,
    })
}

/// Strips whitespace and the `.0` suffix pandas adds to integer codes
/// stored in float columns.
fn normalize_code(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed.strip_suffix(".0").unwrap_or(trimmed).to_string()
}

/// Parses an integer cell, accepting float spellings of whole numbers
/// (`"12.0"`).
#[allow(clippy::cast_possible_truncation)]
fn parse_integer(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && v.fract() == 0.0)
            .map(|v| v as i64)
    })
}

/// Parses an optional climate reading. Blank and `NaN` cells are `None`.
fn parse_reading(raw: &str) -> Result<Option<f64>, ()> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(()),
    }
}
