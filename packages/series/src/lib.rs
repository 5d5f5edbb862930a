#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Municipality registry, master table reader, and series loader.
//!
//! The master table is the merged monthly CSV produced by the ETL scripts.
//! [`SeriesLoader::load`] reads it, keeps the rows of one registered
//! municipality, and returns them as a chronologically sorted [`Series`].
//! Nothing is cached: every call re-reads the backing table.

pub mod registry;
pub mod table;

use dengue_watch_series_models::{HistoryPoint, MonthlyRecord, Municipality, YearMonth};
use thiserror::Error;

use crate::registry::MunicipalityRegistry;
use crate::table::RecordSource;

/// Errors that can occur while loading municipality series.
#[derive(Debug, Error)]
pub enum SeriesError {
    /// The requested municipality is not in the registry.
    #[error("Unknown municipality: {id}")]
    UnknownMunicipality {
        /// The identifier that was requested.
        id: String,
    },

    /// The master table lacks a column the forecaster needs.
    #[error("Master table is missing required column '{column}'")]
    MissingRequiredColumn {
        /// Name of the missing column.
        column: String,
    },

    /// A required cell could not be parsed or is out of range.
    #[error("Invalid value '{value}' for column '{column}' on line {line}")]
    InvalidValue {
        /// 1-based line number in the source file.
        line: u64,
        /// Column name.
        column: String,
        /// The raw cell contents.
        value: String,
    },

    /// Two rows share the same municipality and month.
    #[error("Duplicate record for municipality {municipality_id} at {period}")]
    DuplicateRecord {
        /// Municipality code.
        municipality_id: String,
        /// The repeated month.
        period: YearMonth,
    },

    /// The registry TOML could not be parsed.
    #[error("Registry parse error: {0}")]
    RegistryParse(#[from] toml::de::Error),

    /// The registry content is inconsistent (duplicates, blank fields).
    #[error("Registry error: {message}")]
    Registry {
        /// Description of what went wrong.
        message: String,
    },

    /// Reading the table or registry file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Monthly records of a single municipality in ascending `(year, month)`
/// order, with at most one record per month.
///
/// Gaps (missing months) are kept as-is; windowed consumers resolve
/// neighbours by calendar month through [`Series::get`].
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    municipality: Municipality,
    records: Vec<MonthlyRecord>,
}

impl Series {
    /// Builds a series from unsorted records.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::DuplicateRecord`] if two records share a month.
    pub fn new(
        municipality: Municipality,
        mut records: Vec<MonthlyRecord>,
    ) -> Result<Self, SeriesError> {
        records.sort_by_key(MonthlyRecord::period);

        if let Some(pair) = records
            .windows(2)
            .find(|pair| pair[0].period() == pair[1].period())
        {
            return Err(SeriesError::DuplicateRecord {
                municipality_id: pair[1].municipality_id.clone(),
                period: pair[1].period(),
            });
        }

        Ok(Self {
            municipality,
            records,
        })
    }

    /// The municipality this series belongs to.
    #[must_use]
    pub const fn municipality(&self) -> &Municipality {
        &self.municipality
    }

    /// All records, oldest first.
    #[must_use]
    pub fn records(&self) -> &[MonthlyRecord] {
        &self.records
    }

    /// Number of months with a record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the series has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The most recent record.
    #[must_use]
    pub fn last(&self) -> Option<&MonthlyRecord> {
        self.records.last()
    }

    /// Looks up the record for a calendar month.
    #[must_use]
    pub fn get(&self, period: YearMonth) -> Option<&MonthlyRecord> {
        self.records
            .binary_search_by_key(&period, MonthlyRecord::period)
            .ok()
            .map(|idx| &self.records[idx])
    }

    /// Case counts in chronological order.
    #[must_use]
    pub fn case_counts(&self) -> Vec<u64> {
        self.records.iter().map(|r| r.case_count).collect()
    }

    /// `(year, month, case_count)` triples in chronological order.
    #[must_use]
    pub fn history(&self) -> Vec<HistoryPoint> {
        self.records.iter().map(HistoryPoint::from).collect()
    }

    /// Months between the first and last record that have no record.
    #[must_use]
    pub fn gaps(&self) -> Vec<YearMonth> {
        let mut gaps = Vec::new();
        for pair in self.records.windows(2) {
            let mut month = pair[0].period().next();
            let end = pair[1].period();
            while month < end {
                gaps.push(month);
                month = month.next();
            }
        }
        gaps
    }
}

/// Resolves municipality identifiers against the registry and reads their
/// series from a [`RecordSource`].
pub struct SeriesLoader {
    registry: MunicipalityRegistry,
    source: Box<dyn RecordSource>,
}

impl std::fmt::Debug for SeriesLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeriesLoader")
            .field("municipalities", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl SeriesLoader {
    /// Creates a loader over the given registry and record source.
    #[must_use]
    pub fn new(registry: MunicipalityRegistry, source: impl RecordSource + 'static) -> Self {
        Self {
            registry,
            source: Box::new(source),
        }
    }

    /// The registry used to validate identifiers.
    #[must_use]
    pub const fn registry(&self) -> &MunicipalityRegistry {
        &self.registry
    }

    /// Looks up a registered municipality.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::UnknownMunicipality`] if `id` is not registered.
    pub fn municipality(&self, id: &str) -> Result<&Municipality, SeriesError> {
        self.registry
            .get(id.trim())
            .ok_or_else(|| SeriesError::UnknownMunicipality { id: id.to_string() })
    }

    /// Loads the chronologically sorted series of a registered municipality.
    ///
    /// # Errors
    ///
    /// * [`SeriesError::UnknownMunicipality`] if `id` is not registered
    /// * [`SeriesError::MissingRequiredColumn`] if the table lacks a column
    /// * [`SeriesError::DuplicateRecord`] if a month appears twice
    /// * any read or parse error from the underlying source
    pub fn load(&self, id: &str) -> Result<Series, SeriesError> {
        let municipality = self.municipality(id)?.clone();
        let records = self.source.read_municipality(&municipality.code)?;

        log::debug!(
            "Loaded {} monthly records for {} ({})",
            records.len(),
            municipality.name,
            municipality.code
        );

        Series::new(municipality, records)
    }

    /// Returns the case history of a registered municipality.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::load`].
    pub fn history(&self, id: &str) -> Result<Vec<HistoryPoint>, SeriesError> {
        Ok(self.load(id)?.history())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::StaticTable;

    fn record(year: i32, month: u32, cases: u64) -> MonthlyRecord {
        MonthlyRecord {
            municipality_id: "3106200".to_string(),
            year,
            month,
            case_count: cases,
            rainfall_mm: Some(100.0),
            avg_temperature_c: Some(24.0),
            avg_humidity_pct: Some(70.0),
            estimated_population: 2_300_000,
        }
    }

    fn loader(records: Vec<MonthlyRecord>) -> SeriesLoader {
        SeriesLoader::new(MunicipalityRegistry::embedded(), StaticTable::new(records))
    }

    #[test]
    fn load_sorts_chronologically() {
        let loader = loader(vec![record(2025, 1, 30), record(2024, 11, 10), record(2024, 12, 20)]);
        let series = loader.load("3106200").unwrap();
        let periods: Vec<String> = series
            .records()
            .iter()
            .map(|r| r.period().to_string())
            .collect();
        assert_eq!(periods, vec!["2024-11", "2024-12", "2025-01"]);
        assert_eq!(series.municipality().name, "Belo Horizonte");
    }

    #[test]
    fn padded_registry_code_still_matches_table_rows() {
        let registry = MunicipalityRegistry::from_toml_str(
            r#"
            [[municipality]]
            code = " 3106200"
            name = "Belo Horizonte"
            state = "MG"
            latitude = -19.9167
            longitude = -43.9345
            "#,
        )
        .unwrap();
        let loader = SeriesLoader::new(registry, StaticTable::new(vec![record(2024, 1, 12)]));
        let series = loader.load("3106200").unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.municipality().code, "3106200");
    }

    #[test]
    fn load_rejects_unregistered_municipality() {
        let loader = loader(vec![record(2024, 1, 1)]);
        let err = loader.load("9999999").unwrap_err();
        assert!(matches!(err, SeriesError::UnknownMunicipality { id } if id == "9999999"));
    }

    #[test]
    fn load_rejects_duplicate_month() {
        let loader = loader(vec![record(2024, 1, 1), record(2024, 1, 2)]);
        let err = loader.load("3106200").unwrap_err();
        assert!(matches!(err, SeriesError::DuplicateRecord { .. }));
    }

    #[test]
    fn history_returns_case_counts_in_order() {
        let loader = loader(vec![record(2024, 2, 7), record(2024, 1, 5)]);
        let history = loader.history("3106200").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].case_count, 5);
        assert_eq!(history[1].case_count, 7);
    }

    #[test]
    fn detects_gaps() {
        let loader = loader(vec![record(2024, 1, 1), record(2024, 2, 1), record(2024, 5, 1)]);
        let series = loader.load("3106200").unwrap();
        let gaps: Vec<String> = series.gaps().iter().map(ToString::to_string).collect();
        assert_eq!(gaps, vec!["2024-03", "2024-04"]);
    }

    #[test]
    fn get_finds_record_by_month() {
        let loader = loader(vec![record(2024, 1, 1), record(2024, 3, 9)]);
        let series = loader.load("3106200").unwrap();
        let march = YearMonth::new(2024, 3).unwrap();
        assert_eq!(series.get(march).map(|r| r.case_count), Some(9));
        assert!(series.get(YearMonth::new(2024, 2).unwrap()).is_none());
    }
}
