#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Monthly epidemiological and climate record types.
//!
//! These types describe one row of the merged master table produced by the
//! ETL scripts (case counts, climate readings, population) and the
//! municipality registry entries that identify which series can be
//! forecast.

use serde::{Deserialize, Serialize};

/// A calendar month, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    /// Calendar year (e.g. 2025).
    pub year: i32,
    /// Month of the year, `1..=12`.
    pub month: u32,
}

impl YearMonth {
    /// Creates a `YearMonth`, returning `None` if `month` is outside `1..=12`.
    #[must_use]
    pub const fn new(year: i32, month: u32) -> Option<Self> {
        if matches!(month, 1..=12) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// Number of months since year 0, used for calendar arithmetic.
    #[must_use]
    #[allow(clippy::cast_lossless)]
    pub const fn ordinal(self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    /// Inverse of [`Self::ordinal`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub const fn from_ordinal(ordinal: i64) -> Self {
        Self {
            year: ordinal.div_euclid(12) as i32,
            month: ordinal.rem_euclid(12) as u32 + 1,
        }
    }

    /// The month immediately after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self::from_ordinal(self.ordinal() + 1)
    }

    /// The month immediately before this one.
    #[must_use]
    pub const fn previous(self) -> Self {
        Self::from_ordinal(self.ordinal() - 1)
    }

    /// The month `n` months before this one.
    #[must_use]
    #[allow(clippy::cast_lossless)]
    pub const fn minus(self, n: u32) -> Self {
        Self::from_ordinal(self.ordinal() - n as i64)
    }
}

impl std::fmt::Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// One row of the master table for a single municipality and month.
///
/// Climate readings are optional because the upstream weather archive
/// occasionally leaves a month blank. Case counts and population are
/// always present (the ETL fills missing case counts with zero).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRecord {
    /// IBGE municipality code (e.g. `"3106200"`).
    pub municipality_id: String,
    /// Calendar year.
    pub year: i32,
    /// Month of the year, `1..=12`.
    pub month: u32,
    /// Confirmed dengue cases reported for the month.
    pub case_count: u64,
    /// Accumulated rainfall in millimetres.
    pub rainfall_mm: Option<f64>,
    /// Mean daily temperature in degrees Celsius.
    pub avg_temperature_c: Option<f64>,
    /// Mean relative humidity, `0..=100`.
    pub avg_humidity_pct: Option<f64>,
    /// Estimated resident population for the year.
    pub estimated_population: u64,
}

impl MonthlyRecord {
    /// Returns the calendar month of this record.
    #[must_use]
    pub const fn period(&self) -> YearMonth {
        YearMonth {
            year: self.year,
            month: self.month,
        }
    }
}

/// A municipality that can be forecast, deserialized from the registry TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Municipality {
    /// IBGE municipality code.
    pub code: String,
    /// Human-readable name (e.g. "Belo Horizonte").
    pub name: String,
    /// Two-letter state abbreviation.
    pub state: String,
    /// Latitude of the municipal seat.
    pub latitude: f64,
    /// Longitude of the municipal seat.
    pub longitude: f64,
}

/// A single point of a municipality's case history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    /// Calendar year.
    pub year: i32,
    /// Month of the year.
    pub month: u32,
    /// Confirmed dengue cases in that month.
    pub case_count: u64,
}

impl From<&MonthlyRecord> for HistoryPoint {
    fn from(record: &MonthlyRecord) -> Self {
        Self {
            year: record.year,
            month: record.month,
            case_count: record.case_count,
        }
    }
}
