#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Feature, forecast, and alert payload types.
//!
//! [`FeatureRow`] is the engineered input of the regression forest,
//! [`AlertPayload`] is what a forecast produces for the alert renderer, and
//! [`Severity`] is the tier a predicted case count is classified into.

use dengue_watch_series_models::{Municipality, YearMonth};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Number of model inputs in a [`FeatureRow`].
pub const FEATURE_COUNT: usize = 17;

/// Engineered model inputs for one month of a municipality's series.
///
/// Case-history fields look strictly backwards from `period`: the lags are
/// the counts 1, 2, and 3 months earlier and the rolling means cover the
/// 3 and 6 months before `period`, never `period` itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRow {
    /// The month this row describes. Not a model input.
    pub period: YearMonth,
    /// `sin(2π·month/12)`.
    pub month_sin: f64,
    /// `cos(2π·month/12)`.
    pub month_cos: f64,
    /// Cases one month earlier.
    pub lag_1_cases: f64,
    /// Cases two months earlier.
    pub lag_2_cases: f64,
    /// Cases three months earlier.
    pub lag_3_cases: f64,
    /// Mean cases over the three months before `period`.
    pub rolling_3_cases: f64,
    /// Mean cases over the six months before `period`.
    pub rolling_6_cases: f64,
    /// Cases at `period` minus cases one month earlier.
    pub cases_diff: f64,
    /// Rainfall at `period`, in millimetres.
    pub rainfall_mm: f64,
    /// Mean temperature at `period`, in degrees Celsius.
    pub avg_temperature_c: f64,
    /// Mean relative humidity at `period`, in percent.
    pub avg_humidity_pct: f64,
    /// Rainfall one month earlier.
    pub rainfall_lag_1: f64,
    /// Temperature one month earlier.
    pub temp_lag_1: f64,
    /// Humidity one month earlier.
    pub humidity_lag_1: f64,
    /// `avg_temperature_c × avg_humidity_pct`.
    pub temp_humidity: f64,
    /// `rainfall_mm × avg_humidity_pct`.
    pub rainfall_humidity: f64,
    /// Estimated population at `period`.
    pub estimated_population: f64,
}

impl FeatureRow {
    /// Model input names, in the order of [`Self::to_array`].
    pub const NAMES: [&'static str; FEATURE_COUNT] = [
        "month_sin",
        "month_cos",
        "lag_1_cases",
        "lag_2_cases",
        "lag_3_cases",
        "rolling_3_cases",
        "rolling_6_cases",
        "cases_diff",
        "rainfall_mm",
        "avg_temperature_c",
        "avg_humidity_pct",
        "rainfall_lag_1",
        "temp_lag_1",
        "humidity_lag_1",
        "temp_humidity",
        "rainfall_humidity",
        "estimated_population",
    ];

    /// The model inputs as a fixed-order array.
    #[must_use]
    pub const fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.month_sin,
            self.month_cos,
            self.lag_1_cases,
            self.lag_2_cases,
            self.lag_3_cases,
            self.rolling_3_cases,
            self.rolling_6_cases,
            self.cases_diff,
            self.rainfall_mm,
            self.avg_temperature_c,
            self.avg_humidity_pct,
            self.rainfall_lag_1,
            self.temp_lag_1,
            self.humidity_lag_1,
            self.temp_humidity,
            self.rainfall_humidity,
            self.estimated_population,
        ]
    }

    /// Returns `true` if every model input is a finite number.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

/// A feature row labelled with the case count of the following month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingExample {
    /// Inputs for month `t`.
    pub features: FeatureRow,
    /// Cases observed at month `t + 1`.
    pub target: u64,
}

/// Alert tier of a forecast, ordered from least to most severe.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum Severity {
    /// At or below the municipality's median month.
    Minor,
    /// Above the median, at or below the high percentile.
    Moderate,
    /// Above the high percentile.
    Severe,
    /// Above the optional extreme percentile.
    Extreme,
}

/// Case-count cut points used to classify a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeverityThresholds {
    /// Predictions above this are at least [`Severity::Moderate`].
    pub moderate_above: f64,
    /// Predictions above this are at least [`Severity::Severe`].
    pub severe_above: f64,
    /// Predictions above this are [`Severity::Extreme`], when configured.
    pub extreme_above: Option<f64>,
}

/// How the deployed model for a forecast was obtained.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModelKind {
    /// Regression forest with held-out validation metrics.
    ValidatedForest,
    /// Regression forest fitted on too few examples to hold any out.
    UnvalidatedForest,
    /// No complete training example exists; mean of the latest counts.
    PersistenceBaseline,
}

/// Error metrics measured on chronologically held-out months.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationMetrics {
    /// Mean absolute error, in cases.
    pub mae: f64,
    /// Coefficient of determination; `None` when the held-out targets are
    /// constant or fewer than two.
    pub r2: Option<f64>,
    /// Examples used for training (summed over folds).
    pub train_size: usize,
    /// Examples held out (summed over folds).
    pub validation_size: usize,
    /// Number of validation folds.
    pub folds: usize,
}

/// A request to forecast one municipality's cases for one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastRequest {
    /// IBGE municipality code.
    pub municipality_id: String,
    /// Target year.
    pub year: i32,
    /// Target month, `1..=12`.
    pub month: u32,
}

impl ForecastRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(municipality_id: impl Into<String>, year: i32, month: u32) -> Self {
        Self {
            municipality_id: municipality_id.into(),
            year,
            month,
        }
    }

    /// The target month, or `None` if `month` is outside `1..=12`.
    #[must_use]
    pub const fn target(&self) -> Option<YearMonth> {
        YearMonth::new(self.year, self.month)
    }
}

/// The outcome of one forecast, ready to be rendered as an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    /// The forecast municipality, including its coordinates.
    pub municipality: Municipality,
    /// The forecast month.
    pub target: YearMonth,
    /// Predicted case count, never negative.
    pub predicted_cases: u64,
    /// Tier of `predicted_cases` against the municipality's history.
    pub severity: Severity,
    /// Cut points used for `severity`.
    pub thresholds: SeverityThresholds,
    /// Human-readable summary of the validation error.
    pub confidence_note: String,
    /// How the model behind this forecast was obtained.
    pub model: ModelKind,
    /// Validation metrics, if validation ran.
    pub validation: Option<ValidationMetrics>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr as _;

    #[test]
    fn severity_orders_by_tier() {
        assert!(Severity::Minor < Severity::Moderate);
        assert!(Severity::Moderate < Severity::Severe);
        assert!(Severity::Severe < Severity::Extreme);
    }

    #[test]
    fn severity_round_trips_through_strings() {
        for severity in [
            Severity::Minor,
            Severity::Moderate,
            Severity::Severe,
            Severity::Extreme,
        ] {
            assert_eq!(Severity::from_str(severity.as_ref()).unwrap(), severity);
        }
        assert_eq!(Severity::Severe.to_string(), "Severe");
    }

    #[test]
    fn feature_names_match_array_length() {
        assert_eq!(FeatureRow::NAMES.len(), FEATURE_COUNT);
        let unique: std::collections::BTreeSet<_> = FeatureRow::NAMES.iter().collect();
        assert_eq!(unique.len(), FEATURE_COUNT);
    }

    #[test]
    fn request_target_validates_month() {
        assert!(ForecastRequest::new("3106200", 2025, 0).target().is_none());
        assert_eq!(
            ForecastRequest::new("3106200", 2025, 12).target(),
            YearMonth::new(2025, 12)
        );
    }

    #[test]
    fn model_kind_uses_snake_case_names() {
        assert_eq!(ModelKind::PersistenceBaseline.to_string(), "persistence_baseline");
    }
}
