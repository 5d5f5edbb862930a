#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Dengue case forecasting engine.
//!
//! [`ForecastEngine::predict`] loads one municipality's monthly series,
//! builds leakage-safe training examples, fits a regression forest with
//! chronological validation, synthesizes the feature row of the requested
//! month, and classifies the predicted case count against the
//! municipality's own history. Every call works from a fresh read of the
//! master table; the only state an engine may keep is the opt-in
//! [`cache::ModelCache`].

pub mod cache;
pub mod config;
pub mod features;
pub mod forest;
pub mod future;
pub mod progress;
pub mod scaler;
pub mod severity;
pub mod training;
pub mod tree;

use std::sync::Arc;

use chrono::{Datelike, Local, NaiveDate};
use dengue_watch_forecast_models::{AlertPayload, ForecastRequest, ModelKind};
use dengue_watch_series::registry::MunicipalityRegistry;
use dengue_watch_series::{SeriesError, SeriesLoader};
use dengue_watch_series_models::{HistoryPoint, YearMonth};
use thiserror::Error;

use crate::cache::{CacheKey, ModelCache};
use crate::config::ForecastConfig;
use crate::progress::ProgressCallback;
use crate::training::{BASELINE_MONTHS, FitOutcome};

/// Errors that can occur while producing a forecast.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Loading the municipality series failed.
    #[error(transparent)]
    Series(#[from] SeriesError),

    /// The requested month lies before the current month.
    #[error("Requested period {requested} is in the past (current month is {current})")]
    PastDateRequested {
        /// The requested month.
        requested: YearMonth,
        /// The month the request was evaluated in.
        current: YearMonth,
    },

    /// The requested month is not a calendar month.
    #[error("Invalid period {year}-{month}: month must be between 1 and 12")]
    InvalidPeriod {
        /// Requested year.
        year: i32,
        /// Requested month.
        month: u32,
    },

    /// The series is too short to forecast from.
    #[error(
        "Municipality {municipality_id} has {months} month(s) of history; at least {required} required"
    )]
    InsufficientHistory {
        /// Municipality code.
        municipality_id: String,
        /// Months available.
        months: usize,
        /// Months required.
        required: usize,
    },

    /// A climate column has no readings at all for the municipality.
    #[error("Column '{column}' has no values for municipality {municipality_id}")]
    EmptyColumn {
        /// Municipality code.
        municipality_id: String,
        /// Column name.
        column: String,
    },

    /// Configuration TOML could not be parsed.
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration values are out of range.
    #[error("Config error: {message}")]
    Config {
        /// Description of the invalid value.
        message: String,
    },

    /// Reading a configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Produces forecasts for registered municipalities.
#[derive(Debug)]
pub struct ForecastEngine {
    loader: SeriesLoader,
    config: ForecastConfig,
    cache: Option<ModelCache>,
}

impl ForecastEngine {
    /// Creates an engine that refits on every call.
    #[must_use]
    pub const fn new(loader: SeriesLoader, config: ForecastConfig) -> Self {
        Self {
            loader,
            config,
            cache: None,
        }
    }

    /// Enables the in-process model cache.
    #[must_use]
    pub fn with_cache(mut self) -> Self {
        self.cache = Some(ModelCache::new());
        self
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// The municipality registry.
    #[must_use]
    pub const fn registry(&self) -> &MunicipalityRegistry {
        self.loader.registry()
    }

    /// The model cache, if enabled.
    #[must_use]
    pub const fn cache(&self) -> Option<&ModelCache> {
        self.cache.as_ref()
    }

    /// Returns the monthly case history of a municipality without training
    /// anything.
    ///
    /// # Errors
    ///
    /// Returns [`ForecastError::Series`] if the municipality is unknown or
    /// the table cannot be read.
    pub fn get_history(&self, municipality_id: &str) -> Result<Vec<HistoryPoint>, ForecastError> {
        Ok(self.loader.history(municipality_id)?)
    }

    /// Forecasts the requested month, evaluated against today's date.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::predict_as_of`].
    pub fn predict(&self, request: &ForecastRequest) -> Result<AlertPayload, ForecastError> {
        self.predict_as_of(request, Local::now().date_naive())
    }

    /// Forecasts the requested month as if today were `today`.
    ///
    /// # Errors
    ///
    /// * [`ForecastError::Series`] wrapping `UnknownMunicipality` if the id
    ///   is not registered, or any table error
    /// * [`ForecastError::InvalidPeriod`] if the month is outside `1..=12`
    /// * [`ForecastError::PastDateRequested`] if the month is before the
    ///   month of `today`
    /// * [`ForecastError::InsufficientHistory`] if the series is shorter
    ///   than `min_history_months`
    /// * [`ForecastError::EmptyColumn`] if a climate column is entirely
    ///   blank
    pub fn predict_as_of(
        &self,
        request: &ForecastRequest,
        today: NaiveDate,
    ) -> Result<AlertPayload, ForecastError> {
        let municipality = self.loader.municipality(&request.municipality_id)?.clone();

        let target = request.target().ok_or(ForecastError::InvalidPeriod {
            year: request.year,
            month: request.month,
        })?;
        let current = YearMonth {
            year: today.year(),
            month: today.month(),
        };
        if target < current {
            return Err(ForecastError::PastDateRequested {
                requested: target,
                current,
            });
        }

        let series = self.loader.load(&municipality.code)?;
        if series.len() < self.config.min_history_months {
            return Err(ForecastError::InsufficientHistory {
                municipality_id: municipality.code,
                months: series.len(),
                required: self.config.min_history_months,
            });
        }

        let case_counts = series.case_counts();
        let train = || {
            let examples = features::build_training_examples(&series);
            log::debug!(
                "Built {} training example(s) from {} month(s) for {}",
                examples.len(),
                series.len(),
                municipality.code
            );
            training::fit(&examples, &case_counts, &self.config)
        };
        let outcome = match &self.cache {
            Some(cache) => cache.get_or_fit(CacheKey::for_series(&series), train),
            None => Arc::new(train()),
        };

        let row = future::synthesize_future_row(&series, target)?;
        let predicted_cases = clamp_prediction(outcome.model.predict(&row));

        let thresholds = severity::thresholds_from_history(&case_counts, &self.config.severity);
        let severity = severity::classify(predicted_cases, &thresholds);

        log::info!(
            "{} ({}) {target}: {predicted_cases} predicted case(s), {severity} [{}]",
            municipality.name,
            municipality.code,
            outcome.kind
        );

        Ok(AlertPayload {
            municipality,
            target,
            predicted_cases,
            severity,
            thresholds,
            confidence_note: confidence_note(&outcome, series.len(), &self.config),
            model: outcome.kind,
            validation: outcome.validation,
        })
    }

    /// Forecasts `target` for each municipality in `municipality_ids`.
    ///
    /// Failures are logged and returned alongside the successes; one bad
    /// municipality does not stop the batch.
    pub fn predict_many(
        &self,
        target: YearMonth,
        municipality_ids: &[String],
        progress: &dyn ProgressCallback,
    ) -> Vec<(String, Result<AlertPayload, ForecastError>)> {
        let today = Local::now().date_naive();
        self.predict_many_as_of(target, municipality_ids, today, progress)
    }

    /// [`Self::predict_many`] with an explicit clock.
    pub fn predict_many_as_of(
        &self,
        target: YearMonth,
        municipality_ids: &[String],
        today: NaiveDate,
        progress: &dyn ProgressCallback,
    ) -> Vec<(String, Result<AlertPayload, ForecastError>)> {
        progress.set_total(municipality_ids.len() as u64);

        let mut failures = 0;
        let results = municipality_ids
            .iter()
            .map(|id| {
                progress.set_message(format!("Forecasting {id}"));
                let request = ForecastRequest::new(id.as_str(), target.year, target.month);
                let result = self.predict_as_of(&request, today);
                if let Err(e) = &result {
                    failures += 1;
                    log::warn!("Forecast for {id} failed: {e}");
                }
                progress.inc(1);
                (id.clone(), result)
            })
            .collect::<Vec<_>>();

        progress.finish(format!(
            "Forecast {} municipalities for {target} ({failures} failed)",
            municipality_ids.len()
        ));

        results
    }
}

/// Turns a raw model output into a case count: non-finite and negative
/// values become `0`, everything else is rounded to the nearest integer.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clamp_prediction(raw: f64) -> u64 {
    if raw.is_finite() && raw > 0.0 {
        raw.round() as u64
    } else {
        0
    }
}

fn confidence_note(outcome: &FitOutcome, history_months: usize, config: &ForecastConfig) -> String {
    match (outcome.kind, outcome.validation) {
        (ModelKind::ValidatedForest, Some(metrics)) => format!(
            "MAE={:.0} cases, R²={} (train={}, validation={}, folds={})",
            metrics.mae,
            metrics
                .r2
                .map_or_else(|| "n/a".to_string(), |r2| format!("{r2:.3}")),
            metrics.train_size,
            metrics.validation_size,
            metrics.folds
        ),
        (ModelKind::PersistenceBaseline, _) => format!(
            "Persistence baseline: only {history_months} months of history, \
             forecast is the mean of the last {} observed months",
            history_months.min(BASELINE_MONTHS)
        ),
        _ => format!(
            "Validation skipped: only {} training examples (at least {} needed)",
            outcome.n_examples, config.validation.min_examples
        ),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use dengue_watch_series::Series;
    use dengue_watch_series::registry::MunicipalityRegistry;
    use dengue_watch_series_models::{MonthlyRecord, Municipality, YearMonth};

    use crate::config::ForecastConfig;

    pub const MUNICIPALITY_ID: &str = "3106200";

    const SEASON: [u64; 12] = [120, 180, 260, 210, 130, 60, 30, 20, 25, 35, 60, 90];

    pub fn municipality() -> Municipality {
        MunicipalityRegistry::embedded()
            .get(MUNICIPALITY_ID)
            .cloned()
            .unwrap()
    }

    pub fn record(year: i32, month: u32, cases: u64) -> MonthlyRecord {
        let m = f64::from(month);
        MonthlyRecord {
            municipality_id: MUNICIPALITY_ID.to_string(),
            year,
            month,
            case_count: cases,
            rainfall_mm: Some(300.0 - 20.0 * m),
            avg_temperature_c: Some(20.0 + 0.5 * m),
            avg_humidity_pct: Some(60.0 + m),
            estimated_population: 2_300_000,
        }
    }

    pub fn series_of(records: Vec<MonthlyRecord>) -> Series {
        Series::new(municipality(), records).unwrap()
    }

    pub fn contiguous_series(start: YearMonth, cases: &[u64]) -> Series {
        let mut period = start;
        let mut records = Vec::with_capacity(cases.len());
        for &count in cases {
            records.push(record(period.year, period.month, count));
            period = period.next();
        }
        series_of(records)
    }

    /// Yearly epidemic curve peaking in March, growing 10 cases a year.
    pub fn seasonal_cases(n_months: usize) -> Vec<u64> {
        (0..n_months)
            .map(|i| SEASON[i % 12] + (i / 12) as u64 * 10)
            .collect()
    }

    pub fn small_forest_config() -> ForecastConfig {
        let mut config = ForecastConfig::embedded();
        config.forest.n_trees = 30;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgress;
    use crate::test_support::{
        MUNICIPALITY_ID, contiguous_series, record, seasonal_cases, small_forest_config,
    };
    use dengue_watch_forecast_models::Severity;
    use dengue_watch_series::table::StaticTable;
    use dengue_watch_series_models::MonthlyRecord;

    fn engine(records: Vec<MonthlyRecord>) -> ForecastEngine {
        let loader = SeriesLoader::new(MunicipalityRegistry::embedded(), StaticTable::new(records));
        ForecastEngine::new(loader, small_forest_config())
    }

    fn seasonal_records(n_months: usize) -> Vec<MonthlyRecord> {
        contiguous_series(YearMonth::new(2021, 1).unwrap(), &seasonal_cases(n_months))
            .records()
            .to_vec()
    }

    fn day(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn three_month_history_uses_persistence_baseline() {
        let engine = engine(vec![
            record(2024, 10, 50),
            record(2024, 11, 80),
            record(2024, 12, 120),
        ]);
        let payload = engine
            .predict_as_of(&ForecastRequest::new(MUNICIPALITY_ID, 2025, 1), day(2025, 1, 10))
            .unwrap();

        assert_eq!(payload.model, ModelKind::PersistenceBaseline);
        assert_eq!(payload.predicted_cases, 83);
        assert!((payload.thresholds.moderate_above - 80.0).abs() < 1e-9);
        assert!((payload.thresholds.severe_above - 104.0).abs() < 1e-9);
        assert_eq!(payload.severity, Severity::Moderate);
        assert!(payload.confidence_note.starts_with("Persistence baseline"));
        assert_eq!(payload.municipality.name, "Belo Horizonte");
    }

    #[test]
    fn long_history_is_validated_and_deterministic() {
        let request = ForecastRequest::new(MUNICIPALITY_ID, 2025, 3);
        let today = day(2025, 1, 1);

        let first = engine(seasonal_records(48)).predict_as_of(&request, today).unwrap();
        let second = engine(seasonal_records(48)).predict_as_of(&request, today).unwrap();

        assert_eq!(first.model, ModelKind::ValidatedForest);
        assert!(first.validation.is_some());
        assert!(first.confidence_note.starts_with("MAE="));
        assert_eq!(first.predicted_cases, second.predicted_cases);
        assert_eq!(first.severity, second.severity);
        assert_eq!(first.validation, second.validation);
    }

    #[test]
    fn short_history_skips_validation() {
        let payload = engine(seasonal_records(10))
            .predict_as_of(&ForecastRequest::new(MUNICIPALITY_ID, 2021, 11), day(2021, 11, 1))
            .unwrap();
        assert_eq!(payload.model, ModelKind::UnvalidatedForest);
        assert!(payload.validation.is_none());
        assert!(payload.confidence_note.starts_with("Validation skipped"));
    }

    #[test]
    fn past_period_is_rejected_for_every_municipality() {
        let engine = engine(seasonal_records(24));
        let ids: Vec<String> = engine.registry().iter().map(|m| m.code.clone()).collect();
        for id in ids {
            let err = engine
                .predict_as_of(&ForecastRequest::new(id.as_str(), 2024, 12), day(2025, 1, 31))
                .unwrap_err();
            assert!(
                matches!(err, ForecastError::PastDateRequested { .. }),
                "{id}: unexpected error {err}"
            );
        }
    }

    #[test]
    fn current_month_is_accepted() {
        let engine = engine(seasonal_records(24));
        let result =
            engine.predict_as_of(&ForecastRequest::new(MUNICIPALITY_ID, 2023, 1), day(2023, 1, 31));
        assert!(result.is_ok(), "{result:?}");
    }

    #[test]
    fn unknown_municipality_is_rejected_for_any_period() {
        let engine = engine(seasonal_records(24));
        for (year, month) in [(2000, 1), (2030, 6), (2030, 13)] {
            let err = engine
                .predict_as_of(&ForecastRequest::new("0000000", year, month), day(2025, 1, 1))
                .unwrap_err();
            assert!(
                matches!(
                    err,
                    ForecastError::Series(SeriesError::UnknownMunicipality { .. })
                ),
                "unexpected error {err}"
            );
        }
    }

    #[test]
    fn invalid_month_is_rejected() {
        let err = engine(seasonal_records(24))
            .predict_as_of(&ForecastRequest::new(MUNICIPALITY_ID, 2030, 13), day(2025, 1, 1))
            .unwrap_err();
        assert!(matches!(err, ForecastError::InvalidPeriod { month: 13, .. }));
    }

    #[test]
    fn too_short_history_is_insufficient() {
        let err = engine(vec![record(2024, 11, 5), record(2024, 12, 9)])
            .predict_as_of(&ForecastRequest::new(MUNICIPALITY_ID, 2025, 1), day(2025, 1, 1))
            .unwrap_err();
        assert!(matches!(
            err,
            ForecastError::InsufficientHistory {
                months: 2,
                required: 3,
                ..
            }
        ));
    }

    #[test]
    fn gaps_do_not_break_forecasting() {
        let records: Vec<MonthlyRecord> = seasonal_records(36)
            .into_iter()
            .filter(|r| !matches!((r.year, r.month), (2021, 4) | (2022, 7..=8) | (2023, 2)))
            .collect();
        let payload = engine(records)
            .predict_as_of(&ForecastRequest::new(MUNICIPALITY_ID, 2024, 2), day(2024, 1, 5))
            .unwrap();
        assert_ne!(payload.model, ModelKind::PersistenceBaseline);
    }

    #[test]
    fn cached_engine_reuses_fitted_model() {
        let engine = engine(seasonal_records(30)).with_cache();
        let request = ForecastRequest::new(MUNICIPALITY_ID, 2023, 8);
        let first = engine.predict_as_of(&request, day(2023, 6, 1)).unwrap();
        let second = engine.predict_as_of(&request, day(2023, 6, 1)).unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.cache().map(ModelCache::len), Some(1));
    }

    #[test]
    fn batch_reports_each_municipality() {
        let engine = engine(seasonal_records(24));
        let ids = vec![MUNICIPALITY_ID.to_string(), "0000000".to_string()];
        let results = engine.predict_many_as_of(
            YearMonth::new(2023, 1).unwrap(),
            &ids,
            day(2023, 1, 1),
            &NullProgress,
        );
        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
    }

    #[test]
    fn history_does_not_train() {
        let history = engine(seasonal_records(5)).get_history(MUNICIPALITY_ID).unwrap();
        let counts: Vec<u64> = history.iter().map(|h| h.case_count).collect();
        assert_eq!(counts, seasonal_cases(5));
    }

    #[test]
    fn clamps_raw_predictions() {
        assert_eq!(clamp_prediction(-3.2), 0);
        assert_eq!(clamp_prediction(f64::NAN), 0);
        assert_eq!(clamp_prediction(f64::INFINITY), 0);
        assert_eq!(clamp_prediction(0.4), 0);
        assert_eq!(clamp_prediction(12.5), 13);
    }
}
