//! Feature engineering over a single municipality's monthly series.
//!
//! Every lag and rolling window is resolved by calendar month through
//! [`Series::get`], so a missing month can never be mistaken for its
//! neighbour. Rows whose window touches a missing month or a blank climate
//! reading are dropped rather than imputed.

use std::f64::consts::PI;

use dengue_watch_forecast_models::{FeatureRow, TrainingExample};
use dengue_watch_series::Series;
use dengue_watch_series_models::MonthlyRecord;

/// Number of preceding months each feature row looks back over.
pub const FEATURE_WINDOW: usize = 6;

/// Cyclical encoding of a calendar month as `(sin, cos)`.
#[must_use]
pub fn month_encoding(month: u32) -> (f64, f64) {
    let angle = 2.0 * PI * f64::from(month) / 12.0;
    (angle.sin(), angle.cos())
}

/// Builds one feature row per month whose full window is available.
///
/// For a contiguous, fully populated series of `n` months this returns
/// `n - FEATURE_WINDOW` rows, oldest first.
#[must_use]
pub fn build_features(series: &Series) -> Vec<FeatureRow> {
    let rows: Vec<FeatureRow> = series
        .records()
        .iter()
        .filter_map(|record| feature_row(series, record))
        .collect();

    let gaps = series.gaps();
    if !gaps.is_empty() {
        log::debug!(
            "{} has {} missing month(s), first {}",
            series.municipality().code,
            gaps.len(),
            gaps[0]
        );
    }

    let dropped = series.len().saturating_sub(FEATURE_WINDOW + rows.len());
    if dropped > 0 {
        log::debug!(
            "Dropped {dropped} month(s) of {} with gaps or blank climate in their window",
            series.municipality().code
        );
    }

    rows
}

/// Pairs every feature row with the case count of the month after it.
///
/// Rows whose following month has no record (the latest row, or a row
/// just before a gap) are not training examples.
#[must_use]
pub fn build_training_examples(series: &Series) -> Vec<TrainingExample> {
    build_features(series)
        .into_iter()
        .filter_map(|features| {
            series
                .get(features.period.next())
                .map(|next| TrainingExample {
                    features,
                    target: next.case_count,
                })
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn feature_row(series: &Series, record: &MonthlyRecord) -> Option<FeatureRow> {
    let period = record.period();

    let mut window = [0.0; FEATURE_WINDOW];
    for (lag, slot) in (1_u32..).zip(window.iter_mut()) {
        *slot = series.get(period.minus(lag))?.case_count as f64;
    }
    let previous = series.get(period.previous())?;

    let rainfall_mm = record.rainfall_mm?;
    let avg_temperature_c = record.avg_temperature_c?;
    let avg_humidity_pct = record.avg_humidity_pct?;
    let rainfall_lag_1 = previous.rainfall_mm?;
    let temp_lag_1 = previous.avg_temperature_c?;
    let humidity_lag_1 = previous.avg_humidity_pct?;

    let (month_sin, month_cos) = month_encoding(period.month);
    let cases = record.case_count as f64;

    Some(FeatureRow {
        period,
        month_sin,
        month_cos,
        lag_1_cases: window[0],
        lag_2_cases: window[1],
        lag_3_cases: window[2],
        rolling_3_cases: mean(&window[..3]),
        rolling_6_cases: mean(&window),
        cases_diff: cases - window[0],
        rainfall_mm,
        avg_temperature_c,
        avg_humidity_pct,
        rainfall_lag_1,
        temp_lag_1,
        humidity_lag_1,
        temp_humidity: avg_temperature_c * avg_humidity_pct,
        rainfall_humidity: rainfall_mm * avg_humidity_pct,
        estimated_population: record.estimated_population as f64,
    })
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
