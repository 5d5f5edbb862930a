//! Feature row for a month that has not happened yet.
//!
//! A future month has no observed cases or climate. Case history comes
//! from the most recent observations. Climate, both current and lag-1,
//! comes from the municipality's climatology for the target calendar month.

use dengue_watch_forecast_models::FeatureRow;
use dengue_watch_series::Series;
use dengue_watch_series_models::{MonthlyRecord, YearMonth};

use crate::ForecastError;
use crate::features::{FEATURE_WINDOW, mean, month_encoding};

/// Calendar months with fewer observations than this fall back to the
/// median over the whole series.
pub const MIN_CLIMATOLOGY_OBSERVATIONS: usize = 3;

#[derive(Debug, Clone, Copy)]
enum ClimateColumn {
    Rainfall,
    Temperature,
    Humidity,
}

impl ClimateColumn {
    const fn name(self) -> &'static str {
        match self {
            Self::Rainfall => "rainfall_mm",
            Self::Temperature => "average_temperature",
            Self::Humidity => "average_humidity",
        }
    }

    const fn value(self, record: &MonthlyRecord) -> Option<f64> {
        match self {
            Self::Rainfall => record.rainfall_mm,
            Self::Temperature => record.avg_temperature_c,
            Self::Humidity => record.avg_humidity_pct,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Climate {
    rainfall_mm: f64,
    avg_temperature_c: f64,
    avg_humidity_pct: f64,
}

/// Synthesizes the feature row for `target` from a municipality's series.
///
/// # Errors
///
/// * [`ForecastError::InsufficientHistory`] if the series is empty
/// * [`ForecastError::EmptyColumn`] if a climate column has no readings at
///   all for the municipality
#[allow(clippy::cast_precision_loss)]
pub fn synthesize_future_row(series: &Series, target: YearMonth) -> Result<FeatureRow, ForecastError> {
    let Some(latest) = series.last() else {
        return Err(ForecastError::InsufficientHistory {
            municipality_id: series.municipality().code.clone(),
            months: 0,
            required: 1,
        });
    };

    let recent: Vec<f64> = series
        .records()
        .iter()
        .rev()
        .take(FEATURE_WINDOW)
        .map(|r| r.case_count as f64)
        .collect();
    let lag = |i: usize| recent[i.min(recent.len() - 1)];

    let climate = climatology(series, target.month)?;

    let (month_sin, month_cos) = month_encoding(target.month);

    Ok(FeatureRow {
        period: target,
        month_sin,
        month_cos,
        lag_1_cases: lag(0),
        lag_2_cases: lag(1),
        lag_3_cases: lag(2),
        rolling_3_cases: mean(&recent[..recent.len().min(3)]),
        rolling_6_cases: mean(&recent),
        cases_diff: if recent.len() > 1 {
            recent[0] - recent[1]
        } else {
            0.0
        },
        rainfall_mm: climate.rainfall_mm,
        avg_temperature_c: climate.avg_temperature_c,
        avg_humidity_pct: climate.avg_humidity_pct,
        rainfall_lag_1: climate.rainfall_mm,
        temp_lag_1: climate.avg_temperature_c,
        humidity_lag_1: climate.avg_humidity_pct,
        temp_humidity: climate.avg_temperature_c * climate.avg_humidity_pct,
        rainfall_humidity: climate.rainfall_mm * climate.avg_humidity_pct,
        estimated_population: latest.estimated_population as f64,
    })
}

fn climatology(series: &Series, month: u32) -> Result<Climate, ForecastError> {
    Ok(Climate {
        rainfall_mm: column_climatology(series, month, ClimateColumn::Rainfall)?,
        avg_temperature_c: column_climatology(series, month, ClimateColumn::Temperature)?,
        avg_humidity_pct: column_climatology(series, month, ClimateColumn::Humidity)?,
    })
}

fn column_climatology(series: &Series, month: u32, column: ClimateColumn) -> Result<f64, ForecastError> {
    let same_month: Vec<f64> = series
        .records()
        .iter()
        .filter(|r| r.month == month)
        .filter_map(|r| column.value(r))
        .collect();
    if same_month.len() >= MIN_CLIMATOLOGY_OBSERVATIONS {
        return Ok(median(same_month));
    }

    let all: Vec<f64> = series.records().iter().filter_map(|r| column.value(r)).collect();
    if all.is_empty() {
        return Err(ForecastError::EmptyColumn {
            municipality_id: series.municipality().code.clone(),
            column: column.name().to_string(),
        });
    }

    log::debug!(
        "Only {} {} reading(s) for month {month}; using the whole-series median",
        same_month.len(),
        column.name()
    );
    Ok(median(all))
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        f64::midpoint(values[mid - 1], values[mid])
    } else {
        values[mid]
    }
}
