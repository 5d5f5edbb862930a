//! Chronological training and validation.
//!
//! Examples are never shuffled: validation months always come after the
//! months a model was trained on. The scaler is fitted on each training
//! partition alone, and the model that is finally deployed is refitted on
//! every example once the metrics have been taken.

use dengue_watch_forecast_models::{FeatureRow, ModelKind, TrainingExample, ValidationMetrics};

use crate::config::{ForecastConfig, ValidationStrategy};
use crate::forest::RandomForest;
use crate::scaler::{FeatureVector, StandardScaler};

/// Number of latest counts averaged by the persistence baseline.
pub const BASELINE_MONTHS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
enum Predictor {
    Forest {
        scaler: StandardScaler,
        forest: RandomForest,
        log_target: bool,
    },
    Baseline {
        value: f64,
    },
}

/// A model ready to predict a case count from a [`FeatureRow`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    predictor: Predictor,
}

impl TrainedModel {
    /// Predicts the raw (unrounded, possibly negative) case count.
    #[must_use]
    pub fn predict(&self, row: &FeatureRow) -> f64 {
        match &self.predictor {
            Predictor::Forest {
                scaler,
                forest,
                log_target,
            } => {
                let raw = forest.predict(&scaler.transform(&row.to_array()));
                if *log_target { raw.exp_m1() } else { raw }
            }
            Predictor::Baseline { value } => *value,
        }
    }
}

/// The deployed model plus how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    /// Model fitted on every available example.
    pub model: TrainedModel,
    /// Held-out metrics; `None` unless `kind` is
    /// [`ModelKind::ValidatedForest`].
    pub validation: Option<ValidationMetrics>,
    /// Which training path produced `model`.
    pub kind: ModelKind,
    /// Number of training examples that were available.
    pub n_examples: usize,
}

/// Fits the deployed model for one municipality.
///
/// Never fails: with fewer than `validation.min_examples` examples the
/// forest is fitted without validation, and with no examples at all the
/// model is the mean of the latest [`BASELINE_MONTHS`] values of
/// `recent_cases` (chronological case counts).
#[must_use]
pub fn fit(examples: &[TrainingExample], recent_cases: &[u64], config: &ForecastConfig) -> FitOutcome {
    if examples.is_empty() {
        log::warn!(
            "No complete training example in {} month(s) of history; using persistence baseline",
            recent_cases.len()
        );
        return persistence_baseline(recent_cases);
    }

    let validation = if examples.len() < config.validation.min_examples {
        log::warn!(
            "Only {} training example(s); fitting without validation",
            examples.len()
        );
        None
    } else {
        validate(examples, config)
    };

    let model = fit_forest(examples, config);
    let kind = if validation.is_some() {
        ModelKind::ValidatedForest
    } else {
        ModelKind::UnvalidatedForest
    };

    FitOutcome {
        model,
        validation,
        kind,
        n_examples: examples.len(),
    }
}

/// Mean of the latest [`BASELINE_MONTHS`] case counts.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn persistence_baseline(recent_cases: &[u64]) -> FitOutcome {
    let tail = &recent_cases[recent_cases.len().saturating_sub(BASELINE_MONTHS)..];
    let value = if tail.is_empty() {
        0.0
    } else {
        tail.iter().map(|&c| c as f64).sum::<f64>() / tail.len() as f64
    };

    FitOutcome {
        model: TrainedModel {
            predictor: Predictor::Baseline { value },
        },
        validation: None,
        kind: ModelKind::PersistenceBaseline,
        n_examples: 0,
    }
}

/// Fits scaler and forest on `examples`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn fit_forest(examples: &[TrainingExample], config: &ForecastConfig) -> TrainedModel {
    let x: Vec<FeatureVector> = examples.iter().map(|e| e.features.to_array()).collect();
    let y: Vec<f64> = examples
        .iter()
        .map(|e| {
            let target = e.target as f64;
            if config.log_target { target.ln_1p() } else { target }
        })
        .collect();

    let scaler = StandardScaler::fit(&x);
    let forest = RandomForest::fit(&scaler.transform_all(&x), &y, &config.forest);

    TrainedModel {
        predictor: Predictor::Forest {
            scaler,
            forest,
            log_target: config.log_target,
        },
    }
}

/// Chronological `(train_end, validation_end)` boundaries for `n` examples.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn split_points(n: usize, config: &ForecastConfig) -> Vec<(usize, usize)> {
    if n < 2 {
        return Vec::new();
    }

    match config.validation.strategy {
        ValidationStrategy::Holdout => {
            let train_end = ((n as f64) * (1.0 - config.validation.holdout_fraction)).floor() as usize;
            vec![(train_end.clamp(1, n - 1), n)]
        }
        ValidationStrategy::RollingOrigin => {
            let folds = config.validation.folds;
            let block = (n / (folds + 1)).max(1);
            (0..folds)
                .filter_map(|j| {
                    let train_end = n.checked_sub((folds - j) * block)?;
                    (train_end >= 1).then(|| (train_end, (train_end + block).min(n)))
                })
                .collect()
        }
    }
}

/// Fits the model of one validation fold. Only `examples[..train_end]`
/// reaches the scaler and the forest.
fn fit_fold(examples: &[TrainingExample], train_end: usize, config: &ForecastConfig) -> TrainedModel {
    fit_forest(&examples[..train_end], config)
}

#[allow(clippy::cast_precision_loss)]
fn validate(examples: &[TrainingExample], config: &ForecastConfig) -> Option<ValidationMetrics> {
    let splits = split_points(examples.len(), config);
    if splits.is_empty() {
        return None;
    }

    let mut actual = Vec::new();
    let mut predicted = Vec::new();
    let mut train_size = 0;

    for &(train_end, validation_end) in &splits {
        let model = fit_fold(examples, train_end, config);
        for example in &examples[train_end..validation_end] {
            actual.push(example.target as f64);
            predicted.push(model.predict(&example.features).max(0.0));
        }
        train_size += train_end;
    }

    let metrics = ValidationMetrics {
        mae: mae(&actual, &predicted),
        r2: r_squared(&actual, &predicted),
        train_size,
        validation_size: actual.len(),
        folds: splits.len(),
    };

    log::info!(
        "Validation over {} fold(s): MAE={:.2}, R²={}",
        metrics.folds,
        metrics.mae,
        metrics.r2.map_or_else(|| "n/a".to_string(), |r2| format!("{r2:.3}"))
    );

    Some(metrics)
}

/// Mean absolute error. Empty input gives `0.0`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / actual.len() as f64
}

/// Coefficient of determination, or `None` for fewer than two points or
/// constant actuals.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn r_squared(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.len() < 2 {
        return None;
    }

    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    if ss_tot < 1e-10 {
        return None;
    }
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();

    Some(1.0 - ss_res / ss_tot)
}
