//! Engine configuration.
//!
//! Defaults live in `config/default.toml`, embedded at compile time. A file
//! with the same layout can replace them at runtime via
//! [`ForecastConfig::from_path`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ForecastError;

/// Default configuration embedded at compile time.
const DEFAULT_CONFIG_TOML: &str = include_str!("../config/default.toml");

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForecastConfig {
    /// Minimum number of monthly records a series needs to be forecast.
    pub min_history_months: usize,
    /// Whether to fit on `log1p(cases)` and invert with `expm1`.
    pub log_target: bool,
    /// Regression forest hyperparameters.
    pub forest: ForestConfig,
    /// Validation protocol.
    pub validation: ValidationConfig,
    /// Severity percentile policy.
    pub severity: SeverityConfig,
}

/// Regression forest hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForestConfig {
    /// Number of trees.
    pub n_trees: usize,
    /// Maximum depth of each tree (root is depth 0).
    pub max_depth: usize,
    /// Minimum samples a node needs to be split.
    pub min_samples_split: usize,
    /// Minimum samples on each side of a split.
    pub min_samples_leaf: usize,
    /// Features considered at each split.
    pub max_features: MaxFeatures,
    /// Base seed; tree `i` uses `seed + i`.
    pub seed: u64,
}

/// How many features each split considers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// `ceil(sqrt(n_features))`.
    Sqrt,
    /// Every feature.
    All,
    /// `ceil(fraction × n_features)`.
    Fraction(f64),
}

impl MaxFeatures {
    /// Resolves the number of candidate features for `n_features` inputs,
    /// always within `1..=n_features`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn resolve(self, n_features: usize) -> usize {
        let count = match self {
            Self::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            Self::All => n_features,
            Self::Fraction(fraction) => (fraction * n_features as f64).ceil() as usize,
        };
        count.clamp(1, n_features.max(1))
    }
}

/// Validation protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationConfig {
    /// Which chronological split to use.
    pub strategy: ValidationStrategy,
    /// Trailing fraction held out by [`ValidationStrategy::Holdout`].
    pub holdout_fraction: f64,
    /// Fold count of [`ValidationStrategy::RollingOrigin`].
    pub folds: usize,
    /// Below this many training examples validation is skipped.
    pub min_examples: usize,
}

/// Chronological validation split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStrategy {
    /// Train on the leading examples, validate on the trailing fraction.
    Holdout,
    /// Expanding-window folds, each validated on the block after it.
    RollingOrigin,
}

/// Percentiles of the historical monthly case counts used as severity
/// cut points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeverityConfig {
    /// Above this percentile a forecast is Moderate.
    pub moderate_percentile: f64,
    /// Above this percentile a forecast is Severe.
    pub severe_percentile: f64,
    /// Above this percentile a forecast is Extreme. Disabled when absent.
    #[serde(default)]
    pub extreme_percentile: Option<f64>,
}

impl ForecastConfig {
    /// Returns the configuration compiled into the binary.
    ///
    /// # Panics
    ///
    /// Panics if the embedded TOML is malformed or invalid. It is a
    /// compile-time constant, so a failure here is caught by tests.
    #[must_use]
    pub fn embedded() -> Self {
        Self::from_toml_str(DEFAULT_CONFIG_TOML)
            .unwrap_or_else(|e| panic!("Failed to parse embedded forecast config: {e}"))
    }

    /// Parses and validates a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ForecastError::ConfigParse`] for malformed TOML and
    /// [`ForecastError::Config`] for out-of-range values.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ForecastError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ForecastError::Io`] if the file cannot be read, plus the
    /// conditions of [`Self::from_toml_str`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ForecastError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        log::info!("Loaded forecast configuration from {}", path.display());
        Ok(config)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ForecastError::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<(), ForecastError> {
        let fail = |message: String| Err(ForecastError::Config { message });

        if self.min_history_months == 0 {
            return fail("min_history_months must be at least 1".to_string());
        }
        if self.forest.n_trees == 0 {
            return fail("forest.n_trees must be at least 1".to_string());
        }
        if self.forest.min_samples_leaf == 0 {
            return fail("forest.min_samples_leaf must be at least 1".to_string());
        }
        if self.forest.min_samples_split < 2 {
            return fail("forest.min_samples_split must be at least 2".to_string());
        }
        if let MaxFeatures::Fraction(fraction) = self.forest.max_features {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return fail(format!(
                    "forest.max_features fraction must be in (0, 1], got {fraction}"
                ));
            }
        }
        let fraction = self.validation.holdout_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return fail(format!(
                "validation.holdout_fraction must be in (0, 1), got {fraction}"
            ));
        }
        if self.validation.folds == 0 {
            return fail("validation.folds must be at least 1".to_string());
        }
        if self.validation.min_examples < 2 {
            return fail("validation.min_examples must be at least 2".to_string());
        }

        let severity = &self.severity;
        let percentiles = [
            Some(severity.moderate_percentile),
            Some(severity.severe_percentile),
            severity.extreme_percentile,
        ];
        if percentiles
            .iter()
            .flatten()
            .any(|p| !(0.0..=1.0).contains(p))
        {
            return fail("severity percentiles must be within [0, 1]".to_string());
        }
        if severity.moderate_percentile > severity.severe_percentile
            || severity
                .extreme_percentile
                .is_some_and(|p| p < severity.severe_percentile)
        {
            return fail(
                "severity percentiles must be ordered moderate <= severe <= extreme".to_string(),
            );
        }

        Ok(())
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self::embedded()
    }
}
