//! Per-feature standardisation.

use dengue_watch_forecast_models::FEATURE_COUNT;

/// One row of model inputs.
pub type FeatureVector = [f64; FEATURE_COUNT];

/// Centres each feature on its training mean and divides by its population
/// standard deviation.
///
/// Statistics come from whatever rows are passed to [`Self::fit`]; callers
/// fit on the training partition only and reuse the scaler for validation
/// and forecast rows.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: FeatureVector,
    scale: FeatureVector,
}

impl StandardScaler {
    /// Computes per-feature statistics. Constant features (and an empty
    /// input) get a scale of `1.0`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(rows: &[FeatureVector]) -> Self {
        let mut mean = [0.0; FEATURE_COUNT];
        let mut scale = [1.0; FEATURE_COUNT];
        if rows.is_empty() {
            return Self { mean, scale };
        }

        let n = rows.len() as f64;
        for feature in 0..FEATURE_COUNT {
            let mu = rows.iter().map(|row| row[feature]).sum::<f64>() / n;
            let variance = rows
                .iter()
                .map(|row| (row[feature] - mu).powi(2))
                .sum::<f64>()
                / n;
            let std = variance.sqrt();

            mean[feature] = mu;
            if std > f64::EPSILON * mu.abs().max(1.0) {
                scale[feature] = std;
            }
        }

        Self { mean, scale }
    }

    /// Standardises one row.
    #[must_use]
    pub fn transform(&self, row: &FeatureVector) -> FeatureVector {
        let mut out = *row;
        for ((value, mean), scale) in out.iter_mut().zip(&self.mean).zip(&self.scale) {
            *value = (*value - mean) / scale;
        }
        out
    }

    /// Standardises every row.
    #[must_use]
    pub fn transform_all(&self, rows: &[FeatureVector]) -> Vec<FeatureVector> {
        rows.iter().map(|row| self.transform(row)).collect()
    }

    /// Per-feature means.
    #[must_use]
    pub const fn mean(&self) -> &FeatureVector {
        &self.mean
    }

    /// Per-feature scales.
    #[must_use]
    pub const fn scale(&self) -> &FeatureVector {
        &self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(first: f64, rest: f64) -> FeatureVector {
        let mut row = [rest; FEATURE_COUNT];
        row[0] = first;
        row
    }

    #[test]
    fn standardises_to_zero_mean_unit_variance() {
        let rows = vec![row(1.0, 5.0), row(3.0, 5.0)];
        let scaler = StandardScaler::fit(&rows);
        assert!((scaler.mean()[0] - 2.0).abs() < 1e-12);
        assert!((scaler.scale()[0] - 1.0).abs() < 1e-12);

        let transformed = scaler.transform_all(&rows);
        assert!((transformed[0][0] + 1.0).abs() < 1e-12);
        assert!((transformed[1][0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn constant_feature_gets_unit_scale() {
        let rows = vec![row(1.0, 5.0), row(3.0, 5.0)];
        let scaler = StandardScaler::fit(&rows);
        assert!((scaler.scale()[1] - 1.0).abs() < f64::EPSILON);
        assert!(scaler.transform(&rows[0])[1].abs() < 1e-12);
    }

    #[test]
    fn unseen_rows_use_training_statistics() {
        let scaler = StandardScaler::fit(&[row(0.0, 0.0), row(10.0, 0.0)]);
        let transformed = scaler.transform(&row(20.0, 0.0));
        assert!((transformed[0] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_fit_is_identity() {
        let scaler = StandardScaler::fit(&[]);
        let input = row(7.0, -2.0);
        assert_eq!(scaler.transform(&input), input);
    }
}
