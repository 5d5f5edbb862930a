//! Bagged ensemble of [`RegressionTree`]s.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::config::ForestConfig;
use crate::scaler::FeatureVector;
use crate::tree::{RegressionTree, TreeParams};
use dengue_watch_forecast_models::FEATURE_COUNT;

/// Random forest regressor.
///
/// Tree `i` is grown from its own `StdRng` seeded with `seed + i`, so the
/// fitted forest depends only on the data and the configuration, not on
/// how rayon schedules the trees.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    /// Fits the forest. Each tree sees a bootstrap sample of `x`.
    ///
    /// Empty input yields a forest with no trees, which predicts `0.0`.
    #[must_use]
    pub fn fit(x: &[FeatureVector], y: &[f64], config: &ForestConfig) -> Self {
        let n = x.len().min(y.len());
        if n == 0 {
            return Self { trees: Vec::new() };
        }

        let params = TreeParams {
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            max_features: config.max_features.resolve(FEATURE_COUNT),
        };

        let trees = (0..config.n_trees)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(i as u64));
                let samples: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(x, y, &samples, &params, &mut rng)
            })
            .collect::<Vec<_>>();

        log::debug!("Fitted {} trees on {n} examples", trees.len());

        Self { trees }
    }

    /// Mean prediction over all trees.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn predict(&self, row: &FeatureVector) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|tree| tree.predict(row)).sum::<f64>() / self.trees.len() as f64
    }

    /// Number of fitted trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForecastConfig;

    fn config(n_trees: usize) -> ForestConfig {
        ForestConfig {
            n_trees,
            ..ForecastConfig::embedded().forest
        }
    }

    fn linear_data() -> (Vec<FeatureVector>, Vec<f64>) {
        let x = (0..40)
            .map(|i| {
                let mut row = [0.0; FEATURE_COUNT];
                for (j, value) in row.iter_mut().enumerate() {
                    *value = f64::from(i) * (j as f64 + 1.0);
                }
                row
            })
            .collect();
        let y = (0..40).map(|i| f64::from(i) * 2.0).collect();
        (x, y)
    }

    #[test]
    fn same_seed_gives_bit_identical_predictions() {
        let (x, y) = linear_data();
        let a = RandomForest::fit(&x, &y, &config(25));
        let b = RandomForest::fit(&x, &y, &config(25));
        assert_eq!(a, b);
        for row in &x {
            assert_eq!(a.predict(row).to_bits(), b.predict(row).to_bits());
        }
    }

    #[test]
    fn tracks_a_monotone_target() {
        let (x, y) = linear_data();
        let forest = RandomForest::fit(&x, &y, &config(50));
        assert_eq!(forest.n_trees(), 50);
        assert!(forest.predict(&x[2]) < forest.predict(&x[20]));
        assert!(forest.predict(&x[20]) < forest.predict(&x[38]));
        let prediction = forest.predict(&x[20]);
        assert!((prediction - 40.0).abs() < 10.0, "prediction {prediction}");
    }

    #[test]
    fn predictions_stay_within_target_range() {
        let (x, y) = linear_data();
        let forest = RandomForest::fit(&x, &y, &config(20));
        let mut point = [0.0; FEATURE_COUNT];
        point.fill(1e9);
        let p = forest.predict(&point);
        assert!((0.0..=78.0).contains(&p));
    }

    #[test]
    fn empty_input_predicts_zero() {
        let forest = RandomForest::fit(&[], &[], &config(10));
        assert_eq!(forest.n_trees(), 0);
        assert!(forest.predict(&[0.0; FEATURE_COUNT]).abs() < f64::EPSILON);
    }
}
