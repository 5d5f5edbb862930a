//! CART regression tree.
//!
//! Splits minimise the summed squared error of the two children, which is
//! the same as maximising `sum_l² / n_l + sum_r² / n_r`. Candidate
//! thresholds sit halfway between consecutive distinct feature values.

use rand::Rng;

use crate::scaler::FeatureVector;
use dengue_watch_forecast_models::FEATURE_COUNT;

/// Growth limits of a single tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeParams {
    /// Maximum depth; the root is depth 0.
    pub max_depth: usize,
    /// Minimum samples a node needs before it may be split.
    pub min_samples_split: usize,
    /// Minimum samples each child must keep.
    pub min_samples_leaf: usize,
    /// Features drawn at random for each split.
    pub max_features: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct BestSplit {
    feature: usize,
    threshold: f64,
    score: f64,
}

/// A fitted regression tree stored as a flat node arena.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Grows a tree over the rows named by `samples` (indices into `x` and
    /// `y`, repeats allowed).
    ///
    /// An empty `samples` yields a single leaf predicting `0.0`.
    #[must_use]
    pub fn fit<R: Rng + ?Sized>(
        x: &[FeatureVector],
        y: &[f64],
        samples: &[usize],
        params: &TreeParams,
        rng: &mut R,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        let mut samples = samples.to_vec();
        tree.grow(x, y, &mut samples, 0, params, rng);
        tree
    }

    /// Predicts the target for one (already scaled) row.
    #[must_use]
    pub fn predict(&self, row: &FeatureVector) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Number of leaves.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, Node::Leaf { .. }))
            .count()
    }

    /// Length of the longest root-to-leaf path.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth_from(0)
    }

    fn depth_from(&self, idx: usize) -> usize {
        match &self.nodes[idx] {
            Node::Leaf { .. } => 0,
            Node::Split { left, right, .. } => {
                1 + self.depth_from(*left).max(self.depth_from(*right))
            }
        }
    }

    fn grow<R: Rng + ?Sized>(
        &mut self,
        x: &[FeatureVector],
        y: &[f64],
        samples: &mut [usize],
        depth: usize,
        params: &TreeParams,
        rng: &mut R,
    ) -> usize {
        let idx = self.nodes.len();
        let value = leaf_value(y, samples);
        self.nodes.push(Node::Leaf { value });

        let n = samples.len();
        if depth >= params.max_depth
            || n < params.min_samples_split
            || n < 2 * params.min_samples_leaf
            || is_pure(y, samples)
        {
            return idx;
        }

        let Some(split) = best_split(x, y, samples, params, rng) else {
            return idx;
        };

        let mid = partition(samples, |i| x[i][split.feature] <= split.threshold);
        let (left_samples, right_samples) = samples.split_at_mut(mid);
        let left = self.grow(x, y, left_samples, depth + 1, params, rng);
        let right = self.grow(x, y, right_samples, depth + 1, params, rng);

        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }
}

#[allow(clippy::cast_precision_loss)]
fn leaf_value(y: &[f64], samples: &[usize]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|&i| y[i]).sum::<f64>() / samples.len() as f64
}

fn is_pure(y: &[f64], samples: &[usize]) -> bool {
    samples
        .first()
        .is_none_or(|&first| samples.iter().all(|&i| y[i].total_cmp(&y[first]).is_eq()))
}

#[allow(clippy::cast_precision_loss)]
fn best_split<R: Rng + ?Sized>(
    x: &[FeatureVector],
    y: &[f64],
    samples: &[usize],
    params: &TreeParams,
    rng: &mut R,
) -> Option<BestSplit> {
    let n = samples.len();
    let total: f64 = samples.iter().map(|&i| y[i]).sum();
    let parent_score = total * total / n as f64;
    let min_gain = f64::EPSILON * parent_score.abs().max(1.0);

    let candidates = rand::seq::index::sample(
        rng,
        FEATURE_COUNT,
        params.max_features.clamp(1, FEATURE_COUNT),
    );

    let mut best: Option<BestSplit> = None;
    let mut column: Vec<(f64, f64)> = Vec::with_capacity(n);

    for feature in candidates.iter() {
        column.clear();
        column.extend(samples.iter().map(|&i| (x[i][feature], y[i])));
        column.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_sum = 0.0;
        for (pos, pair) in column.windows(2).enumerate() {
            left_sum += pair[0].1;
            let n_left = pos + 1;
            let n_right = n - n_left;
            if n_left < params.min_samples_leaf || n_right < params.min_samples_leaf {
                continue;
            }
            if pair[0].0 >= pair[1].0 {
                continue;
            }

            let right_sum = total - left_sum;
            let score = left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64;
            if score - parent_score <= min_gain {
                continue;
            }
            if best.is_none_or(|b| score > b.score) {
                let mut threshold = pair[0].0 / 2.0 + pair[1].0 / 2.0;
                if threshold >= pair[1].0 {
                    threshold = pair[0].0;
                }
                best = Some(BestSplit {
                    feature,
                    threshold,
                    score,
                });
            }
        }
    }

    best
}

/// Reorders `samples` so every index satisfying `goes_left` comes first
/// and returns how many do. Relative order within each side is kept.
fn partition(samples: &mut [usize], goes_left: impl Fn(usize) -> bool) -> usize {
    let (left, right): (Vec<usize>, Vec<usize>) = samples.iter().copied().partition(|&i| goes_left(i));
    let mid = left.len();
    for (slot, value) in samples.iter_mut().zip(left.into_iter().chain(right)) {
        *slot = value;
    }
    mid
}
