//! Adaptive severity thresholds.
//!
//! Cut points are percentiles of the municipality's own monthly case
//! history, so the same predicted count can be Minor in a capital and
//! Severe in a small town.

use dengue_watch_forecast_models::{Severity, SeverityThresholds};

use crate::config::SeverityConfig;

/// Percentile `q` (in `[0, 1]`) of `values` with linear interpolation
/// between the closest ranks. Empty input gives `0.0`.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;

    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Derives the cut points from a municipality's monthly case counts.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn thresholds_from_history(case_counts: &[u64], policy: &SeverityConfig) -> SeverityThresholds {
    let values: Vec<f64> = case_counts.iter().map(|&c| c as f64).collect();

    SeverityThresholds {
        moderate_above: percentile(&values, policy.moderate_percentile),
        severe_above: percentile(&values, policy.severe_percentile),
        extreme_above: policy.extreme_percentile.map(|q| percentile(&values, q)),
    }
}

/// Classifies a predicted case count.
///
/// Boundaries are exclusive: a prediction equal to a cut point stays in
/// the lower tier.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn classify(predicted_cases: u64, thresholds: &SeverityThresholds) -> Severity {
    let predicted = predicted_cases as f64;

    if thresholds.extreme_above.is_some_and(|cut| predicted > cut) {
        Severity::Extreme
    } else if predicted > thresholds.severe_above {
        Severity::Severe
    } else if predicted > thresholds.moderate_above {
        Severity::Moderate
    } else {
        Severity::Minor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForecastConfig;

    fn policy() -> SeverityConfig {
        ForecastConfig::embedded().severity
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let values = [50.0, 80.0, 120.0];
        assert!((percentile(&values, 0.5) - 80.0).abs() < 1e-12);
        assert!((percentile(&values, 0.8) - 104.0).abs() < 1e-12);
        assert!((percentile(&values, 0.0) - 50.0).abs() < 1e-12);
        assert!((percentile(&values, 1.0) - 120.0).abs() < 1e-12);
        assert!((percentile(&[1.0, 2.0, 3.0, 4.0], 0.5) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn percentile_ignores_input_order() {
        let a = percentile(&[120.0, 50.0, 80.0], 0.8);
        let b = percentile(&[50.0, 80.0, 120.0], 0.8);
        assert!((a - b).abs() < f64::EPSILON);
    }

    #[test]
    fn classifies_against_history_percentiles() {
        let thresholds = thresholds_from_history(&[50, 80, 120], &policy());
        assert_eq!(classify(0, &thresholds), Severity::Minor);
        assert_eq!(classify(80, &thresholds), Severity::Minor);
        assert_eq!(classify(81, &thresholds), Severity::Moderate);
        assert_eq!(classify(104, &thresholds), Severity::Moderate);
        assert_eq!(classify(105, &thresholds), Severity::Severe);
    }

    #[test]
    fn severity_is_monotone_in_prediction() {
        let thresholds = thresholds_from_history(&[3, 9, 14, 40, 41, 70, 150, 900], &policy());
        let mut previous = Severity::Minor;
        for predicted in 0..2_000 {
            let severity = classify(predicted, &thresholds);
            assert!(severity >= previous, "{predicted} dropped to {severity}");
            previous = severity;
        }
    }

    #[test]
    fn all_zero_history_makes_any_case_severe() {
        let thresholds = thresholds_from_history(&[0, 0, 0, 0], &policy());
        assert_eq!(classify(0, &thresholds), Severity::Minor);
        assert_eq!(classify(1, &thresholds), Severity::Severe);
    }

    #[test]
    fn empty_history_gives_zero_thresholds() {
        let thresholds = thresholds_from_history(&[], &policy());
        assert!(thresholds.moderate_above.abs() < f64::EPSILON);
        assert!(thresholds.severe_above.abs() < f64::EPSILON);
    }

    #[test]
    fn extreme_tier_only_when_configured() {
        let counts = [10, 20, 30, 40, 50, 60, 70, 80, 90, 100];
        let disabled = thresholds_from_history(&counts, &policy());
        assert_eq!(classify(10_000, &disabled), Severity::Severe);

        let enabled_policy = SeverityConfig {
            extreme_percentile: Some(0.95),
            ..policy()
        };
        let enabled = thresholds_from_history(&counts, &enabled_policy);
        assert_eq!(classify(10_000, &enabled), Severity::Extreme);
        assert_eq!(classify(90, &enabled), Severity::Severe);
    }
}
