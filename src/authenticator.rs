//! Verification scoring and adaptive model updates

use tracing::debug;

use crate::config::DEFAULT_ADAPT_RATE;
use crate::error::RhythmError;
use crate::types::{AuthDecision, Model, TimingVector};

/// Score at exactly the threshold distance
const SCORE_AT_THRESHOLD: f64 = 70.0;

/// Sum of per-dimension absolute deviations, each divided by its scale
pub fn scaled_manhattan(sample: &[f64], center: &[f64], scale: &[f64]) -> f64 {
    sample
        .iter()
        .zip(center)
        .zip(scale)
        .map(|((x, c), s)| (x - c).abs() / s)
        .sum()
}

/// Verify one attempt against a user's model
///
/// # Errors
/// `DimensionMismatch` if the attempt length differs from the model's,
/// `InvalidModel` if the model has a non-positive scale or threshold.
pub fn authenticate(attempt: &TimingVector, model: &Model) -> Result<AuthDecision, RhythmError> {
    if attempt.len() != model.center.len() {
        return Err(RhythmError::DimensionMismatch {
            expected: model.center.len(),
            actual: attempt.len(),
        });
    }
    if !model.is_consistent() {
        return Err(RhythmError::InvalidModel(format!(
            "dimension {}, {} centers, {} scales, threshold {}",
            model.dimension,
            model.center.len(),
            model.scale.len(),
            model.threshold
        )));
    }

    let distance = scaled_manhattan(attempt.as_slice(), &model.center, &model.scale);
    let accepted = distance <= model.threshold;
    let score = confidence_score(distance, model.threshold);

    debug!(distance, threshold = model.threshold, score, accepted, "verified attempt");

    Ok(AuthDecision {
        accepted,
        distance,
        score,
    })
}

/// Map a distance onto [0, 100]
///
/// 0 → 100, threshold → 70, 2 × threshold → 0, clamped beyond.
pub fn confidence_score(distance: f64, threshold: f64) -> f64 {
    let ratio = distance / threshold;
    let score = if distance <= threshold {
        100.0 - (100.0 - SCORE_AT_THRESHOLD) * ratio
    } else {
        SCORE_AT_THRESHOLD - SCORE_AT_THRESHOLD * (ratio - 1.0)
    };
    score.max(0.0)
}

/// Exponential moving average of the center toward a new sample
///
/// `(1 - rate) * center + rate * sample`, elementwise. Unconditional: callers
/// decide when an attempt is trustworthy enough to learn from.
pub fn adapt_model(center: &[f64], sample: &[f64], rate: f64) -> Vec<f64> {
    center
        .iter()
        .zip(sample)
        .map(|(c, x)| (1.0 - rate) * c + rate * x)
        .collect()
}

/// Adapt a whole model's center, keeping scale and threshold
pub fn adapt(model: &Model, sample: &TimingVector, rate: f64) -> Result<Model, RhythmError> {
    if sample.len() != model.center.len() {
        return Err(RhythmError::DimensionMismatch {
            expected: model.center.len(),
            actual: sample.len(),
        });
    }
    Ok(model.with_center(adapt_model(&model.center, sample.as_slice(), rate)))
}

/// [`adapt`] with the default 0.1 rate
pub fn adapt_default(model: &Model, sample: &TimingVector) -> Result<Model, RhythmError> {
    adapt(model, sample, DEFAULT_ADAPT_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn model() -> Model {
        Model::new(vec![0.1, 0.2, 0.15], vec![0.01, 0.02, 0.015], 3.0)
    }

    #[test]
    fn test_exact_center_scores_100() {
        let m = model();
        let decision = authenticate(&TimingVector::new(m.center.clone()), &m).unwrap();
        assert_eq!(
            decision,
            AuthDecision {
                accepted: true,
                distance: 0.0,
                score: 100.0
            }
        );
    }

    #[test]
    fn test_distance_is_scaled_manhattan() {
        let m = model();
        // one scale unit off on each of the first two dimensions
        let attempt = TimingVector::new(vec![0.11, 0.18, 0.15]);
        let decision = authenticate(&attempt, &m).unwrap();
        assert!((decision.distance - 2.0).abs() < 1e-9);
        assert!(decision.accepted);
    }

    #[test]
    fn test_score_breakpoints() {
        assert_eq!(confidence_score(0.0, 10.0), 100.0);
        assert!((confidence_score(10.0, 10.0) - 70.0).abs() < 1e-12);
        assert!((confidence_score(5.0, 10.0) - 85.0).abs() < 1e-12);
        assert!((confidence_score(15.0, 10.0) - 35.0).abs() < 1e-12);
        assert!(confidence_score(20.0, 10.0).abs() < 1e-12);
        assert_eq!(confidence_score(50.0, 10.0), 0.0);
    }

    #[test]
    fn test_threshold_boundary_is_accepted() {
        let m = Model::new(vec![0.0], vec![1.0], 2.0);
        let decision = authenticate(&TimingVector::new(vec![2.0]), &m).unwrap();
        assert!(decision.accepted);
        let decision = authenticate(&TimingVector::new(vec![2.5]), &m).unwrap();
        assert!(!decision.accepted);
    }

    #[test]
    fn test_dimension_mismatch_fails() {
        let result = authenticate(&TimingVector::new(vec![0.1, 0.2]), &model());
        assert!(matches!(
            result,
            Err(RhythmError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_degenerate_model_fails_loudly() {
        let zero_scale = Model::new(vec![0.1, 0.2], vec![0.0, 0.02], 2.0);
        let result = authenticate(&TimingVector::new(vec![0.1, 0.2]), &zero_scale);
        assert!(matches!(result, Err(RhythmError::InvalidModel(_))));

        let zero_threshold = Model::new(vec![0.1], vec![0.01], 0.0);
        let result = authenticate(&TimingVector::new(vec![0.1]), &zero_threshold);
        assert!(matches!(result, Err(RhythmError::InvalidModel(_))));
    }

    #[test]
    fn test_adapt_model_ema() {
        let center = [1.0, 2.0, 3.0];
        let sample = [2.0, 2.0, 0.0];
        let adapted = adapt_model(&center, &sample, 0.1);
        let expected: Vec<f64> = center
            .iter()
            .zip(&sample)
            .map(|(c, s)| 0.9 * c + 0.1 * s)
            .collect();
        assert_eq!(adapted, expected);
    }

    #[test]
    fn test_adapt_keeps_scale_and_threshold() {
        let m = model();
        let adapted = adapt_default(&m, &TimingVector::new(vec![0.2, 0.2, 0.2])).unwrap();
        assert_eq!(adapted.scale, m.scale);
        assert_eq!(adapted.threshold, m.threshold);
        assert!((adapted.center[0] - 0.11).abs() < 1e-12);
        assert!(adapt_default(&m, &TimingVector::new(vec![0.2])).is_err());
    }

    proptest! {
        #[test]
        fn prop_larger_deviation_never_improves(
            deviations in prop::collection::vec(0.0f64..0.5, 3),
            dim in 0usize..3,
            extra in 0.0f64..0.5,
            sign in any::<bool>()
        ) {
            let m = model();
            let direction = if sign { 1.0 } else { -1.0 };
            let base: Vec<f64> = m.center.iter().zip(&deviations)
                .map(|(c, d)| c + direction * d)
                .collect();
            let mut farther = base.clone();
            farther[dim] += direction * extra;

            let near = authenticate(&TimingVector::new(base), &m).unwrap();
            let far = authenticate(&TimingVector::new(farther), &m).unwrap();
            prop_assert!(far.distance >= near.distance);
            prop_assert!(far.score <= near.score);
            prop_assert!((0.0..=100.0).contains(&far.score));
        }
    }
}
