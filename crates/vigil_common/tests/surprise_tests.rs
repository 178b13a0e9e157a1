//! Tests for surprise.rs: blend calibration and the negation regression.

use approx::assert_relative_eq;
use vigil_common::entailment::{EntailmentLabel, EntailmentResult};
use vigil_common::surprise::{base_surprise, blend, score_from_result};

#[test]
fn test_blend_formula_exact_values() {
    assert_relative_eq!(blend(1.0, 0.9), 0.95, epsilon = 1e-9);
    assert_relative_eq!(blend(0.0, 0.9), 0.05, epsilon = 1e-9);
    assert_relative_eq!(blend(0.5, 0.3), 0.5, epsilon = 1e-9);
}

#[test]
fn test_blend_pulls_toward_half_as_confidence_drops() {
    let high = blend(1.0, 0.95);
    let mid = blend(1.0, 0.6);
    let low = blend(1.0, 0.2);
    assert!(high > mid && mid > low);
    assert!(low > 0.5, "contradiction never drops below uninformative");
}

#[test]
fn test_blend_clamps_out_of_range_confidence() {
    assert_relative_eq!(blend(1.0, 1.7), 1.0, epsilon = 1e-9);
    assert_relative_eq!(blend(1.0, -0.3), 0.5, epsilon = 1e-9);
}

#[test]
fn test_negation_sensitivity_floor() {
    // A confident contradiction must always read as high surprise. At the
    // 0.8 confidence floor the blend gives 0.9; anything above only grows.
    for confidence in [0.80, 0.85, 0.90, 0.95, 1.0] {
        let surprise = blend(base_surprise(EntailmentLabel::Contradiction), confidence);
        assert!(
            surprise >= 0.7,
            "confidence {} produced surprise {}",
            confidence,
            surprise
        );
    }
}

#[test]
fn test_scenario_treaty_ratification_contradiction() {
    // "The treaty was ratified in 1998" vs "The treaty was not ratified
    // until 2001"; the classifier reads this as a confident contradiction.
    let result = EntailmentResult::from_probabilities([0.03, 0.07, 0.90], false, 40);
    assert_eq!(result.label, EntailmentLabel::Contradiction);
    let score = score_from_result(result);
    assert!(score.value >= 0.8, "got {}", score.value);
    assert!(score.indicates_contradiction());
}

#[test]
fn test_scenario_revenue_growth_entailment() {
    // "Revenue grew 12%" vs "Revenue increased" at 0.9 confidence.
    let result = EntailmentResult::from_probabilities([0.90, 0.07, 0.03], false, 35);
    assert_eq!(result.label, EntailmentLabel::Entailment);
    let score = score_from_result(result);
    assert!(score.value <= 0.1, "got {}", score.value);
    assert!(score.indicates_confirmation());
}

#[test]
fn test_degraded_sentinel_scores_half_and_stays_ungrounded() {
    let score = score_from_result(EntailmentResult::degraded_sentinel());
    assert_relative_eq!(score.value, 0.5, epsilon = 1e-9);
    assert!(!score.grounded);
    assert!(score.result.degraded);
}

#[test]
fn test_low_confidence_contradiction_is_not_extreme() {
    // The blend exists so a shaky Contradiction cannot masquerade as a
    // strong one.
    let result = EntailmentResult::from_probabilities([0.30, 0.30, 0.40], false, 22);
    assert_eq!(result.label, EntailmentLabel::Contradiction);
    let score = score_from_result(result);
    assert!(score.value < 0.8);
    assert!(!score.indicates_contradiction());
}
