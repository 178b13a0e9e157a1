//! Surprise scoring.
//!
//! Converts a classifier verdict about (prediction, outcome) into a single
//! calibrated number in [0,1]. The blend deliberately pulls toward 0.5 as
//! confidence drops so a shaky Contradiction can never produce an extreme
//! score. Scoring is never lexical or embedding similarity; that family of
//! metrics is blind to negation, which is exactly the case this subsystem
//! exists to catch.

use crate::entailment::{EntailmentLabel, EntailmentResult};
use serde::{Deserialize, Serialize};

/// Scores at or above this are treated as a contradiction signal by the
/// breaker feed.
pub const CONTRADICTION_SIGNAL_MIN: f64 = 0.8;

/// Scores below this count as confirmation of the prior prediction.
pub const CONFIRMATION_MAX: f64 = 0.2;

/// A calibrated surprise value plus the classifier evidence behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurpriseScore {
    /// Final blended surprise in [0,1].
    pub value: f64,
    /// The classification that produced this score.
    pub result: EntailmentResult,
    /// True only after external verification corrected or confirmed the
    /// score. Freshly evaluated scores are always ungrounded.
    pub grounded: bool,
}

impl SurpriseScore {
    /// High-surprise contradiction, fit to feed a contradiction-loop
    /// breaker. Degraded results never qualify: they carry no information.
    pub fn indicates_contradiction(&self) -> bool {
        !self.result.degraded
            && self.result.label == EntailmentLabel::Contradiction
            && self.value >= CONTRADICTION_SIGNAL_MIN
    }

    /// Outcome agreed with the prediction.
    pub fn indicates_confirmation(&self) -> bool {
        !self.result.degraded && self.value < CONFIRMATION_MAX
    }
}

/// Label → base surprise before confidence blending.
pub fn base_surprise(label: EntailmentLabel) -> f64 {
    match label {
        EntailmentLabel::Entailment => 0.0,
        EntailmentLabel::Neutral => 0.5,
        EntailmentLabel::Contradiction => 1.0,
    }
}

/// Blend a base surprise with classifier confidence:
/// `base * confidence + 0.5 * (1 - confidence)`, clamped to [0,1].
///
/// At full confidence the base passes through; at zero confidence the
/// result is exactly 0.5 regardless of label.
pub fn blend(base: f64, confidence: f64) -> f64 {
    let c = confidence.clamp(0.0, 1.0);
    (base * c + 0.5 * (1.0 - c)).clamp(0.0, 1.0)
}

/// Score a classifier result. Degraded results surface the raw 0.5
/// no-information value and stay ungrounded.
pub fn score_from_result(result: EntailmentResult) -> SurpriseScore {
    let value = if result.degraded {
        0.5
    } else {
        blend(base_surprise(result.label), result.confidence)
    };
    SurpriseScore {
        value,
        result,
        grounded: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn golden_base_surprise_mapping() {
        assert_eq!(base_surprise(EntailmentLabel::Entailment), 0.0);
        assert_eq!(base_surprise(EntailmentLabel::Neutral), 0.5);
        assert_eq!(base_surprise(EntailmentLabel::Contradiction), 1.0);
    }

    #[test]
    fn golden_blend_full_confidence_passes_base_through() {
        assert_eq!(blend(1.0, 1.0), 1.0);
        assert_eq!(blend(0.0, 1.0), 0.0);
    }

    #[test]
    fn golden_blend_zero_confidence_is_uninformative() {
        assert_eq!(blend(1.0, 0.0), 0.5);
        assert_eq!(blend(0.0, 0.0), 0.5);
    }

    #[test]
    fn test_degraded_result_scores_exactly_half_and_ungrounded() {
        let score = score_from_result(EntailmentResult::degraded_sentinel());
        assert_eq!(score.value, 0.5);
        assert!(!score.grounded);
        assert!(!score.indicates_contradiction());
        assert!(!score.indicates_confirmation());
    }

    #[test]
    fn test_confident_contradiction_signals() {
        let r = EntailmentResult::from_probabilities([0.02, 0.08, 0.90], false, 5);
        let score = score_from_result(r);
        assert!(score.value >= CONTRADICTION_SIGNAL_MIN);
        assert!(score.indicates_contradiction());
    }
}
