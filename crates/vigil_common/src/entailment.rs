//! Entailment classification results.
//!
//! The classifier collaborator returns a 3-way categorical distribution over
//! {entailment, neutral, contradiction}. This module holds the normalized
//! result type plus the degraded sentinel used when the classifier cannot
//! be reached; callers must check `degraded` before trusting a result.

use serde::{Deserialize, Serialize};

/// Tolerance when checking that a probability triple sums to 1.0.
pub const PROB_SUM_TOLERANCE: f64 = 1e-3;

/// The three mutually exclusive premise/hypothesis relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntailmentLabel {
    Entailment,
    Neutral,
    Contradiction,
}

impl EntailmentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntailmentLabel::Entailment => "entailment",
            EntailmentLabel::Neutral => "neutral",
            EntailmentLabel::Contradiction => "contradiction",
        }
    }
}

/// Normalized classifier output for one (premise, hypothesis) pair.
///
/// Probabilities are ordered [entailment, neutral, contradiction] and sum to
/// 1.0 within [`PROB_SUM_TOLERANCE`], except on the degraded sentinel,
/// which reports a uniform triple and a flat 0.5 confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntailmentResult {
    pub label: EntailmentLabel,
    /// Per-class probabilities: [entailment, neutral, contradiction].
    pub probabilities: [f64; 3],
    /// Probability of the winning label.
    pub confidence: f64,
    /// True when this result was synthesized because the classifier was
    /// unreachable, timed out, or returned garbage. Scores derived from a
    /// degraded result carry no information.
    pub degraded: bool,
    /// True when either input was cut at the adapter's character bound.
    pub truncated: bool,
    /// Wall-clock time spent in the classifier call.
    pub latency_ms: u64,
}

impl EntailmentResult {
    /// Build a result from a raw probability triple, picking the argmax
    /// label. Ties resolve toward the earlier class, which is deterministic
    /// and favors the less alarming reading.
    pub fn from_probabilities(probabilities: [f64; 3], truncated: bool, latency_ms: u64) -> Self {
        let mut winner = 0;
        for i in 1..3 {
            if probabilities[i] > probabilities[winner] {
                winner = i;
            }
        }
        let label = match winner {
            0 => EntailmentLabel::Entailment,
            1 => EntailmentLabel::Neutral,
            _ => EntailmentLabel::Contradiction,
        };
        Self {
            label,
            probabilities,
            confidence: probabilities[winner],
            degraded: false,
            truncated,
            latency_ms,
        }
    }

    /// The fail-soft sentinel: Neutral, uniform distribution, 0.5
    /// confidence, flagged degraded. Blending this yields exactly 0.5
    /// ("no information"), never an extreme score.
    pub fn degraded_sentinel() -> Self {
        Self {
            label: EntailmentLabel::Neutral,
            probabilities: [1.0 / 3.0; 3],
            confidence: 0.5,
            degraded: true,
            truncated: false,
            latency_ms: 0,
        }
    }

    /// Probability mass assigned to one class.
    pub fn probability(&self, label: EntailmentLabel) -> f64 {
        match label {
            EntailmentLabel::Entailment => self.probabilities[0],
            EntailmentLabel::Neutral => self.probabilities[1],
            EntailmentLabel::Contradiction => self.probabilities[2],
        }
    }

    /// Contract check: does the triple sum to ~1.0?
    pub fn probability_sum_ok(&self) -> bool {
        let sum: f64 = self.probabilities.iter().sum();
        (sum - 1.0).abs() <= PROB_SUM_TOLERANCE
    }
}
