//! Reviewed-claim records.
//!
//! The daemon keeps a short ring of these and serves them over the
//! control socket, so the CLI can show what the review pipeline has
//! been doing without reading the journal.

use crate::claim::ClaimType;
use crate::grounding::GroundingOutcome;
use crate::surprise::SurpriseScore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The full record of one reviewed claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimReview {
    pub claim_id: Uuid,
    pub claim_type: ClaimType,
    /// Stable identity of the prior belief the claim was tested against.
    pub belief_key: String,
    /// Score against the prior belief, before any verification.
    pub initial: SurpriseScore,
    pub grounding: GroundingOutcome,
    /// Score against evidence when grounding succeeded; otherwise the
    /// initial score carried forward.
    pub final_score: SurpriseScore,
    pub reviewed_at: DateTime<Utc>,
}

impl ClaimReview {
    /// True when verification moved the score by a meaningful margin.
    pub fn score_shifted(&self) -> bool {
        (self.final_score.value - self.initial.value).abs() > 0.05
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entailment::EntailmentResult;
    use crate::grounding::SkipReason;
    use crate::surprise::score_from_result;

    #[test]
    fn test_score_shifted_threshold() {
        let neutral = score_from_result(EntailmentResult::from_probabilities(
            [0.1, 0.8, 0.1],
            false,
            5,
        ));
        let mut review = ClaimReview {
            claim_id: Uuid::new_v4(),
            claim_type: ClaimType::Factual,
            belief_key: "sky.color".to_string(),
            initial: neutral.clone(),
            grounding: GroundingOutcome::Skipped {
                reason: SkipReason::SampledOut,
            },
            final_score: neutral,
            reviewed_at: Utc::now(),
        };
        assert!(!review.score_shifted());
        review.final_score.value = 0.9;
        assert!(review.score_shifted());
    }
}
