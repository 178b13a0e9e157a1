//! Surprise evaluation over (prior belief, observed claim) pairs.
//!
//! Wraps the classifier with the scoring blend and feeds the breaker
//! bank as a side effect: every classifier call reports health, and a
//! confident contradiction of a tracked belief reports to the loop
//! watcher. Callers get a score; the bank gets the evidence.

use crate::breakers::BreakerSupervisor;
use crate::metrics::Metrics;
use crate::nli::Classifier;
use std::sync::Arc;
use tracing::{debug, warn};
use vigil_common::breaker::CLASSIFIER_HEALTH;
use vigil_common::claim::Claim;
use vigil_common::entailment::EntailmentResult;
use vigil_common::grounding::GroundingResult;
use vigil_common::surprise::{score_from_result, SurpriseScore};

pub struct SurpriseEvaluator<C: Classifier> {
    classifier: C,
    supervisor: BreakerSupervisor,
    metrics: Arc<Metrics>,
}

impl<C: Classifier> SurpriseEvaluator<C> {
    pub fn new(classifier: C, supervisor: BreakerSupervisor, metrics: Arc<Metrics>) -> Self {
        Self {
            classifier,
            supervisor,
            metrics,
        }
    }

    /// Score a claim against the prior belief it was predicted from.
    /// `belief_key` is the stable identity of the prior belief; repeated
    /// confident contradictions of the same key are what the loop
    /// breaker watches for.
    pub async fn evaluate(&self, belief_key: &str, premise: &str, claim: &Claim) -> SurpriseScore {
        let result = self.classifier.classify(premise, &claim.text).await;
        self.report_classifier_health(&result).await;

        let score = score_from_result(result);
        self.metrics.surprise_score.observe(score.value);

        if score.indicates_contradiction() {
            warn!(
                belief = belief_key,
                value = score.value,
                claim = %claim.id,
                "confident contradiction of prior belief"
            );
            self.supervisor.record_contradiction(belief_key).await;
        } else {
            debug!(belief = belief_key, value = score.value, "claim scored");
        }
        score
    }

    /// Re-score a claim against external evidence gathered for it. The
    /// evidence text becomes the premise, so the score now measures
    /// whether the claim survives verification rather than whether it
    /// matched expectation. Failed grounding yields the no-information
    /// score and stays ungrounded.
    pub async fn evaluate_grounded(
        &self,
        claim: &Claim,
        grounding: &GroundingResult,
    ) -> SurpriseScore {
        if !grounding.succeeded() {
            warn!(
                tool = %grounding.tool,
                claim = %claim.id,
                "grounding failed; score stays uninformative"
            );
            return score_from_result(EntailmentResult::degraded_sentinel());
        }

        let result = self
            .classifier
            .classify(&grounding.result_text, &claim.text)
            .await;
        self.report_classifier_health(&result).await;

        let mut score = score_from_result(result);
        if !score.result.degraded {
            score.grounded = true;
        }
        self.metrics.surprise_score.observe(score.value);
        score
    }

    async fn report_classifier_health(&self, result: &EntailmentResult) {
        self.supervisor
            .record_outcome(CLASSIFIER_HEALTH, !result.degraded)
            .await;
    }
}
