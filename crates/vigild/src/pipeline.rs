//! Claim review pipeline.
//!
//! The daemon's cognitive tick body. Claims arrive over the control
//! socket with the prior belief they were predicted from; each tick
//! drains a batch from the queue, scores it, grounds it per policy,
//! and reconciles grounded scores against the evidence. Recent reviews
//! stay available for the operator surface.

use crate::evaluator::SurpriseEvaluator;
use crate::executor::GroundingExecutor;
use crate::journal::Journal;
use crate::nli::Classifier;
use crate::scheduler::TickBody;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use vigil_common::claim::Claim;
use vigil_common::grounding::GroundingOutcome;
use vigil_common::review::ClaimReview;
use vigil_common::tick::TickContext;

/// Claims reviewed per cognitive tick; halved under Dampen.
const REVIEWS_PER_TICK: usize = 16;

/// Queue bound. When full the oldest entry is dropped; fresh claims
/// carry fresher context.
const MAX_QUEUED: usize = 256;

/// Reviews kept for the operator surface.
const MAX_RECENT: usize = 64;

/// One claim waiting for review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedClaim {
    /// Stable identity of the prior belief this claim tests.
    pub belief_key: String,
    /// The prior belief or prediction text, used as the premise.
    pub premise: String,
    pub claim: Claim,
}

pub struct ReviewPipeline<C: Classifier> {
    queue: Mutex<VecDeque<QueuedClaim>>,
    recent: RwLock<VecDeque<ClaimReview>>,
    evaluator: SurpriseEvaluator<C>,
    executor: Arc<GroundingExecutor>,
    journal: Arc<Journal>,
}

impl<C: Classifier> ReviewPipeline<C> {
    pub fn new(
        evaluator: SurpriseEvaluator<C>,
        executor: Arc<GroundingExecutor>,
        journal: Arc<Journal>,
    ) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            recent: RwLock::new(VecDeque::new()),
            evaluator,
            executor,
            journal,
        }
    }

    /// Enqueue one claim. Returns the queue depth after insertion.
    pub async fn submit(&self, queued: QueuedClaim) -> usize {
        let mut queue = self.queue.lock().await;
        if queue.len() >= MAX_QUEUED {
            let dropped = queue.pop_front();
            warn!(
                dropped = ?dropped.map(|q| q.claim.id),
                "review queue full; oldest claim dropped"
            );
        }
        queue.push_back(queued);
        queue.len()
    }

    pub async fn queue_depth(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Most recent reviews, newest first.
    pub async fn recent_reviews(&self) -> Vec<ClaimReview> {
        self.recent.read().await.iter().rev().cloned().collect()
    }

    /// Drain and review up to the batch quota. Returns how many claims
    /// were reviewed.
    pub async fn review_batch(&self, ctx: TickContext) -> usize {
        let quota = if ctx.reduced {
            REVIEWS_PER_TICK / 2
        } else {
            REVIEWS_PER_TICK
        };

        let batch: Vec<QueuedClaim> = {
            let mut queue = self.queue.lock().await;
            let take = quota.min(queue.len());
            queue.drain(..take).collect()
        };
        if batch.is_empty() {
            return 0;
        }

        let mut reviewed = 0;
        for queued in batch {
            let review = self.review_one(queued).await;
            self.remember(review).await;
            reviewed += 1;
        }
        debug!(reviewed, optimism = ctx.optimism_bias, "review batch complete");
        reviewed
    }

    /// Score, ground, reconcile, journal: the read path end to end.
    pub async fn review_one(&self, queued: QueuedClaim) -> ClaimReview {
        let initial = self
            .evaluator
            .evaluate(&queued.belief_key, &queued.premise, &queued.claim)
            .await;

        let decision = self.executor.decide(&queued.claim, Utc::now()).await;
        let grounding = self.executor.execute(&queued.claim, &decision).await;

        let final_score = match &grounding {
            GroundingOutcome::Completed(result) if result.succeeded() => {
                self.evaluator
                    .evaluate_grounded(&queued.claim, result)
                    .await
            }
            _ => initial.clone(),
        };

        self.journal
            .record(
                "review",
                json!({
                    "claim_id": queued.claim.id,
                    "claim_type": queued.claim.claim_type.as_str(),
                    "belief_key": queued.belief_key,
                    "initial_surprise": initial.value,
                    "final_surprise": final_score.value,
                    "grounded": final_score.grounded,
                }),
            )
            .await;

        ClaimReview {
            claim_id: queued.claim.id,
            claim_type: queued.claim.claim_type,
            belief_key: queued.belief_key,
            initial,
            grounding,
            final_score,
            reviewed_at: Utc::now(),
        }
    }

    async fn remember(&self, review: ClaimReview) {
        let mut recent = self.recent.write().await;
        if recent.len() >= MAX_RECENT {
            recent.pop_front();
        }
        recent.push_back(review);
    }
}

#[async_trait]
impl<C: Classifier + 'static> TickBody for ReviewPipeline<C> {
    async fn run(&self, ctx: TickContext) -> Result<()> {
        self.review_batch(ctx).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakers::{BreakerBank, BreakerSupervisor};
    use crate::executor::{GroundingTool, ToolReply};
    use crate::metrics::Metrics;
    use crate::notifier::NullNotifier;
    use std::path::Path;
    use vigil_common::claim::ClaimType;
    use vigil_common::config::VigilConfig;
    use vigil_common::entailment::EntailmentResult;

    struct FixedClassifier([f64; 3]);

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(&self, _premise: &str, _hypothesis: &str) -> EntailmentResult {
            EntailmentResult::from_probabilities(self.0, false, 3)
        }
    }

    struct EchoTool;

    #[async_trait]
    impl GroundingTool for EchoTool {
        async fn run(&self, claim: &Claim) -> Result<ToolReply> {
            Ok(ToolReply {
                result_text: format!("evidence: {}", claim.text),
                sources: vec!["test://echo".to_string()],
            })
        }
    }

    fn pipeline(dir: &Path, probs: [f64; 3]) -> ReviewPipeline<FixedClassifier> {
        let cfg = VigilConfig::default();
        let metrics = Arc::new(Metrics::new());
        let journal = Arc::new(Journal::new(dir));
        let supervisor = BreakerSupervisor::new(
            BreakerBank::from_config(&cfg),
            Arc::new(NullNotifier),
            journal.clone(),
            metrics.clone(),
        );
        let evaluator =
            SurpriseEvaluator::new(FixedClassifier(probs), supervisor.clone(), metrics.clone());
        let mut executor =
            GroundingExecutor::new(cfg.grounding.clone(), supervisor, journal.clone(), metrics)
                .with_seed(11);
        executor.register_tool("web_search", Arc::new(EchoTool));
        ReviewPipeline::new(evaluator, Arc::new(executor), journal)
    }

    fn queued(belief_key: &str, text: &str, claim_type: ClaimType) -> QueuedClaim {
        QueuedClaim {
            belief_key: belief_key.to_string(),
            premise: "the deploy finished cleanly".to_string(),
            claim: Claim::new(text, claim_type),
        }
    }

    #[tokio::test]
    async fn test_queue_bounded_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), [0.8, 0.15, 0.05]);
        for i in 0..MAX_QUEUED + 2 {
            pipeline
                .submit(queued("k", &format!("claim {i}"), ClaimType::Opinion))
                .await;
        }
        assert_eq!(pipeline.queue_depth().await, MAX_QUEUED);
    }

    #[tokio::test]
    async fn test_reduced_tick_halves_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), [0.8, 0.15, 0.05]);
        for i in 0..20 {
            pipeline
                .submit(queued("k", &format!("claim {i}"), ClaimType::Opinion))
                .await;
        }
        let reviewed = pipeline
            .review_batch(TickContext {
                reduced: true,
                optimism_bias: 0.0,
            })
            .await;
        assert_eq!(reviewed, REVIEWS_PER_TICK / 2);
        assert_eq!(pipeline.queue_depth().await, 20 - REVIEWS_PER_TICK / 2);
    }

    #[tokio::test]
    async fn test_factual_claim_reviewed_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), [0.9, 0.08, 0.02]);
        pipeline
            .submit(queued(
                "deploy.status",
                "the deploy finished cleanly",
                ClaimType::Factual,
            ))
            .await;
        let reviewed = pipeline
            .review_batch(TickContext {
                reduced: false,
                optimism_bias: 0.0,
            })
            .await;
        assert_eq!(reviewed, 1);

        let recent = pipeline.recent_reviews().await;
        assert_eq!(recent.len(), 1);
        let review = &recent[0];
        assert_eq!(review.belief_key, "deploy.status");
        assert!(matches!(review.grounding, GroundingOutcome::Completed(_)));
        assert!(review.final_score.grounded);
        assert!(!review.initial.grounded);
    }

    #[tokio::test]
    async fn test_opinion_claim_stays_ungrounded() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), [0.8, 0.15, 0.05]);
        pipeline
            .submit(queued("taste", "this design is elegant", ClaimType::Opinion))
            .await;
        pipeline
            .review_batch(TickContext {
                reduced: false,
                optimism_bias: 0.0,
            })
            .await;

        let recent = pipeline.recent_reviews().await;
        assert!(matches!(
            recent[0].grounding,
            GroundingOutcome::Skipped { .. }
        ));
        assert!(!recent[0].final_score.grounded);
        assert_eq!(recent[0].initial.value, recent[0].final_score.value);
    }
}
