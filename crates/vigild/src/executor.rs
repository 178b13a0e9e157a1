//! Grounding execution: tool dispatch under budgets and timeouts.
//!
//! The executor owns the mutable side of grounding: usage counters,
//! the sampling RNG, and the tool registry. Policy math stays in
//! `vigil_common::grounding`; this module feeds it views of the
//! counters and acts on its decisions.
//!
//! Ordering invariant: usage is charged BEFORE dispatch, so a call
//! that hangs or crashes mid-flight still counts against the period
//! budget.

use crate::breakers::BreakerSupervisor;
use crate::journal::Journal;
use crate::metrics::Metrics;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use vigil_common::breaker::TOOL_HEALTH;
use vigil_common::claim::Claim;
use vigil_common::config::GroundingConfig;
use vigil_common::error::VigilError;
use vigil_common::grounding::{
    check_tool_budget, decide_grounding, monthly_key_of, period_key_daily, period_key_monthly,
    BudgetCheck, GroundingDecision, GroundingOutcome, GroundingResult, GroundingVerdict,
    SkipReason, ToolUsage,
};

/// What a tool hands back on success.
#[derive(Debug, Clone)]
pub struct ToolReply {
    pub result_text: String,
    pub sources: Vec<String>,
}

/// One external verification backend.
#[async_trait]
pub trait GroundingTool: Send + Sync {
    async fn run(&self, claim: &Claim) -> Result<ToolReply>;
}

pub struct GroundingExecutor {
    cfg: GroundingConfig,
    tools: HashMap<String, Arc<dyn GroundingTool>>,
    /// Usage counters keyed by (tool, period key). Daily and monthly
    /// buckets live side by side; the key shape tells them apart.
    usage: Mutex<HashMap<(String, String), ToolUsage>>,
    rng: Mutex<StdRng>,
    supervisor: BreakerSupervisor,
    journal: Arc<Journal>,
    metrics: Arc<Metrics>,
}

impl GroundingExecutor {
    pub fn new(
        cfg: GroundingConfig,
        supervisor: BreakerSupervisor,
        journal: Arc<Journal>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            cfg,
            tools: HashMap::new(),
            usage: Mutex::new(HashMap::new()),
            rng: Mutex::new(StdRng::from_entropy()),
            supervisor,
            journal,
            metrics,
        }
    }

    /// Fix the sampling RNG. Deterministic spot-check draws for tests
    /// and simulations.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn register_tool(&mut self, name: impl Into<String>, tool: Arc<dyn GroundingTool>) {
        self.tools.insert(name.into(), tool);
    }

    /// Run the policy for one claim against live usage counters.
    ///
    /// A budget downgrade emits exactly one signal to the cost breaker
    /// here, at decision time; the execute path sees only the already-
    /// downgraded verdict and stays silent.
    pub async fn decide(&self, claim: &Claim, now: DateTime<Utc>) -> GroundingDecision {
        let usage_view = self.usage.lock().await.clone();
        let decision = {
            let mut rng = self.rng.lock().await;
            decide_grounding(
                claim,
                now,
                &self.cfg,
                |tool| self.check_against(&usage_view, tool, now),
                &mut *rng,
            )
        };

        if decision.downgraded_by_budget() {
            if let Some(tool) = &decision.tool {
                warn!(tool = %tool, claim = %claim.id, "grounding budget exhausted; decision downgraded");
            }
            self.metrics.budget_exhaustions_total.inc();
            self.supervisor.record_budget_exhausted().await;
        }
        decision
    }

    fn check_against(
        &self,
        usage: &HashMap<(String, String), ToolUsage>,
        tool: &str,
        now: DateTime<Utc>,
    ) -> BudgetCheck {
        let daily = usage
            .get(&(tool.to_string(), period_key_daily(now)))
            .copied()
            .unwrap_or_default();
        let monthly = usage
            .get(&(tool.to_string(), period_key_monthly(now)))
            .copied()
            .unwrap_or_default();
        check_tool_budget(&self.cfg.budget_for(tool), &daily, &monthly)
    }

    /// Carry out one decision. Non-calling verdicts return `Skipped`;
    /// everything that reaches a tool returns `Completed`, with failure
    /// recorded inside the result rather than thrown.
    pub async fn execute(&self, claim: &Claim, decision: &GroundingDecision) -> GroundingOutcome {
        if !decision.requires_tool_call() {
            let reason = match &decision.verdict {
                GroundingVerdict::NeverGround { reason } => *reason,
                _ => SkipReason::SampledOut,
            };
            debug!(claim = %claim.id, ?reason, "grounding skipped");
            return GroundingOutcome::Skipped { reason };
        }

        let Some(tool_name) = decision.tool.as_deref() else {
            // A calling verdict always carries a tool; reaching this
            // line means the decision logic is broken.
            warn!(claim = %claim.id, "calling verdict without a tool");
            self.supervisor.record_sanity_signal().await;
            return GroundingOutcome::Completed(GroundingResult {
                tool: String::new(),
                result_text: String::new(),
                sources: Vec::new(),
                latency_ms: 0,
                error: Some("no tool selected for a calling verdict".to_string()),
            });
        };

        self.charge(tool_name, &decision.period_key).await;

        let started = Instant::now();
        let result = match self.tools.get(tool_name) {
            None => {
                warn!(tool = tool_name, "tool not registered");
                GroundingResult {
                    tool: tool_name.to_string(),
                    result_text: String::new(),
                    sources: Vec::new(),
                    latency_ms: 0,
                    error: Some(format!("tool '{}' not registered", tool_name)),
                }
            }
            Some(tool) => {
                let limit = Duration::from_secs(self.cfg.timeout_for(tool_name));
                match timeout(limit, tool.run(claim)).await {
                    Ok(Ok(reply)) => GroundingResult {
                        tool: tool_name.to_string(),
                        result_text: reply.result_text,
                        sources: reply.sources,
                        latency_ms: started.elapsed().as_millis() as u64,
                        error: None,
                    },
                    Ok(Err(e)) => GroundingResult {
                        tool: tool_name.to_string(),
                        result_text: String::new(),
                        sources: Vec::new(),
                        latency_ms: started.elapsed().as_millis() as u64,
                        error: Some(e.to_string()),
                    },
                    Err(_) => GroundingResult {
                        tool: tool_name.to_string(),
                        result_text: String::new(),
                        sources: Vec::new(),
                        latency_ms: limit.as_millis() as u64,
                        error: Some(format!("timed out after {}s", limit.as_secs())),
                    },
                }
            }
        };

        let outcome_label = if result.succeeded() {
            "completed"
        } else if result
            .error
            .as_deref()
            .is_some_and(|e| e.starts_with("timed out"))
        {
            "timeout"
        } else {
            "failed"
        };
        self.metrics.record_grounding(tool_name, outcome_label);
        self.supervisor
            .record_outcome(TOOL_HEALTH, result.succeeded())
            .await;
        self.journal
            .record(
                "grounding",
                json!({
                    "tool": tool_name,
                    "claim_type": claim.claim_type.as_str(),
                    "outcome": outcome_label,
                    "latency_ms": result.latency_ms,
                }),
            )
            .await;

        if result.succeeded() {
            info!(tool = tool_name, latency_ms = result.latency_ms, "grounding completed");
        } else {
            warn!(tool = tool_name, error = ?result.error, "grounding failed");
        }
        GroundingOutcome::Completed(result)
    }

    /// Read path: verify when possible, proceed without evidence when
    /// not. Returns the evidence only when the tool genuinely answered.
    pub async fn ground_for_read(
        &self,
        claim: &Claim,
        now: DateTime<Utc>,
    ) -> Option<GroundingResult> {
        let decision = self.decide(claim, now).await;
        match self.execute(claim, &decision).await {
            GroundingOutcome::Completed(r) if r.succeeded() => Some(r),
            GroundingOutcome::Completed(r) => {
                info!(tool = %r.tool, "read-path grounding failed; proceeding unverified");
                None
            }
            GroundingOutcome::Skipped { .. } => None,
        }
    }

    /// Write path: a claim the policy wanted verified must actually be
    /// verified, or the action is blocked. Policy-level skips are not
    /// blocks; a claim the table never grounds may proceed.
    pub async fn ground_for_write(
        &self,
        claim: &Claim,
        now: DateTime<Utc>,
    ) -> Result<Option<GroundingResult>, VigilError> {
        let decision = self.decide(claim, now).await;
        match self.execute(claim, &decision).await {
            GroundingOutcome::Completed(r) if r.succeeded() => Ok(Some(r)),
            GroundingOutcome::Completed(r) => Err(VigilError::GroundingUnavailable {
                tool: r.tool,
                reason: r.error.unwrap_or_else(|| "unknown failure".to_string()),
            }),
            GroundingOutcome::Skipped {
                reason: SkipReason::BudgetExhausted,
            } => Err(VigilError::GroundingUnavailable {
                tool: decision.tool.unwrap_or_default(),
                reason: "budget exhausted".to_string(),
            }),
            GroundingOutcome::Skipped { .. } => Ok(None),
        }
    }

    /// Zero the counters for one tool, or for everything. Operator
    /// surface, via the reset-budget RPC.
    pub async fn reset_usage(&self, tool: Option<&str>) {
        let mut usage = self.usage.lock().await;
        match tool {
            Some(name) => usage.retain(|(t, _), _| t != name),
            None => usage.clear(),
        }
    }

    /// Total dollars charged across all tools for the month containing
    /// `now`. Numerator of the scheduler's cost ratio.
    pub async fn monthly_spend_dollars(&self, now: DateTime<Utc>) -> f64 {
        let monthly_key = period_key_monthly(now);
        let usage = self.usage.lock().await;
        usage
            .iter()
            .filter(|((_, period), _)| period == &monthly_key)
            .map(|(_, u)| u.dollars)
            .sum()
    }

    async fn charge(&self, tool: &str, daily_key: &str) {
        let cost = self.cfg.budget_for(tool).cost_per_call;
        let monthly_key = monthly_key_of(daily_key).to_string();

        let (daily_dollars, monthly_dollars) = {
            let mut usage = self.usage.lock().await;
            let daily = usage
                .entry((tool.to_string(), daily_key.to_string()))
                .or_default();
            daily.charge(cost);
            let d = daily.dollars;
            let monthly = usage.entry((tool.to_string(), monthly_key)).or_default();
            monthly.charge(cost);
            (d, monthly.dollars)
        };

        self.metrics.set_spend(tool, "daily", daily_dollars);
        self.metrics.set_spend(tool, "monthly", monthly_dollars);
    }
}
