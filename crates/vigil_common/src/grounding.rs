//! Grounding policy and budget math.
//!
//! Decides whether a claim must be verified against an external tool before
//! being trusted. The policy table is fixed per deployment (loaded from
//! config once at startup); sampling is driven by a caller-supplied RNG so
//! tests can replay decisions with a fixed seed. All functions here are
//! pure; the daemon-side executor owns the mutable counters.

use crate::claim::{Claim, ClaimType};
use crate::config::GroundingConfig;
use chrono::{DateTime, Datelike, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

// === Period keys ===

/// Daily cost bucket, e.g. "2026-08-23".
pub fn period_key_daily(now: DateTime<Utc>) -> String {
    format!("{:04}-{:02}-{:02}", now.year(), now.month(), now.day())
}

/// Monthly cost bucket, e.g. "2026-08".
pub fn period_key_monthly(now: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", now.year(), now.month())
}

/// Monthly bucket derived from a daily key (its "YYYY-MM" prefix).
pub fn monthly_key_of(daily_key: &str) -> &str {
    daily_key.get(..7).unwrap_or(daily_key)
}

// === Budget checking ===

/// Per-tool limits for one billing period pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolBudget {
    pub daily_calls: u32,
    pub monthly_calls: u32,
    pub daily_dollars: f64,
    pub monthly_dollars: f64,
    /// Flat per-call cost estimate used for dollar accounting.
    pub cost_per_call: f64,
}

/// Usage counters for one (tool, period) bucket.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ToolUsage {
    pub calls: u32,
    pub dollars: f64,
}

impl ToolUsage {
    /// Record one attempted call. Charged on attempt, not on success, so a
    /// crash mid-call still counts against the budget.
    pub fn charge(&mut self, cost_per_call: f64) {
        self.calls += 1;
        self.dollars += cost_per_call;
    }
}

/// Outcome of a budget check, with enough detail to journal the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BudgetCheck {
    Ok,
    DailyCallsExhausted { used: u32, cap: u32 },
    MonthlyCallsExhausted { used: u32, cap: u32 },
    DailyDollarsExhausted { spent: f64, cap: f64 },
    MonthlyDollarsExhausted { spent: f64, cap: f64 },
}

impl BudgetCheck {
    pub fn is_exhausted(&self) -> bool {
        !matches!(self, BudgetCheck::Ok)
    }
}

/// Would one more call fit inside every cap? Call caps are checked before
/// dollar caps so the cheaper-to-explain reason wins.
pub fn check_tool_budget(
    limits: &ToolBudget,
    daily: &ToolUsage,
    monthly: &ToolUsage,
) -> BudgetCheck {
    if daily.calls >= limits.daily_calls {
        return BudgetCheck::DailyCallsExhausted {
            used: daily.calls,
            cap: limits.daily_calls,
        };
    }
    if monthly.calls >= limits.monthly_calls {
        return BudgetCheck::MonthlyCallsExhausted {
            used: monthly.calls,
            cap: limits.monthly_calls,
        };
    }
    if daily.dollars + limits.cost_per_call > limits.daily_dollars {
        return BudgetCheck::DailyDollarsExhausted {
            spent: daily.dollars,
            cap: limits.daily_dollars,
        };
    }
    if monthly.dollars + limits.cost_per_call > limits.monthly_dollars {
        return BudgetCheck::MonthlyDollarsExhausted {
            spent: monthly.dollars,
            cap: limits.monthly_dollars,
        };
    }
    BudgetCheck::Ok
}

// === Policy table ===

/// What the policy table says about a claim type, before sampling and
/// budget are applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GroundingRequirement {
    Always,
    /// Spot-check at this probability.
    Sampled(f64),
    Never,
}

/// The fixed classification table. Rates come from config so deployments
/// can tune them; the shape of the table does not change per call.
pub fn requirement_for(claim_type: ClaimType, cfg: &GroundingConfig) -> GroundingRequirement {
    match claim_type {
        ClaimType::Factual
        | ClaimType::Numerical
        | ClaimType::Temporal
        | ClaimType::Attribution
        | ClaimType::Scientific => GroundingRequirement::Always,
        ClaimType::GeneralKnowledge => {
            GroundingRequirement::Sampled(cfg.sample_rate_general_knowledge)
        }
        ClaimType::ReasoningChain => GroundingRequirement::Sampled(cfg.sample_rate_reasoning_chain),
        ClaimType::CreativeContent => {
            GroundingRequirement::Sampled(cfg.sample_rate_creative_content)
        }
        ClaimType::Opinion | ClaimType::Hypothetical | ClaimType::Meta => {
            GroundingRequirement::Never
        }
    }
}

/// Default tool routing when config has no override for the claim type.
/// Quantitative claims verify by computation; the rest by lookup.
pub fn default_tool_for(claim_type: ClaimType) -> &'static str {
    match claim_type {
        ClaimType::Numerical | ClaimType::Scientific => "code_execution",
        _ => "web_search",
    }
}

// === Decisions ===

/// Why a grounding attempt was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The policy table never grounds this claim type.
    PolicyNever,
    /// Eligible for spot-checking but the draw said no.
    SampledOut,
    /// Downgraded because the tool's period budget is spent.
    BudgetExhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroundingVerdict {
    MustGround,
    SampledGround { chosen: bool },
    NeverGround { reason: SkipReason },
}

/// The policy's answer for one claim: verdict, selected tool (None when no
/// call will happen), and the daily cost bucket it draws from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingDecision {
    pub verdict: GroundingVerdict,
    pub tool: Option<String>,
    pub period_key: String,
}

impl GroundingDecision {
    /// Will this decision reach the tool layer?
    pub fn requires_tool_call(&self) -> bool {
        matches!(
            self.verdict,
            GroundingVerdict::MustGround | GroundingVerdict::SampledGround { chosen: true }
        )
    }

    /// True when the decision was forced down from a groundable verdict
    /// because the budget ran out. The caller must forward exactly one
    /// budget_exhausted signal to the cost breaker when this is set.
    pub fn downgraded_by_budget(&self) -> bool {
        matches!(
            self.verdict,
            GroundingVerdict::NeverGround {
                reason: SkipReason::BudgetExhausted
            }
        )
    }
}

/// Decide grounding for one claim.
///
/// `budget_check` receives the selected tool id and answers for the current
/// periods; it is only consulted for verdicts that would reach the tool.
/// A budget-exhausted answer downgrades the verdict to NeverGround; the
/// tool id stays in the decision so the journal shows which budget was hit.
pub fn decide_grounding<R: Rng + ?Sized>(
    claim: &Claim,
    now: DateTime<Utc>,
    cfg: &GroundingConfig,
    budget_check: impl FnOnce(&str) -> BudgetCheck,
    rng: &mut R,
) -> GroundingDecision {
    let period_key = period_key_daily(now);
    let requirement = requirement_for(claim.claim_type, cfg);

    let (verdict, wants_tool) = match requirement {
        GroundingRequirement::Always => (GroundingVerdict::MustGround, true),
        GroundingRequirement::Sampled(rate) => {
            let chosen = rng.gen::<f64>() < rate;
            (GroundingVerdict::SampledGround { chosen }, chosen)
        }
        GroundingRequirement::Never => (
            GroundingVerdict::NeverGround {
                reason: SkipReason::PolicyNever,
            },
            false,
        ),
    };

    if !wants_tool {
        return GroundingDecision {
            verdict,
            tool: None,
            period_key,
        };
    }

    let tool = cfg.tool_for(claim.claim_type);
    if budget_check(&tool).is_exhausted() {
        return GroundingDecision {
            verdict: GroundingVerdict::NeverGround {
                reason: SkipReason::BudgetExhausted,
            },
            tool: Some(tool),
            period_key,
        };
    }

    GroundingDecision {
        verdict,
        tool: Some(tool),
        period_key,
    }
}

// === Execution results ===

/// Result of one tool invocation. `error: Some(..)` is a completed-with-
/// failure record, not an exception; sources are empty in that case and
/// the caller picks fail-open or fail-closed handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingResult {
    pub tool: String,
    pub result_text: String,
    pub sources: Vec<String>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl GroundingResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// What the executor returned for one decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroundingOutcome {
    Skipped { reason: SkipReason },
    Completed(GroundingResult),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn golden_period_keys() {
        let t = DateTime::parse_from_rfc3339("2026-08-23T14:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(period_key_daily(t), "2026-08-23");
        assert_eq!(period_key_monthly(t), "2026-08");
        assert_eq!(monthly_key_of("2026-08-23"), "2026-08");
    }

    #[test]
    fn test_charge_counts_attempts() {
        let mut usage = ToolUsage::default();
        usage.charge(0.01);
        usage.charge(0.01);
        assert_eq!(usage.calls, 2);
        assert!((usage.dollars - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_call_cap_reported_before_dollar_cap() {
        let limits = ToolBudget {
            daily_calls: 1,
            monthly_calls: 1,
            daily_dollars: 0.0,
            monthly_dollars: 0.0,
            cost_per_call: 1.0,
        };
        let used = ToolUsage {
            calls: 1,
            dollars: 5.0,
        };
        let check = check_tool_budget(&limits, &used, &used);
        assert!(matches!(check, BudgetCheck::DailyCallsExhausted { .. }));
    }
}
