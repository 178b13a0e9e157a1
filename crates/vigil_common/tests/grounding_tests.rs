//! Tests for grounding.rs: the policy table, seeded sampling, and the
//! budget downgrade path.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use vigil_common::claim::{Claim, ClaimType};
use vigil_common::config::GroundingConfig;
use vigil_common::grounding::{
    check_tool_budget, decide_grounding, BudgetCheck, GroundingVerdict, SkipReason, ToolBudget,
    ToolUsage,
};

fn decide(claim_type: ClaimType, cfg: &GroundingConfig, seed: u64) -> vigil_common::grounding::GroundingDecision {
    let claim = Claim::new("test claim", claim_type);
    let mut rng = StdRng::seed_from_u64(seed);
    decide_grounding(&claim, Utc::now(), cfg, |_| BudgetCheck::Ok, &mut rng)
}

#[test]
fn test_must_ground_types() {
    let cfg = GroundingConfig::default();
    for ct in [
        ClaimType::Factual,
        ClaimType::Numerical,
        ClaimType::Temporal,
        ClaimType::Attribution,
        ClaimType::Scientific,
    ] {
        let decision = decide(ct, &cfg, 1);
        assert_eq!(decision.verdict, GroundingVerdict::MustGround, "{:?}", ct);
        assert!(decision.tool.is_some());
        assert!(decision.requires_tool_call());
    }
}

#[test]
fn test_never_ground_types_skip_without_tool() {
    let cfg = GroundingConfig::default();
    for ct in [ClaimType::Opinion, ClaimType::Hypothetical, ClaimType::Meta] {
        let decision = decide(ct, &cfg, 1);
        assert_eq!(
            decision.verdict,
            GroundingVerdict::NeverGround {
                reason: SkipReason::PolicyNever
            },
            "{:?}",
            ct
        );
        assert!(decision.tool.is_none());
        assert!(!decision.requires_tool_call());
    }
}

#[test]
fn test_never_ground_does_not_consult_budget() {
    let cfg = GroundingConfig::default();
    let claim = Claim::new("I think the interface is ugly", ClaimType::Opinion);
    let mut rng = StdRng::seed_from_u64(1);
    // A budget probe here would be a policy bug.
    let decision = decide_grounding(
        &claim,
        Utc::now(),
        &cfg,
        |_| panic!("budget consulted for a never-ground claim"),
        &mut rng,
    );
    assert!(!decision.requires_tool_call());
}

#[test]
fn test_sampling_is_reproducible_under_a_fixed_seed() {
    let cfg = GroundingConfig::default();
    let run = |seed: u64| -> Vec<bool> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..50)
            .map(|i| {
                let claim = Claim::new(format!("claim {}", i), ClaimType::GeneralKnowledge);
                decide_grounding(&claim, Utc::now(), &cfg, |_| BudgetCheck::Ok, &mut rng)
                    .requires_tool_call()
            })
            .collect()
    };
    assert_eq!(run(42), run(42));
}

#[test]
fn test_sampling_rate_extremes() {
    let mut cfg = GroundingConfig::default();
    cfg.sample_rate_general_knowledge = 1.0;
    for seed in 0..20 {
        let d = decide(ClaimType::GeneralKnowledge, &cfg, seed);
        assert_eq!(d.verdict, GroundingVerdict::SampledGround { chosen: true });
    }
    cfg.sample_rate_general_knowledge = 0.0;
    for seed in 0..20 {
        let d = decide(ClaimType::GeneralKnowledge, &cfg, seed);
        assert_eq!(d.verdict, GroundingVerdict::SampledGround { chosen: false });
        assert!(d.tool.is_none());
    }
}

#[test]
fn test_sampled_rates_roughly_match_over_many_draws() {
    let cfg = GroundingConfig::default();
    let mut rng = StdRng::seed_from_u64(7);
    let mut chosen = 0u32;
    for i in 0..1_000 {
        let claim = Claim::new(format!("claim {}", i), ClaimType::GeneralKnowledge);
        if decide_grounding(&claim, Utc::now(), &cfg, |_| BudgetCheck::Ok, &mut rng)
            .requires_tool_call()
        {
            chosen += 1;
        }
    }
    // 20% rate; a seeded run lands well inside this band.
    assert!((120..=280).contains(&chosen), "chose {} of 1000", chosen);
}

#[test]
fn test_budget_exhaustion_downgrades_and_keeps_tool() {
    let cfg = GroundingConfig::default();
    let claim = Claim::new("the treaty was ratified in 1998", ClaimType::Factual);
    let mut rng = StdRng::seed_from_u64(1);
    let decision = decide_grounding(
        &claim,
        Utc::now(),
        &cfg,
        |_| BudgetCheck::DailyCallsExhausted { used: 200, cap: 200 },
        &mut rng,
    );
    assert_eq!(
        decision.verdict,
        GroundingVerdict::NeverGround {
            reason: SkipReason::BudgetExhausted
        }
    );
    assert!(decision.downgraded_by_budget());
    // The tool id stays so the journal can say which budget was hit.
    assert_eq!(decision.tool.as_deref(), Some("web_search"));
    assert!(!decision.requires_tool_call());
}

#[test]
fn test_decision_carries_daily_period_key() {
    let cfg = GroundingConfig::default();
    let now = Utc::now();
    let claim = Claim::new("x", ClaimType::Factual);
    let mut rng = StdRng::seed_from_u64(1);
    let decision = decide_grounding(&claim, now, &cfg, |_| BudgetCheck::Ok, &mut rng);
    assert_eq!(
        decision.period_key,
        vigil_common::grounding::period_key_daily(now)
    );
}

#[test]
fn test_budget_checks_in_priority_order() {
    let limits = ToolBudget {
        daily_calls: 10,
        monthly_calls: 100,
        daily_dollars: 1.0,
        monthly_dollars: 10.0,
        cost_per_call: 0.10,
    };

    let fresh = ToolUsage::default();
    assert_eq!(check_tool_budget(&limits, &fresh, &fresh), BudgetCheck::Ok);

    let daily_spent = ToolUsage {
        calls: 10,
        dollars: 1.0,
    };
    assert!(matches!(
        check_tool_budget(&limits, &daily_spent, &fresh),
        BudgetCheck::DailyCallsExhausted { used: 10, cap: 10 }
    ));

    let monthly_spent = ToolUsage {
        calls: 100,
        dollars: 10.0,
    };
    assert!(matches!(
        check_tool_budget(&limits, &fresh, &monthly_spent),
        BudgetCheck::MonthlyCallsExhausted { .. }
    ));

    // One more 10-cent call would break the daily dollar cap.
    let dollars_edge = ToolUsage {
        calls: 5,
        dollars: 0.95,
    };
    assert!(matches!(
        check_tool_budget(&limits, &dollars_edge, &dollars_edge),
        BudgetCheck::DailyDollarsExhausted { .. }
    ));
}
