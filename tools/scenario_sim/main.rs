//! Scenario Simulator - deterministic breaker walkthroughs against the
//! real circuit FSM.
//!
//! Usage:
//!   scenario_sim --scenario healthy
//!   scenario_sim --scenario flaky-tool
//!   scenario_sim --scenario contradiction-loop --ticks 40
//!   scenario_sim --scenario budget-exhausted
//!
//! Each scenario feeds a scripted signal sequence into a default-config
//! breaker bank on a synthetic clock and records every transition.
//! Outputs machine-readable JSON reports to ./artifacts/simulations/

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use vigil_common::breaker::{BreakerEvent, CircuitState, CLASSIFIER_HEALTH, TOOL_HEALTH};
use vigil_common::config::VigilConfig;
use vigild::breakers::BreakerBank;

// ============================================================================
// REPORT TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TransitionRecord {
    at_secs: u64,
    breaker: String,
    transition: String,
    detail: String,
}

impl TransitionRecord {
    fn from_event(at_secs: u64, event: BreakerEvent) -> Self {
        match event {
            BreakerEvent::Opened {
                name,
                level,
                reason,
            } => Self {
                at_secs,
                breaker: name,
                transition: "opened".to_string(),
                detail: format!("level {}: {}", level, reason),
            },
            BreakerEvent::HalfOpened { name } => Self {
                at_secs,
                breaker: name,
                transition: "half_opened".to_string(),
                detail: "cooldown elapsed, probing".to_string(),
            },
            BreakerEvent::Closed { name, reason } => Self {
                at_secs,
                breaker: name,
                transition: "closed".to_string(),
                detail: reason,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SimulationReport {
    scenario: String,
    ticks: usize,
    step_secs: u64,
    transitions: Vec<TransitionRecord>,
    trips: usize,
    final_states: BTreeMap<String, String>,
    final_intervention_level: Option<String>,
    recovered: bool,
    success: bool,
    notes: String,
}

// ============================================================================
// SCENARIO LOGIC
// ============================================================================

fn collect(transitions: &mut Vec<TransitionRecord>, at_secs: u64, events: Vec<BreakerEvent>) {
    for event in events {
        transitions.push(TransitionRecord::from_event(at_secs, event));
    }
}

fn state_of(bank: &BreakerBank, name: &str, now: Instant) -> CircuitState {
    bank.snapshots(now)
        .into_iter()
        .find(|s| s.name == name)
        .map(|s| s.state)
        .unwrap_or(CircuitState::Closed)
}

/// Assemble the report. A scenario succeeds when exactly the expected
/// breakers tripped (in order), everything ended Closed, and no
/// intervention level remains in force.
fn finish_report(
    scenario: &str,
    ticks: usize,
    step_secs: u64,
    bank: &BreakerBank,
    end: Instant,
    transitions: Vec<TransitionRecord>,
    expected_trips: &[&str],
    notes: String,
) -> SimulationReport {
    let opened: Vec<&str> = transitions
        .iter()
        .filter(|t| t.transition == "opened")
        .map(|t| t.breaker.as_str())
        .collect();
    let trips = opened.len();

    let final_states: BTreeMap<String, String> = bank
        .snapshots(end)
        .into_iter()
        .map(|s| (s.name, s.state.to_string()))
        .collect();
    let recovered = final_states.values().all(|s| s == "closed");
    let final_intervention_level = bank.aggregate_intervention_level().map(|l| l.to_string());

    let success = opened == expected_trips && recovered && final_intervention_level.is_none();

    SimulationReport {
        scenario: scenario.to_string(),
        ticks,
        step_secs,
        transitions,
        trips,
        final_states,
        final_intervention_level,
        recovered,
        success,
        notes,
    }
}

/// Every cognitive tick reviews cleanly: classifier healthy, tools
/// healthy, spend well under budget. Nothing should move.
fn simulate_healthy(ticks: usize) -> SimulationReport {
    let step_secs = 300;
    let cfg = VigilConfig::default();
    let mut bank = BreakerBank::from_config(&cfg);
    let base = Instant::now();
    let mut transitions = Vec::new();
    let mut period_spend = 0.0_f64;
    let mut end = base;

    for i in 0..ticks {
        let t = i as u64 * step_secs;
        let now = base + Duration::from_secs(t);
        end = now;

        collect(&mut transitions, t, bank.advance_all(now));
        collect(
            &mut transitions,
            t,
            bank.record_outcome(CLASSIFIER_HEALTH, true, now).unwrap(),
        );
        collect(
            &mut transitions,
            t,
            bank.record_outcome(TOOL_HEALTH, true, now).unwrap(),
        );
        period_spend += 0.25;
        collect(
            &mut transitions,
            t,
            bank.observe_cost_ratio(period_spend / cfg.scheduler.period_budget_dollars, now),
        );
    }

    let notes = format!(
        "{} cognitive ticks with a healthy classifier, healthy tools, and spend \
         peaking at {:.0}% of the period budget. No breaker moved.",
        ticks,
        100.0 * period_spend / cfg.scheduler.period_budget_dollars
    );
    finish_report("healthy", ticks, step_secs, &bank, end, transitions, &[], notes)
}

/// The web_search sidecar goes down. Five straight call failures inside
/// the 60s window open tool_health at pause level; grounding stays
/// paused through the cooldown, then three clean probes close it.
fn simulate_flaky_tool(ticks: usize) -> SimulationReport {
    let step_secs = 10;
    let cfg = VigilConfig::default();
    let mut bank = BreakerBank::from_config(&cfg);
    let base = Instant::now();
    let mut transitions = Vec::new();
    let mut failures_sent = 0_usize;
    let mut end = base;

    for i in 0..ticks {
        let t = i as u64 * step_secs;
        let now = base + Duration::from_secs(t);
        end = now;

        collect(&mut transitions, t, bank.advance_all(now));
        match state_of(&bank, TOOL_HEALTH, now) {
            CircuitState::Closed if failures_sent < 5 => {
                // Sidecar down: every grounding call fails.
                failures_sent += 1;
                collect(
                    &mut transitions,
                    t,
                    bank.record_outcome(TOOL_HEALTH, false, now).unwrap(),
                );
            }
            CircuitState::Closed | CircuitState::HalfOpen => {
                // Sidecar is back; probes and later calls succeed.
                collect(
                    &mut transitions,
                    t,
                    bank.record_outcome(TOOL_HEALTH, true, now).unwrap(),
                );
            }
            CircuitState::Open => {
                // Paused: no grounding calls while open.
            }
        }
    }

    let notes = format!(
        "web_search failed {} calls in a row; tool_health opened on the fifth, \
         grounding paused for the {}s cooldown, then three clean probes closed it.",
        failures_sent,
        cfg.breaker_spec(TOOL_HEALTH).map_or(0, |s| s.cooldown_secs)
    );
    finish_report(
        "flaky-tool",
        ticks,
        step_secs,
        &bank,
        end,
        transitions,
        &[TOOL_HEALTH],
        notes,
    )
}

/// One belief flip-flops every review. Three contradictions inside the
/// ten-minute window open contradiction_loop at reset level; once the
/// belief stabilizes, consistent re-reviews act as probes and close it.
fn simulate_contradiction_loop(ticks: usize) -> SimulationReport {
    let step_secs = 60;
    let cfg = VigilConfig::default();
    let mut bank = BreakerBank::from_config(&cfg);
    let base = Instant::now();
    let mut transitions = Vec::new();
    let mut contradictions_sent = 0_usize;
    let mut end = base;

    for i in 0..ticks {
        let t = i as u64 * step_secs;
        let now = base + Duration::from_secs(t);
        end = now;

        collect(&mut transitions, t, bank.advance_all(now));
        match state_of(&bank, "contradiction_loop", now) {
            CircuitState::Closed if contradictions_sent < 3 => {
                contradictions_sent += 1;
                collect(
                    &mut transitions,
                    t,
                    bank.record_contradiction("user.timezone", now),
                );
            }
            CircuitState::Closed | CircuitState::HalfOpen => {
                // Belief stabilized: consistent reviews count as probes.
                collect(
                    &mut transitions,
                    t,
                    bank.record_outcome("contradiction_loop", true, now).unwrap(),
                );
            }
            CircuitState::Open => {}
        }
    }

    let notes = format!(
        "belief 'user.timezone' was contradicted {} times inside the window; \
         contradiction_loop opened at reset level, cooled down, and closed \
         after three consistent re-reviews.",
        contradictions_sent
    );
    finish_report(
        "contradiction-loop",
        ticks,
        step_secs,
        &bank,
        end,
        transitions,
        &["contradiction_loop"],
        notes,
    )
}

/// A runaway grounded-review batch burns $12 per tick until the period
/// spend crosses the budget and cost_guard opens. The cooldown spans
/// the period boundary; fresh-period ratios probe it back closed.
fn simulate_budget_exhausted(ticks: usize) -> SimulationReport {
    let step_secs = 300;
    let cfg = VigilConfig::default();
    let budget = cfg.scheduler.period_budget_dollars;
    let mut bank = BreakerBank::from_config(&cfg);
    let base = Instant::now();
    let mut transitions = Vec::new();
    let mut period_spend = 0.0_f64;
    let mut peak_ratio = 0.0_f64;
    let mut runaway_over = false;
    let mut end = base;

    for i in 0..ticks {
        let t = i as u64 * step_secs;
        let now = base + Duration::from_secs(t);
        end = now;

        collect(&mut transitions, t, bank.advance_all(now));
        match state_of(&bank, "cost_guard", now) {
            CircuitState::Closed if !runaway_over => {
                // Runaway batch: $12 of tool calls per tick.
                period_spend += 12.0;
                let ratio = period_spend / budget;
                peak_ratio = peak_ratio.max(ratio);
                collect(&mut transitions, t, bank.observe_cost_ratio(ratio, now));
                if ratio >= 1.0 {
                    // Exhausted: the next grounding decision downgrades.
                    collect(&mut transitions, t, bank.record_budget_exhausted(now));
                }
            }
            CircuitState::Closed => {
                // Back to normal sampling in the fresh period.
                period_spend += 0.5;
                collect(
                    &mut transitions,
                    t,
                    bank.observe_cost_ratio(period_spend / budget, now),
                );
            }
            CircuitState::HalfOpen => {
                // The cooldown spanned the period boundary; spend reset.
                period_spend = 0.5;
                collect(
                    &mut transitions,
                    t,
                    bank.observe_cost_ratio(period_spend / budget, now),
                );
            }
            CircuitState::Open => {
                runaway_over = true;
            }
        }
    }

    let notes = format!(
        "a runaway batch pushed period spend to {:.0}% of the ${:.0} budget; \
         cost_guard opened at pause level and closed once fresh-period ratios \
         passed probation.",
        100.0 * peak_ratio,
        budget
    );
    finish_report(
        "budget-exhausted",
        ticks,
        step_secs,
        &bank,
        end,
        transitions,
        &["cost_guard"],
        notes,
    )
}

// ============================================================================
// MAIN
// ============================================================================

fn main() {
    let args: Vec<String> = std::env::args().collect();

    // Parse arguments
    let mut ticks = 30;
    let mut scenario = "healthy".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--ticks" => {
                if i + 1 < args.len() {
                    ticks = args[i + 1].parse().unwrap_or(30);
                    i += 2;
                } else {
                    eprintln!("Error: --ticks requires a value");
                    std::process::exit(1);
                }
            }
            "--scenario" => {
                if i + 1 < args.len() {
                    scenario = args[i + 1].clone();
                    i += 2;
                } else {
                    eprintln!("Error: --scenario requires a value");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                println!("Scenario Simulator - breaker walkthroughs on a synthetic clock");
                println!();
                println!("Usage:");
                println!("  scenario_sim --scenario <scenario> [--ticks <N>]");
                println!();
                println!("Options:");
                println!("  --ticks <N>           Simulated ticks (15-96, default: 30)");
                println!("  --scenario <scenario> Scenario: healthy, flaky-tool,");
                println!("                        contradiction-loop, budget-exhausted");
                println!();
                println!("Examples:");
                println!("  scenario_sim --scenario healthy");
                println!("  scenario_sim --scenario flaky-tool");
                println!("  scenario_sim --scenario contradiction-loop --ticks 40");
                println!("  scenario_sim --scenario budget-exhausted");
                std::process::exit(0);
            }
            _ => {
                eprintln!("Error: Unknown argument: {}", args[i]);
                eprintln!("Run with --help for usage");
                std::process::exit(1);
            }
        }
    }

    // Every scenario needs enough ticks to trip and fully recover.
    if !(15..=96).contains(&ticks) {
        eprintln!("Error: ticks must be between 15 and 96");
        std::process::exit(1);
    }

    // Run simulation
    let report = match scenario.as_str() {
        "healthy" => simulate_healthy(ticks),
        "flaky-tool" => simulate_flaky_tool(ticks),
        "contradiction-loop" => simulate_contradiction_loop(ticks),
        "budget-exhausted" => simulate_budget_exhausted(ticks),
        _ => {
            eprintln!("Error: Unknown scenario: {}", scenario);
            eprintln!(
                "Valid scenarios: healthy, flaky-tool, contradiction-loop, budget-exhausted"
            );
            std::process::exit(1);
        }
    };

    // Create output directory
    let output_dir = PathBuf::from("./artifacts/simulations");
    fs::create_dir_all(&output_dir).unwrap();

    // Write report
    let output_file = output_dir.join(format!("{}.json", scenario));
    let json = serde_json::to_string_pretty(&report).unwrap();
    fs::write(&output_file, json).unwrap();

    // Print summary
    println!("\n=== Vigil Scenario: {} ===\n", scenario);
    println!("Ticks:                {} x {}s", report.ticks, report.step_secs);
    println!("Transitions:          {}", report.transitions.len());
    println!("Trips:                {}", report.trips);
    println!(
        "Final level:          {}",
        report.final_intervention_level.as_deref().unwrap_or("none")
    );
    println!("Recovered:            {}", report.recovered);

    if !report.transitions.is_empty() {
        println!();
        for t in &report.transitions {
            println!(
                "  [{:>6}s] {:<20} {:<12} {}",
                t.at_secs, t.breaker, t.transition, t.detail
            );
        }
    }

    println!("\nNotes: {}", report.notes);
    println!("\nReport saved to: {}\n", output_file.display());

    if report.success {
        std::process::exit(0);
    } else {
        std::process::exit(1);
    }
}
