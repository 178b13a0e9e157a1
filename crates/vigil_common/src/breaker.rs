//! Shared circuit-breaker vocabulary.
//!
//! The state machine itself lives in the daemon; this module holds the
//! types both sides of the control socket need: states, intervention
//! levels, trigger predicate specs, snapshots, and transition events.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the one breaker that never auto-recovers. Reserved in every
/// bank; closable only by operator acknowledgment.
pub const MASTER_SANITY: &str = "master_sanity";

/// Stock breaker fed by classifier call outcomes.
pub const CLASSIFIER_HEALTH: &str = "classifier_health";

/// Stock breaker fed by grounding tool call outcomes.
pub const TOOL_HEALTH: &str = "tool_health";

/// Breaker FSM states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Tripped; asserting its intervention level.
    Open,
    /// Probationary: counting consecutive probe successes.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Severity a tripped breaker asserts onto the scheduler.
///
/// Declaration order is the total order used for aggregation; the bank
/// reports the maximum across open breakers, so no breaker's signal can be
/// shadowed by a milder one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum InterventionLevel {
    #[default]
    None,
    /// Cognitive ticks run with a reduced work quota.
    Dampen,
    /// Cognitive ticks are skipped outright.
    Pause,
    /// Pause, plus the scheduler enters emergency mode.
    Reset,
    /// Deepest stop; everything but system ticks is off.
    Hibernate,
}

impl fmt::Display for InterventionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterventionLevel::None => write!(f, "none"),
            InterventionLevel::Dampen => write!(f, "dampen"),
            InterventionLevel::Pause => write!(f, "pause"),
            InterventionLevel::Reset => write!(f, "reset"),
            InterventionLevel::Hibernate => write!(f, "hibernate"),
        }
    }
}

/// The closed set of trigger predicates. Evaluated by pattern matching in
/// the daemon: a fixed, auditable list, never plugin callbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerPredicate {
    /// Trips when spend-to-date / period-budget reaches the threshold.
    CostRatio { threshold: f64 },
    /// Trips when this many failures land within the sliding window.
    FailureCount { threshold: u32, window_secs: u64 },
    /// Trips when the same prior belief is contradicted this many times
    /// within the window.
    ContradictionLoop { max_repeats: u32, window_secs: u64 },
    /// Trips when a monotone signal counter reaches the threshold.
    GenericThreshold { threshold: u64 },
}

/// Configuration for one breaker in the bank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSpec {
    pub name: String,
    pub predicate: TriggerPredicate,
    pub cooldown_secs: u64,
    /// Consecutive successful probes required to close from half-open.
    pub half_open_trial_count: u32,
    /// When false the breaker skips the half-open path entirely and waits
    /// for operator acknowledgment. This is the only mechanism behind
    /// `master_sanity`'s lockout; no special-cased code.
    pub auto_recover: bool,
    pub intervention_level: InterventionLevel,
}

/// Point-in-time view of one breaker, for the operator surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub intervention_level: InterventionLevel,
    pub failure_count: u32,
    pub success_count: u32,
    /// Milliseconds since the Unix epoch; None unless Open.
    pub opened_at_epoch_ms: Option<u64>,
    pub cooldown_secs: u64,
    pub auto_recover: bool,
    /// Lifetime Closed→Open transitions, surviving recovery.
    pub trips_total: u64,
}

/// A state transition, as reported to the notifier and the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BreakerEvent {
    Opened {
        name: String,
        level: InterventionLevel,
        reason: String,
    },
    HalfOpened {
        name: String,
    },
    Closed {
        name: String,
        reason: String,
    },
}

impl BreakerEvent {
    pub fn breaker_name(&self) -> &str {
        match self {
            BreakerEvent::Opened { name, .. }
            | BreakerEvent::HalfOpened { name }
            | BreakerEvent::Closed { name, .. } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intervention_levels_totally_ordered() {
        assert!(InterventionLevel::None < InterventionLevel::Dampen);
        assert!(InterventionLevel::Dampen < InterventionLevel::Pause);
        assert!(InterventionLevel::Pause < InterventionLevel::Reset);
        assert!(InterventionLevel::Reset < InterventionLevel::Hibernate);
    }

    #[test]
    fn test_max_aggregation_over_levels() {
        let open = [
            InterventionLevel::Dampen,
            InterventionLevel::Hibernate,
            InterventionLevel::None,
        ];
        let max = open.iter().copied().max().unwrap_or_default();
        assert_eq!(max, InterventionLevel::Hibernate);
    }

    #[test]
    fn test_predicate_serde_tagging() {
        let p = TriggerPredicate::FailureCount {
            threshold: 5,
            window_secs: 30,
        };
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"kind\":\"failure_count\""));
        let back: TriggerPredicate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
