//! Scheduler tick bookkeeping.
//!
//! `TickState` is owned and mutated by the scheduler alone; everyone else
//! (responder, operator surface) reads cloned snapshots.

use crate::breaker::InterventionLevel;
use crate::grounding::period_key_daily;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Long-lived scheduler record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickState {
    pub last_system_tick: Option<DateTime<Utc>>,
    /// Updated only after a cognitive tick body finishes (completed,
    /// failed, or timed out), never mid-execution and never on a skip,
    /// so a crash during a tick cannot corrupt interval scheduling.
    pub last_cognitive_tick: Option<DateTime<Utc>>,
    pub cognitive_ticks_today: u32,
    /// Lifetime completed cognitive ticks; drives optimism decay.
    #[serde(default)]
    pub cognitive_ticks_total: u32,
    /// UTC day the counter belongs to; rolls at midnight.
    pub counter_day: String,
    pub emergency_mode: bool,
}

impl TickState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_system_tick: None,
            last_cognitive_tick: None,
            cognitive_ticks_today: 0,
            cognitive_ticks_total: 0,
            counter_day: period_key_daily(now),
            emergency_mode: false,
        }
    }

    /// Reset the daily counter when UTC midnight has passed since the
    /// counter's day. Returns true when a rollover happened.
    pub fn roll_day_if_needed(&mut self, now: DateTime<Utc>) -> bool {
        let today = period_key_daily(now);
        if today != self.counter_day {
            self.counter_day = today;
            self.cognitive_ticks_today = 0;
            return true;
        }
        false
    }
}

/// What happened to one cognitive tick attempt. Every skip reason is
/// distinguishable, so callers and the journal never have to guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    Ran,
    SkippedBreaker { level: InterventionLevel },
    SkippedBudget,
    SkippedDailyCap,
}

impl TickOutcome {
    pub fn ran(&self) -> bool {
        matches!(self, TickOutcome::Ran)
    }
}

/// Handed to the cognitive tick body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickContext {
    /// True under a Dampen-level intervention: do less work this cycle.
    pub reduced: bool,
    /// Current optimistic-bootstrap bias in [0,1]; how to apply it is the
    /// tick body's business, not the scheduler's.
    pub optimism_bias: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_day_rollover_resets_counter() {
        let mut state = TickState::new(at("2026-08-23T23:59:00Z"));
        state.cognitive_ticks_today = 7;
        assert!(!state.roll_day_if_needed(at("2026-08-23T23:59:30Z")));
        assert_eq!(state.cognitive_ticks_today, 7);
        assert!(state.roll_day_if_needed(at("2026-08-24T00:00:05Z")));
        assert_eq!(state.cognitive_ticks_today, 0);
        assert_eq!(state.counter_day, "2026-08-24");
    }

    #[test]
    fn test_outcomes_distinguishable_in_serde() {
        let skipped = TickOutcome::SkippedBreaker {
            level: InterventionLevel::Pause,
        };
        let json = serde_json::to_string(&skipped).unwrap();
        assert!(json.contains("skipped_breaker"));
        assert!(json.contains("pause"));
        assert_ne!(
            serde_json::to_string(&TickOutcome::SkippedBudget).unwrap(),
            serde_json::to_string(&TickOutcome::SkippedDailyCap).unwrap()
        );
    }
}
