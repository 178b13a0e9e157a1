//! Single circuit breaker state machine.
//!
//! Identical transition rules for every breaker; only the trigger predicate
//! differs. All methods take an explicit `now` so transitions are a pure
//! function of recorded signals and the clock; the bank supplies real
//! time, tests supply whatever they need.

use crate::breakers::predicate;
use chrono::Utc;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use vigil_common::breaker::{BreakerEvent, BreakerSnapshot, BreakerSpec, CircuitState, TriggerPredicate};
use vigil_common::error::VigilError;

/// One breaker: spec plus tracked signals.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    spec: BreakerSpec,
    state: CircuitState,
    /// Consecutive successful probes while half-open.
    success_count: u32,
    /// Failure timestamps inside the sliding window.
    failure_times: Vec<Instant>,
    /// Contradiction timestamps per belief key.
    contradictions: HashMap<String, Vec<Instant>>,
    /// Monotone signal counter; also receives routed budget_exhausted
    /// signals, so it is visible on cost breakers' snapshots.
    signal_count: u64,
    /// Last observed spend/budget ratio (cost breakers).
    last_cost_ratio: f64,
    opened_at: Option<Instant>,
    opened_at_epoch_ms: Option<u64>,
    trips_total: u64,
}

impl CircuitBreaker {
    pub fn new(spec: BreakerSpec) -> Self {
        Self {
            spec,
            state: CircuitState::Closed,
            success_count: 0,
            failure_times: Vec::new(),
            contradictions: HashMap::new(),
            signal_count: 0,
            last_cost_ratio: 0.0,
            opened_at: None,
            opened_at_epoch_ms: None,
            trips_total: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn spec(&self) -> &BreakerSpec {
        &self.spec
    }

    /// Advance Open→HalfOpen once the cooldown has elapsed. Only breakers
    /// with `auto_recover` ever leave Open this way; the rest wait for an
    /// operator.
    pub fn advance(&mut self, now: Instant) -> Option<BreakerEvent> {
        if self.state != CircuitState::Open || !self.spec.auto_recover {
            return None;
        }
        let opened_at = self.opened_at?;
        if now.duration_since(opened_at) >= Duration::from_secs(self.spec.cooldown_secs) {
            self.half_open();
            return Some(BreakerEvent::HalfOpened {
                name: self.spec.name.clone(),
            });
        }
        None
    }

    /// Record the outcome of one guarded operation.
    pub fn record_outcome(&mut self, success: bool, now: Instant) -> Vec<BreakerEvent> {
        let mut events = Vec::new();
        if let Some(e) = self.advance(now) {
            events.push(e);
        }

        match (self.state, success) {
            (CircuitState::Closed, true) => {
                // A success breaks any consecutive-failure run.
                self.failure_times.clear();
            }
            (CircuitState::Closed, false) => {
                if let TriggerPredicate::FailureCount {
                    threshold,
                    window_secs,
                } = self.spec.predicate
                {
                    if predicate::failure_trip(
                        &mut self.failure_times,
                        threshold,
                        window_secs,
                        now,
                    ) {
                        let reason =
                            format!("{} failures within {}s window", threshold, window_secs);
                        events.push(self.open(now, reason));
                    }
                }
            }
            (CircuitState::HalfOpen, true) => {
                self.success_count += 1;
                if self.success_count >= self.spec.half_open_trial_count {
                    events.push(self.close("half-open trials passed"));
                }
            }
            (CircuitState::HalfOpen, false) => {
                // One failed probe ends probation immediately; the cooldown
                // clock restarts and the success streak is discarded.
                events.push(self.open(now, "probe failed while half-open".to_string()));
            }
            (CircuitState::Open, _) => {}
        }
        events
    }

    /// Record a contradiction of a prior belief.
    pub fn record_contradiction(&mut self, belief_key: &str, now: Instant) -> Vec<BreakerEvent> {
        let mut events = Vec::new();
        if let Some(e) = self.advance(now) {
            events.push(e);
        }
        let TriggerPredicate::ContradictionLoop {
            max_repeats,
            window_secs,
        } = self.spec.predicate
        else {
            return events;
        };

        match self.state {
            CircuitState::Closed => {
                if predicate::contradiction_trip(
                    &mut self.contradictions,
                    belief_key,
                    max_repeats,
                    window_secs,
                    now,
                ) {
                    let reason = format!(
                        "belief '{}' contradicted {} times within {}s",
                        belief_key, max_repeats, window_secs
                    );
                    events.push(self.open(now, reason));
                }
            }
            CircuitState::HalfOpen => {
                // Still looping: probation failed.
                events.push(self.open(
                    now,
                    format!("belief '{}' contradicted while half-open", belief_key),
                ));
            }
            CircuitState::Open => {}
        }
        events
    }

    /// Record one unit signal (sanity violations, routed budget_exhausted
    /// notifications).
    pub fn record_signal(&mut self, now: Instant) -> Vec<BreakerEvent> {
        let mut events = Vec::new();
        if let Some(e) = self.advance(now) {
            events.push(e);
        }
        self.signal_count += 1;

        match self.state {
            CircuitState::Closed => {
                if let TriggerPredicate::GenericThreshold { threshold } = self.spec.predicate {
                    if predicate::signal_trip(self.signal_count, threshold) {
                        events.push(
                            self.open(now, format!("signal threshold {} reached", threshold)),
                        );
                    }
                }
            }
            CircuitState::HalfOpen => {
                events.push(self.open(now, "signal received while half-open".to_string()));
            }
            CircuitState::Open => {}
        }
        events
    }

    /// Feed the latest spend/budget ratio. Cost breakers trip on it while
    /// Closed and treat it as the probe while HalfOpen; everyone else
    /// ignores it.
    pub fn observe_cost_ratio(&mut self, ratio: f64, now: Instant) -> Vec<BreakerEvent> {
        let mut events = Vec::new();
        if let Some(e) = self.advance(now) {
            events.push(e);
        }
        let TriggerPredicate::CostRatio { threshold } = self.spec.predicate else {
            return events;
        };
        self.last_cost_ratio = ratio;

        match self.state {
            CircuitState::Closed => {
                if predicate::cost_trip(ratio, threshold) {
                    events.push(
                        self.open(now, format!("cost ratio {:.2} >= {:.2}", ratio, threshold)),
                    );
                }
            }
            CircuitState::HalfOpen => {
                if predicate::cost_trip(ratio, threshold) {
                    events.push(self.open(
                        now,
                        format!("cost ratio {:.2} still >= {:.2}", ratio, threshold),
                    ));
                } else {
                    self.success_count += 1;
                    if self.success_count >= self.spec.half_open_trial_count {
                        events.push(self.close("cost ratio back under threshold"));
                    }
                }
            }
            CircuitState::Open => {}
        }
        events
    }

    /// Operator: trip unconditionally.
    pub fn force_open(&mut self, now: Instant) -> Option<BreakerEvent> {
        if self.state == CircuitState::Open {
            return None;
        }
        Some(self.open(now, "forced open by operator".to_string()))
    }

    /// Operator: close unconditionally (idempotent).
    pub fn force_close(&mut self) -> Option<BreakerEvent> {
        if self.state == CircuitState::Closed {
            return None;
        }
        Some(self.close("forced closed by operator"))
    }

    /// Operator acknowledgment, the only exit for breakers with
    /// `auto_recover = false`.
    pub fn acknowledge(&mut self) -> Result<BreakerEvent, VigilError> {
        if self.state == CircuitState::Closed {
            return Err(VigilError::BreakerAlreadyClosed(self.spec.name.clone()));
        }
        Ok(self.close("operator acknowledgment"))
    }

    /// Point-in-time view for the operator surface.
    pub fn snapshot(&self, now: Instant) -> BreakerSnapshot {
        BreakerSnapshot {
            name: self.spec.name.clone(),
            state: self.state,
            intervention_level: self.spec.intervention_level,
            failure_count: self.tracked_count(now),
            success_count: self.success_count,
            opened_at_epoch_ms: self.opened_at_epoch_ms,
            cooldown_secs: self.spec.cooldown_secs,
            auto_recover: self.spec.auto_recover,
            trips_total: self.trips_total,
        }
    }

    /// What the snapshot reports as `failure_count`, per predicate kind.
    fn tracked_count(&self, now: Instant) -> u32 {
        match self.spec.predicate {
            TriggerPredicate::FailureCount { window_secs, .. } => predicate::count_in_window(
                &self.failure_times,
                Duration::from_secs(window_secs),
                now,
            ),
            TriggerPredicate::ContradictionLoop { window_secs, .. } => self
                .contradictions
                .values()
                .map(|t| predicate::count_in_window(t, Duration::from_secs(window_secs), now))
                .max()
                .unwrap_or(0),
            TriggerPredicate::GenericThreshold { .. } | TriggerPredicate::CostRatio { .. } => {
                self.signal_count.min(u32::MAX as u64) as u32
            }
        }
    }

    fn open(&mut self, now: Instant, reason: String) -> BreakerEvent {
        debug_assert_ne!(self.state, CircuitState::Open);
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.opened_at_epoch_ms = Some(Utc::now().timestamp_millis().max(0) as u64);
        self.trips_total += 1;
        self.success_count = 0;
        self.failure_times.clear();
        self.contradictions.clear();
        BreakerEvent::Opened {
            name: self.spec.name.clone(),
            level: self.spec.intervention_level,
            reason,
        }
    }

    fn half_open(&mut self) {
        debug_assert_eq!(self.state, CircuitState::Open);
        debug_assert!(self.spec.auto_recover);
        self.state = CircuitState::HalfOpen;
        self.success_count = 0;
    }

    fn close(&mut self, reason: &str) -> BreakerEvent {
        debug_assert_ne!(self.state, CircuitState::Closed);
        self.state = CircuitState::Closed;
        self.success_count = 0;
        self.failure_times.clear();
        self.contradictions.clear();
        self.signal_count = 0;
        self.last_cost_ratio = 0.0;
        self.opened_at = None;
        self.opened_at_epoch_ms = None;
        BreakerEvent::Closed {
            name: self.spec.name.clone(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_common::breaker::InterventionLevel;

    fn failure_spec(threshold: u32, cooldown_secs: u64, auto_recover: bool) -> BreakerSpec {
        BreakerSpec {
            name: "test_breaker".to_string(),
            predicate: TriggerPredicate::FailureCount {
                threshold,
                window_secs: 3_600,
            },
            cooldown_secs,
            half_open_trial_count: 3,
            auto_recover,
            intervention_level: InterventionLevel::Pause,
        }
    }

    #[test]
    fn test_breaker_opens_at_threshold() {
        let mut cb = CircuitBreaker::new(failure_spec(3, 60, true));
        let now = Instant::now();

        assert!(cb.record_outcome(false, now).is_empty());
        assert!(cb.record_outcome(false, now).is_empty());
        let events = cb.record_outcome(false, now);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(&events[0], BreakerEvent::Opened { .. }));
        assert_eq!(cb.snapshot(now).trips_total, 1);
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let mut cb = CircuitBreaker::new(failure_spec(3, 60, true));
        let now = Instant::now();

        cb.record_outcome(false, now);
        cb.record_outcome(false, now);
        cb.record_outcome(true, now);
        cb.record_outcome(false, now);
        cb.record_outcome(false, now);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_after_cooldown() {
        let mut cb = CircuitBreaker::new(failure_spec(1, 60, true));
        let start = Instant::now();

        cb.record_outcome(false, start);
        assert_eq!(cb.state(), CircuitState::Open);

        assert!(cb.advance(start + Duration::from_secs(59)).is_none());
        assert_eq!(cb.state(), CircuitState::Open);

        let event = cb.advance(start + Duration::from_secs(60));
        assert!(matches!(event, Some(BreakerEvent::HalfOpened { .. })));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_no_auto_recovery_without_flag() {
        let mut cb = CircuitBreaker::new(failure_spec(1, 60, false));
        let start = Instant::now();

        cb.record_outcome(false, start);
        assert_eq!(cb.state(), CircuitState::Open);

        // Any amount of elapsed time leaves it Open.
        assert!(cb.advance(start + Duration::from_secs(86_400 * 365)).is_none());
        assert_eq!(cb.state(), CircuitState::Open);

        cb.acknowledge().unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_closes_after_trials() {
        let mut cb = CircuitBreaker::new(failure_spec(1, 10, true));
        let start = Instant::now();
        cb.record_outcome(false, start);
        let later = start + Duration::from_secs(10);
        cb.advance(later);
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_outcome(true, later);
        cb.record_outcome(true, later);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        let events = cb.record_outcome(true, later);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(matches!(&events[0], BreakerEvent::Closed { .. }));
    }

    #[test]
    fn test_half_open_single_failure_reopens_and_resets_clock() {
        let mut cb = CircuitBreaker::new(failure_spec(1, 10, true));
        let start = Instant::now();
        cb.record_outcome(false, start);
        cb.advance(start + Duration::from_secs(10));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // Two good probes, then one bad one: the streak is discarded.
        let probe_time = start + Duration::from_secs(11);
        cb.record_outcome(true, probe_time);
        cb.record_outcome(true, probe_time);
        let events = cb.record_outcome(false, probe_time);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(&events[0], BreakerEvent::Opened { .. }));
        assert_eq!(cb.snapshot(probe_time).trips_total, 2);
        assert_eq!(cb.snapshot(probe_time).success_count, 0);

        // Cooldown restarts from the failed probe, not the original trip.
        assert!(cb.advance(probe_time + Duration::from_secs(9)).is_none());
        assert!(cb.advance(probe_time + Duration::from_secs(10)).is_some());
    }

    #[test]
    fn test_acknowledge_closed_breaker_errors() {
        let mut cb = CircuitBreaker::new(failure_spec(3, 60, true));
        assert!(matches!(
            cb.acknowledge(),
            Err(VigilError::BreakerAlreadyClosed(_))
        ));
    }

    #[test]
    fn test_cost_breaker_trips_and_recovers_on_ratio() {
        let spec = BreakerSpec {
            name: "cost_guard".to_string(),
            predicate: TriggerPredicate::CostRatio { threshold: 1.0 },
            cooldown_secs: 10,
            half_open_trial_count: 2,
            auto_recover: true,
            intervention_level: InterventionLevel::Pause,
        };
        let mut cb = CircuitBreaker::new(spec);
        let start = Instant::now();

        assert!(cb.observe_cost_ratio(0.8, start).is_empty());
        let events = cb.observe_cost_ratio(1.05, start);
        assert!(matches!(&events[0], BreakerEvent::Opened { .. }));

        // After cooldown the next observation is the probe.
        let later = start + Duration::from_secs(10);
        cb.observe_cost_ratio(0.4, later);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.observe_cost_ratio(0.4, later);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_generic_threshold_counts_signals() {
        let spec = BreakerSpec {
            name: "master_sanity".to_string(),
            predicate: TriggerPredicate::GenericThreshold { threshold: 2 },
            cooldown_secs: 60,
            half_open_trial_count: 1,
            auto_recover: false,
            intervention_level: InterventionLevel::Hibernate,
        };
        let mut cb = CircuitBreaker::new(spec);
        let now = Instant::now();

        assert!(cb.record_signal(now).is_empty());
        let events = cb.record_signal(now);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(&events[0], BreakerEvent::Opened { .. }));
        assert_eq!(cb.snapshot(now).failure_count, 2);
    }
}
