//! Circuit breaker bank and the async supervisor facade around it.
//!
//! The bank itself is synchronous: every mutation returns the transition
//! events it caused and touches nothing outside its own state. The
//! supervisor wraps the bank in an `RwLock`, collects events under the
//! lock, and only emits them (notification, journal, metrics) after the
//! lock is released so a slow notify command can never stall a tick.

pub mod circuit;
pub mod predicate;

pub use circuit::CircuitBreaker;

use crate::journal::Journal;
use crate::metrics::Metrics;
use crate::notifier::{Notifier, Urgency};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{info, warn};
use vigil_common::breaker::{
    BreakerEvent, BreakerSnapshot, CircuitState, InterventionLevel, TriggerPredicate,
    MASTER_SANITY,
};
use vigil_common::config::VigilConfig;
use vigil_common::error::VigilError;

// === Bank ===

/// All breakers, with name-based routing for incoming signals.
pub struct BreakerBank {
    breakers: Vec<CircuitBreaker>,
    /// Name of the breaker that receives budget/cost signals.
    cost_breaker: String,
}

impl BreakerBank {
    /// Build the bank from config. The master sanity breaker is always
    /// present even if an operator's `[[breakers]]` table omitted it.
    pub fn from_config(cfg: &VigilConfig) -> Self {
        let mut breakers: Vec<CircuitBreaker> = cfg
            .breakers
            .iter()
            .cloned()
            .map(CircuitBreaker::new)
            .collect();
        if !breakers.iter().any(|b| b.name() == MASTER_SANITY) {
            if let Some(spec) = vigil_common::config::default_breaker_specs()
                .into_iter()
                .find(|s| s.name == MASTER_SANITY)
            {
                warn!("config omitted the {} breaker; adding default", MASTER_SANITY);
                breakers.push(CircuitBreaker::new(spec));
            }
        }
        Self {
            breakers,
            cost_breaker: cfg.grounding.cost_breaker.clone(),
        }
    }

    /// Strongest intervention among breakers that are currently Open.
    /// Half-open breakers do not intervene; that is the whole point of
    /// probation.
    pub fn aggregate_intervention_level(&self) -> Option<InterventionLevel> {
        self.breakers
            .iter()
            .filter(|b| b.state() == CircuitState::Open)
            .map(|b| b.spec().intervention_level)
            .max()
    }

    /// Lazily advance every eligible breaker Open→HalfOpen.
    pub fn advance_all(&mut self, now: Instant) -> Vec<BreakerEvent> {
        self.breakers
            .iter_mut()
            .filter_map(|b| b.advance(now))
            .collect()
    }

    /// Outcome of one guarded operation, routed to a named breaker.
    pub fn record_outcome(
        &mut self,
        breaker: &str,
        success: bool,
        now: Instant,
    ) -> Result<Vec<BreakerEvent>, VigilError> {
        let b = self.find_mut(breaker)?;
        Ok(b.record_outcome(success, now))
    }

    /// A belief was contradicted; every loop-watching breaker hears it.
    pub fn record_contradiction(&mut self, belief_key: &str, now: Instant) -> Vec<BreakerEvent> {
        let mut events = Vec::new();
        for b in self
            .breakers
            .iter_mut()
            .filter(|b| matches!(b.spec().predicate, TriggerPredicate::ContradictionLoop { .. }))
        {
            events.extend(b.record_contradiction(belief_key, now));
        }
        events
    }

    /// A grounding decision was downgraded because a budget ran out.
    /// Counts against the configured cost breaker.
    pub fn record_budget_exhausted(&mut self, now: Instant) -> Vec<BreakerEvent> {
        let name = self.cost_breaker.clone();
        match self.find_mut(&name) {
            Ok(b) => b.record_signal(now),
            Err(_) => {
                warn!(breaker = %name, "cost breaker not configured; budget signal dropped");
                Vec::new()
            }
        }
    }

    /// An internal consistency check failed. Goes straight to the
    /// master sanity breaker.
    pub fn record_sanity_signal(&mut self, now: Instant) -> Vec<BreakerEvent> {
        match self.find_mut(MASTER_SANITY) {
            Ok(b) => b.record_signal(now),
            Err(_) => Vec::new(),
        }
    }

    /// Latest spend/budget ratio, broadcast to cost-watching breakers.
    pub fn observe_cost_ratio(&mut self, ratio: f64, now: Instant) -> Vec<BreakerEvent> {
        let mut events = Vec::new();
        for b in self
            .breakers
            .iter_mut()
            .filter(|b| matches!(b.spec().predicate, TriggerPredicate::CostRatio { .. }))
        {
            events.extend(b.observe_cost_ratio(ratio, now));
        }
        events
    }

    pub fn force_open(
        &mut self,
        breaker: &str,
        now: Instant,
    ) -> Result<Option<BreakerEvent>, VigilError> {
        Ok(self.find_mut(breaker)?.force_open(now))
    }

    pub fn force_close(&mut self, breaker: &str) -> Result<Option<BreakerEvent>, VigilError> {
        Ok(self.find_mut(breaker)?.force_close())
    }

    pub fn acknowledge(&mut self, breaker: &str) -> Result<BreakerEvent, VigilError> {
        self.find_mut(breaker)?.acknowledge()
    }

    pub fn snapshots(&self, now: Instant) -> Vec<BreakerSnapshot> {
        self.breakers.iter().map(|b| b.snapshot(now)).collect()
    }

    pub fn open_breaker_names(&self) -> Vec<String> {
        self.breakers
            .iter()
            .filter(|b| b.state() == CircuitState::Open)
            .map(|b| b.name().to_string())
            .collect()
    }

    fn find_mut(&mut self, name: &str) -> Result<&mut CircuitBreaker, VigilError> {
        self.breakers
            .iter_mut()
            .find(|b| b.name() == name)
            .ok_or_else(|| VigilError::UnknownBreaker(name.to_string()))
    }
}

// === Supervisor ===

/// Shared, async-friendly handle over the bank. Clone freely.
#[derive(Clone)]
pub struct BreakerSupervisor {
    bank: Arc<RwLock<BreakerBank>>,
    notifier: Arc<dyn Notifier>,
    journal: Arc<Journal>,
    metrics: Arc<Metrics>,
}

impl BreakerSupervisor {
    pub fn new(
        bank: BreakerBank,
        notifier: Arc<dyn Notifier>,
        journal: Arc<Journal>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            bank: Arc::new(RwLock::new(bank)),
            notifier,
            journal,
            metrics,
        }
    }

    pub async fn aggregate_intervention_level(&self) -> Option<InterventionLevel> {
        self.bank.read().await.aggregate_intervention_level()
    }

    pub async fn advance_all(&self, now: Instant) {
        let events = self.bank.write().await.advance_all(now);
        self.emit(&events).await;
    }

    /// Advance, then read the aggregate level, in one lock acquisition.
    /// This is the scheduler's gate check.
    pub async fn advance_and_level(&self, now: Instant) -> Option<InterventionLevel> {
        let (events, level) = {
            let mut bank = self.bank.write().await;
            let events = bank.advance_all(now);
            (events, bank.aggregate_intervention_level())
        };
        self.emit(&events).await;
        level
    }

    pub async fn record_outcome(&self, breaker: &str, success: bool) {
        let result = self
            .bank
            .write()
            .await
            .record_outcome(breaker, success, Instant::now());
        match result {
            Ok(events) => self.emit(&events).await,
            Err(e) => warn!(breaker, error = %e, "dropped outcome for unknown breaker"),
        }
    }

    pub async fn record_contradiction(&self, belief_key: &str) {
        let events = self
            .bank
            .write()
            .await
            .record_contradiction(belief_key, Instant::now());
        self.emit(&events).await;
    }

    pub async fn record_budget_exhausted(&self) {
        let events = self.bank.write().await.record_budget_exhausted(Instant::now());
        self.emit(&events).await;
    }

    pub async fn record_sanity_signal(&self) {
        let events = self.bank.write().await.record_sanity_signal(Instant::now());
        self.emit(&events).await;
    }

    pub async fn observe_cost_ratio(&self, ratio: f64) {
        let events = self
            .bank
            .write()
            .await
            .observe_cost_ratio(ratio, Instant::now());
        self.emit(&events).await;
    }

    pub async fn force_open(&self, breaker: &str) -> Result<(), VigilError> {
        let event = self.bank.write().await.force_open(breaker, Instant::now())?;
        if let Some(e) = event {
            self.emit(std::slice::from_ref(&e)).await;
        }
        Ok(())
    }

    pub async fn force_close(&self, breaker: &str) -> Result<(), VigilError> {
        let event = self.bank.write().await.force_close(breaker)?;
        if let Some(e) = event {
            self.emit(std::slice::from_ref(&e)).await;
        }
        Ok(())
    }

    pub async fn acknowledge(&self, breaker: &str) -> Result<(), VigilError> {
        let event = self.bank.write().await.acknowledge(breaker)?;
        self.emit(std::slice::from_ref(&event)).await;
        Ok(())
    }

    pub async fn snapshots(&self) -> Vec<BreakerSnapshot> {
        self.bank.read().await.snapshots(Instant::now())
    }

    pub async fn open_breaker_names(&self) -> Vec<String> {
        self.bank.read().await.open_breaker_names()
    }

    /// Emit one batch of transition events. Called with the bank lock
    /// released.
    async fn emit(&self, events: &[BreakerEvent]) {
        for event in events {
            self.metrics.record_breaker_event(event);
            match serde_json::to_value(event) {
                Ok(detail) => self.journal.record("breaker", detail).await,
                Err(e) => warn!(error = %e, "failed to serialize breaker event"),
            }
            match event {
                BreakerEvent::Opened { name, level, reason } => {
                    warn!(breaker = %name, %level, %reason, "breaker opened");
                    self.notifier.notify(
                        Urgency::Critical,
                        &format!("vigil: breaker {} opened", name),
                        &format!("intervention {}: {}", level, reason),
                    );
                }
                BreakerEvent::HalfOpened { name } => {
                    info!(breaker = %name, "breaker half-open, probing");
                    self.notifier.notify(
                        Urgency::Normal,
                        &format!("vigil: breaker {} half-open", name),
                        "cooldown elapsed, probing for recovery",
                    );
                }
                BreakerEvent::Closed { name, reason } => {
                    info!(breaker = %name, %reason, "breaker closed");
                    self.notifier.notify(
                        Urgency::Normal,
                        &format!("vigil: breaker {} closed", name),
                        reason,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> BreakerBank {
        BreakerBank::from_config(&VigilConfig::default())
    }

    #[test]
    fn test_default_bank_composition() {
        let b = bank();
        let now = Instant::now();
        let names: Vec<String> = b.snapshots(now).iter().map(|s| s.name.clone()).collect();
        assert!(names.contains(&"master_sanity".to_string()));
        assert!(names.contains(&"cost_guard".to_string()));
        assert_eq!(names.len(), 5);
    }

    #[test]
    fn test_aggregate_is_max_not_first() {
        let mut b = bank();
        let now = Instant::now();
        // tool_health (Pause) opens before contradiction_loop (Reset);
        // the aggregate must still be the stronger of the two.
        b.force_open("tool_health", now).unwrap();
        assert_eq!(b.aggregate_intervention_level(), Some(InterventionLevel::Pause));
        b.force_open("contradiction_loop", now).unwrap();
        assert_eq!(b.aggregate_intervention_level(), Some(InterventionLevel::Reset));
    }

    #[test]
    fn test_aggregate_none_when_all_closed() {
        let b = bank();
        assert_eq!(b.aggregate_intervention_level(), None);
    }

    #[test]
    fn test_unknown_breaker_is_an_error() {
        let mut b = bank();
        let now = Instant::now();
        assert!(matches!(
            b.record_outcome("no_such", true, now),
            Err(VigilError::UnknownBreaker(_))
        ));
    }

    #[test]
    fn test_master_sanity_always_present() {
        let mut cfg = VigilConfig::default();
        cfg.breakers.retain(|s| s.name != MASTER_SANITY);
        let b = BreakerBank::from_config(&cfg);
        let now = Instant::now();
        assert!(b
            .snapshots(now)
            .iter()
            .any(|s| s.name == MASTER_SANITY && !s.auto_recover));
    }

    #[test]
    fn test_budget_signal_routes_to_cost_breaker() {
        let mut b = bank();
        let now = Instant::now();
        b.record_budget_exhausted(now);
        let snaps = b.snapshots(now);
        let cost = snaps.iter().find(|s| s.name == "cost_guard").unwrap();
        // Visible on the counter, but CostRatio breakers only trip on
        // the observed ratio.
        assert_eq!(cost.failure_count, 1);
        assert_eq!(cost.state, CircuitState::Closed);
    }
}
