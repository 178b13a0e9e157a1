//! Prometheus metrics for the control core.
//!
//! Exported as text over the `Metrics` RPC method rather than a
//! scrape port; the socket is the daemon's only surface.

use prometheus::{
    register_counter_vec_with_registry, register_gauge_vec_with_registry,
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, CounterVec, Encoder, GaugeVec, Histogram, IntCounter,
    IntGauge, Registry, TextEncoder,
};
use std::sync::Arc;
use vigil_common::breaker::{BreakerEvent, InterventionLevel};
use vigil_common::tick::TickOutcome;

/// Control core metrics for Prometheus
#[derive(Clone)]
pub struct Metrics {
    pub breaker_transitions_total: CounterVec,
    pub intervention_level: IntGauge,
    pub emergency_mode: IntGauge,

    pub ticks_total: CounterVec,
    pub cognitive_tick_seconds: Histogram,

    pub classifier_requests_total: CounterVec,
    pub classifier_latency_seconds: Histogram,
    pub surprise_score: Histogram,

    pub grounding_attempts_total: CounterVec,
    pub grounding_spend_dollars: GaugeVec,
    pub budget_exhaustions_total: IntCounter,

    pub responder_fallbacks_total: IntCounter,

    registry: Arc<Registry>,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let breaker_transitions_total = register_counter_vec_with_registry!(
            "vigil_breaker_transitions_total",
            "Total breaker state transitions by breaker and destination state",
            &["breaker", "to_state"],
            registry
        ).unwrap();

        let intervention_level = register_int_gauge_with_registry!(
            "vigil_intervention_level",
            "Current aggregate intervention: 0=none, 1=dampen, 2=pause, 3=reset, 4=hibernate",
            registry
        ).unwrap();

        let emergency_mode = register_int_gauge_with_registry!(
            "vigil_emergency_mode",
            "Emergency mode flag: 0=off, 1=on",
            registry
        ).unwrap();

        let ticks_total = register_counter_vec_with_registry!(
            "vigil_ticks_total",
            "Total scheduler ticks by kind and outcome",
            &["kind", "outcome"],
            registry
        ).unwrap();

        let cognitive_tick_seconds = register_histogram_with_registry!(
            "vigil_cognitive_tick_seconds",
            "Wall time of completed cognitive ticks in seconds",
            vec![0.5, 1.0, 2.0, 5.0, 15.0, 30.0, 60.0, 120.0],
            registry
        ).unwrap();

        let classifier_requests_total = register_counter_vec_with_registry!(
            "vigil_classifier_requests_total",
            "Total entailment classifier requests by status (ok or degraded)",
            &["status"],
            registry
        ).unwrap();

        let classifier_latency_seconds = register_histogram_with_registry!(
            "vigil_classifier_latency_seconds",
            "Entailment classifier request latency in seconds",
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0],
            registry
        ).unwrap();

        let surprise_score = register_histogram_with_registry!(
            "vigil_surprise_score",
            "Distribution of final surprise scores",
            vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9],
            registry
        ).unwrap();

        let grounding_attempts_total = register_counter_vec_with_registry!(
            "vigil_grounding_attempts_total",
            "Total grounding tool dispatches by tool and outcome",
            &["tool", "outcome"],
            registry
        ).unwrap();

        let grounding_spend_dollars = register_gauge_vec_with_registry!(
            "vigil_grounding_spend_dollars",
            "Accumulated tool spend in dollars for the current period",
            &["tool", "period"],
            registry
        ).unwrap();

        let budget_exhaustions_total = register_int_counter_with_registry!(
            "vigil_budget_exhaustions_total",
            "Total grounding decisions downgraded because a budget ran out",
            registry
        ).unwrap();

        let responder_fallbacks_total = register_int_counter_with_registry!(
            "vigil_responder_fallbacks_total",
            "Total degraded responses served from the static fallback",
            registry
        ).unwrap();

        Self {
            breaker_transitions_total,
            intervention_level,
            emergency_mode,
            ticks_total,
            cognitive_tick_seconds,
            classifier_requests_total,
            classifier_latency_seconds,
            surprise_score,
            grounding_attempts_total,
            grounding_spend_dollars,
            budget_exhaustions_total,
            responder_fallbacks_total,
            registry: Arc::new(registry),
        }
    }

    /// Record one breaker transition
    pub fn record_breaker_event(&self, event: &BreakerEvent) {
        let (name, to_state) = match event {
            BreakerEvent::Opened { name, .. } => (name.as_str(), "open"),
            BreakerEvent::HalfOpened { name } => (name.as_str(), "half_open"),
            BreakerEvent::Closed { name, .. } => (name.as_str(), "closed"),
        };
        self.breaker_transitions_total
            .with_label_values(&[name, to_state])
            .inc();
    }

    /// Update the aggregate intervention gauge
    pub fn set_intervention_level(&self, level: Option<InterventionLevel>) {
        let value = match level {
            None | Some(InterventionLevel::None) => 0,
            Some(InterventionLevel::Dampen) => 1,
            Some(InterventionLevel::Pause) => 2,
            Some(InterventionLevel::Reset) => 3,
            Some(InterventionLevel::Hibernate) => 4,
        };
        self.intervention_level.set(value);
    }

    pub fn set_emergency_mode(&self, on: bool) {
        self.emergency_mode.set(if on { 1 } else { 0 });
    }

    /// Record one scheduler tick
    pub fn record_tick(&self, kind: &str, outcome: &TickOutcome) {
        let label = match outcome {
            TickOutcome::Ran => "ran",
            TickOutcome::SkippedBreaker { .. } => "skipped_breaker",
            TickOutcome::SkippedBudget => "skipped_budget",
            TickOutcome::SkippedDailyCap => "skipped_daily_cap",
        };
        self.ticks_total.with_label_values(&[kind, label]).inc();
    }

    /// Record one classifier request
    pub fn record_classifier(&self, degraded: bool, latency_ms: u64) {
        let status = if degraded { "degraded" } else { "ok" };
        self.classifier_requests_total
            .with_label_values(&[status])
            .inc();
        self.classifier_latency_seconds
            .observe(latency_ms as f64 / 1000.0);
    }

    /// Record one grounding dispatch
    pub fn record_grounding(&self, tool: &str, outcome: &str) {
        self.grounding_attempts_total
            .with_label_values(&[tool, outcome])
            .inc();
    }

    /// Update accumulated spend for a tool period
    pub fn set_spend(&self, tool: &str, period: &str, dollars: f64) {
        self.grounding_spend_dollars
            .with_label_values(&[tool, period])
            .set(dollars);
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_contains_registered_families() {
        let m = Metrics::new();
        m.record_breaker_event(&BreakerEvent::Opened {
            name: "tool_health".to_string(),
            level: InterventionLevel::Pause,
            reason: "test".to_string(),
        });
        m.record_tick("cognitive", &TickOutcome::Ran);
        m.record_classifier(true, 2_000);

        let text = m.export();
        assert!(text.contains("vigil_breaker_transitions_total"));
        assert!(text.contains("to_state=\"open\""));
        assert!(text.contains("vigil_ticks_total"));
        assert!(text.contains("vigil_classifier_requests_total"));
        assert!(text.contains("status=\"degraded\""));
    }

    #[test]
    fn test_intervention_gauge_mapping() {
        let m = Metrics::new();
        m.set_intervention_level(Some(InterventionLevel::Hibernate));
        assert_eq!(m.intervention_level.get(), 4);
        m.set_intervention_level(None);
        assert_eq!(m.intervention_level.get(), 0);
    }
}
