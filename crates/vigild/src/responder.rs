//! Degraded-mode responder.
//!
//! Serves a safe, canned answer when the main pipeline is paused,
//! hibernating, or wedged. The hard requirement is the deadline: the
//! responder must answer even when every other component is stuck, so
//! it reads only its own snapshot slot, written by the scheduler with
//! a non-blocking `try_write`, read here with a non-blocking
//! `try_read`. No path through this module can wait on the breaker
//! bank or the tick state.

use crate::metrics::Metrics;
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;
use vigil_common::breaker::InterventionLevel;
use vigil_common::config::ResponderConfig;
use vigil_common::tick::TickState;

/// Served when no snapshot is available or the deadline expires.
pub const FALLBACK_RESPONSE: &str = "I'm operating at reduced capacity right now and can't \
     reason about new information. Core safety monitoring is still running. Please try \
     again in a few minutes.";

/// How much of the incoming query is echoed back.
const QUERY_ECHO_CHARS: usize = 80;

/// What the scheduler publishes for the responder to read.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub tick: TickState,
    pub intervention_level: Option<InterventionLevel>,
    pub open_breakers: Vec<String>,
    pub captured_at: DateTime<Utc>,
}

/// Single-slot snapshot exchange between scheduler and responder.
///
/// Both sides use the try_ variants: a slow reader costs the scheduler
/// nothing (the update is skipped), and a stuck writer costs the
/// responder nothing (it falls back).
#[derive(Default)]
pub struct StatusCache {
    slot: RwLock<Option<StatusSnapshot>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot unless someone holds the slot right now.
    pub fn publish(&self, snapshot: StatusSnapshot) {
        if let Ok(mut slot) = self.slot.try_write() {
            *slot = Some(snapshot);
        } else {
            debug!("status slot busy; snapshot dropped");
        }
    }

    /// Latest snapshot, or None if the slot is empty or contended.
    pub fn try_snapshot(&self) -> Option<StatusSnapshot> {
        self.slot.try_read().ok().and_then(|slot| slot.clone())
    }
}

pub struct DegradedResponder {
    cache: Arc<StatusCache>,
    deadline: Duration,
    metrics: Arc<Metrics>,
}

impl DegradedResponder {
    pub fn new(cfg: &ResponderConfig, cache: Arc<StatusCache>, metrics: Arc<Metrics>) -> Self {
        Self {
            cache,
            deadline: Duration::from_millis(cfg.deadline_ms),
            metrics,
        }
    }

    /// Always answers, always within the deadline. Never reasons about
    /// the query; it acknowledges it and reports what the core knows
    /// about its own state.
    pub async fn respond(&self, query: &str) -> String {
        match timeout(self.deadline, self.compose(query)).await {
            Ok(text) => text,
            Err(_) => {
                self.metrics.responder_fallbacks_total.inc();
                FALLBACK_RESPONSE.to_string()
            }
        }
    }

    async fn compose(&self, query: &str) -> String {
        let Some(snapshot) = self.cache.try_snapshot() else {
            self.metrics.responder_fallbacks_total.inc();
            return FALLBACK_RESPONSE.to_string();
        };

        let mut echoed: String = query.chars().take(QUERY_ECHO_CHARS).collect();
        if query.chars().count() > QUERY_ECHO_CHARS {
            echoed.push_str("...");
        }

        let state_line = match snapshot.intervention_level {
            Some(level) if level > InterventionLevel::None => format!(
                "An internal safeguard is active (level: {}, open: {}).",
                level,
                snapshot.open_breakers.join(", ")
            ),
            _ => "No safeguards are currently intervening.".to_string(),
        };

        let age_secs = (Utc::now() - snapshot.captured_at).num_seconds().max(0);

        format!(
            "I can't fully process \"{}\" right now; I'm in a reduced mode. {} \
             Last self-check was {}s ago; {} cognitive cycles have run today. \
             Normal processing resumes automatically once the safeguard clears.",
            echoed, state_line, age_secs, snapshot.tick.cognitive_ticks_today
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(level: Option<InterventionLevel>) -> StatusSnapshot {
        StatusSnapshot {
            tick: TickState::new(Utc::now()),
            intervention_level: level,
            open_breakers: vec!["tool_health".to_string()],
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_publish_then_snapshot_round_trips() {
        let cache = StatusCache::new();
        cache.publish(snapshot(Some(InterventionLevel::Pause)));
        let got = cache.try_snapshot().unwrap();
        assert_eq!(got.intervention_level, Some(InterventionLevel::Pause));
    }

    #[test]
    fn test_publish_skips_when_slot_held() {
        let cache = StatusCache::new();
        cache.publish(snapshot(None));

        let guard = cache.slot.read().unwrap();
        // A held read guard must not block the publisher; the update is
        // simply dropped.
        cache.publish(snapshot(Some(InterventionLevel::Hibernate)));
        drop(guard);

        let got = cache.try_snapshot().unwrap();
        assert_eq!(got.intervention_level, None);
    }

    #[tokio::test]
    async fn test_empty_cache_falls_back() {
        let responder = DegradedResponder::new(
            &ResponderConfig::default(),
            Arc::new(StatusCache::new()),
            Arc::new(Metrics::new()),
        );
        let answer = responder.respond("what is the capital of France?").await;
        assert_eq!(answer, FALLBACK_RESPONSE);
    }

    #[tokio::test]
    async fn test_answers_within_deadline_while_writer_holds_the_slot() {
        let cache = Arc::new(StatusCache::new());
        let responder = DegradedResponder::new(
            &ResponderConfig::default(),
            cache.clone(),
            Arc::new(Metrics::new()),
        );

        // A wedged publisher holds the slot for the whole run. The
        // responder must never wait for it, on any attempt.
        let guard = cache.slot.write().unwrap();
        for _ in 0..100 {
            let started = std::time::Instant::now();
            let answer = responder.respond("anything").await;
            assert_eq!(answer, FALLBACK_RESPONSE);
            assert!(
                started.elapsed()
                    < Duration::from_millis(2 * ResponderConfig::default().deadline_ms)
            );
        }
        drop(guard);
    }

    #[tokio::test]
    async fn test_compose_names_the_active_safeguard() {
        let cache = Arc::new(StatusCache::new());
        cache.publish(snapshot(Some(InterventionLevel::Pause)));
        let responder = DegradedResponder::new(
            &ResponderConfig::default(),
            cache,
            Arc::new(Metrics::new()),
        );

        let answer = responder.respond("summarize my notes").await;
        assert!(answer.contains("pause"));
        assert!(answer.contains("tool_health"));
        assert!(answer.contains("summarize my notes"));
    }

    #[tokio::test]
    async fn test_long_query_is_clipped_in_echo() {
        let cache = Arc::new(StatusCache::new());
        cache.publish(snapshot(None));
        let responder = DegradedResponder::new(
            &ResponderConfig::default(),
            cache,
            Arc::new(Metrics::new()),
        );

        let long_query = "x".repeat(500);
        let answer = responder.respond(&long_query).await;
        assert!(answer.contains(&format!("{}...", "x".repeat(QUERY_ECHO_CHARS))));
        assert!(!answer.contains(&"x".repeat(QUERY_ECHO_CHARS + 1)));
    }
}
