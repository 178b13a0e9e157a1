//! Dual-cadence tick scheduler.
//!
//! Two independent loops: a system tick every couple of seconds doing
//! cheap local work (breaker advancement, snapshot publication), and a
//! cognitive tick every few minutes running the injected body. The
//! system loop is never gated: whatever the breakers say, the daemon
//! keeps observing itself.
//!
//! Every cognitive tick passes one gate, evaluated in a single
//! critical section over the tick state: aggregate intervention level,
//! daily cap, then spend ratio, committing the day-counter slot before
//! the body runs. Two gates can never both pass on the last slot.

use crate::breakers::BreakerSupervisor;
use crate::executor::GroundingExecutor;
use crate::journal::Journal;
use crate::metrics::Metrics;
use crate::responder::{StatusCache, StatusSnapshot};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::time::{interval, timeout};
use tracing::{debug, info, warn};
use vigil_common::breaker::InterventionLevel;
use vigil_common::config::VigilConfig;
use vigil_common::tick::{TickContext, TickOutcome, TickState};

// === Cost feed ===

/// Source of "dollars spent this period" readings.
#[async_trait]
pub trait CostFeed: Send + Sync {
    async fn period_spend_dollars(&self) -> f64;
}

#[async_trait]
impl CostFeed for GroundingExecutor {
    async fn period_spend_dollars(&self) -> f64 {
        self.monthly_spend_dollars(Utc::now()).await
    }
}

/// Caches spend readings so the gate check costs nothing between
/// refreshes.
pub struct CachedCostFeed {
    inner: Arc<dyn CostFeed>,
    ttl: Duration,
    cached: Mutex<Option<(Instant, f64)>>,
}

impl CachedCostFeed {
    pub fn new(inner: Arc<dyn CostFeed>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cached: Mutex::new(None),
        }
    }

    pub async fn read(&self) -> f64 {
        let mut cached = self.cached.lock().await;
        if let Some((at, value)) = *cached {
            if at.elapsed() < self.ttl {
                return value;
            }
        }
        let value = self.inner.period_spend_dollars().await;
        *cached = Some((Instant::now(), value));
        value
    }
}

// === Tick body ===

/// The work a cognitive tick performs. Injected by the daemon wiring;
/// the scheduler owns when it runs, never what it does.
#[async_trait]
pub trait TickBody: Send + Sync {
    async fn run(&self, ctx: TickContext) -> anyhow::Result<()>;
}

// === Scheduler ===

pub struct TickScheduler {
    config: VigilConfig,
    supervisor: BreakerSupervisor,
    state: Arc<RwLock<TickState>>,
    cost: Arc<CachedCostFeed>,
    body: Arc<dyn TickBody>,
    cache: Arc<StatusCache>,
    journal: Arc<Journal>,
    metrics: Arc<Metrics>,
}

impl TickScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: VigilConfig,
        supervisor: BreakerSupervisor,
        cost: Arc<CachedCostFeed>,
        body: Arc<dyn TickBody>,
        cache: Arc<StatusCache>,
        journal: Arc<Journal>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            supervisor,
            state: Arc::new(RwLock::new(TickState::new(Utc::now()))),
            cost,
            body,
            cache,
            journal,
            metrics,
        }
    }

    /// Spawn both loops. Returns immediately; the loops run for the
    /// life of the runtime.
    pub fn start(self: Arc<Self>) {
        let system_secs = self.config.scheduler.system_tick_secs;
        let cognitive_secs = self.config.scheduler.cognitive_tick_secs;

        let scheduler = Arc::clone(&self);
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(system_secs));
            loop {
                ticker.tick().await;
                scheduler.system_tick().await;
            }
        });

        let scheduler = Arc::clone(&self);
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(cognitive_secs));
            // The immediate first fire would run a cognitive tick at
            // boot; wait one full interval instead.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                scheduler.cognitive_tick().await;
            }
        });

        info!(
            system_secs,
            cognitive_secs, "tick scheduler started (system + cognitive loops)"
        );
    }

    /// Cheap periodic work: advance breakers, refresh gauges, publish
    /// the responder snapshot. Never gated.
    pub async fn system_tick(&self) {
        let level = self.supervisor.advance_and_level(Instant::now()).await;
        let now = Utc::now();

        let snapshot = {
            let mut state = self.state.write().await;
            state.last_system_tick = Some(now);
            if state.roll_day_if_needed(now) {
                info!(day = %state.counter_day, "daily cognitive tick counter reset");
            }
            state.emergency_mode =
                level.map_or(false, |l| l >= InterventionLevel::Reset);
            state.clone()
        };

        self.metrics.set_intervention_level(level);
        self.metrics.set_emergency_mode(snapshot.emergency_mode);
        self.metrics.record_tick("system", &TickOutcome::Ran);

        self.cache.publish(StatusSnapshot {
            tick: snapshot,
            intervention_level: level,
            open_breakers: self.supervisor.open_breaker_names().await,
            captured_at: now,
        });
    }

    /// One gated cognitive tick attempt.
    pub async fn cognitive_tick(&self) -> TickOutcome {
        // Feed the freshest spend ratio to cost breakers before reading
        // the level, so a newly crossed budget is already reflected.
        let spend = self.cost.read().await;
        let budget = self.config.scheduler.period_budget_dollars.max(f64::MIN_POSITIVE);
        let ratio = spend / budget;
        self.supervisor.observe_cost_ratio(ratio).await;

        let level = self.supervisor.advance_and_level(Instant::now()).await;
        let now = Utc::now();

        // The gate. One critical section: cap bookkeeping and the slot
        // commit happen atomically with the checks.
        let (outcome, ticks_total) = {
            let mut state = self.state.write().await;
            state.roll_day_if_needed(now);

            let outcome = if let Some(l) =
                level.filter(|l| *l >= InterventionLevel::Pause)
            {
                TickOutcome::SkippedBreaker { level: l }
            } else if state.cognitive_ticks_today
                >= self.config.scheduler.max_cognitive_ticks_per_day
            {
                TickOutcome::SkippedDailyCap
            } else if ratio >= 1.0 {
                TickOutcome::SkippedBudget
            } else {
                state.cognitive_ticks_today += 1;
                TickOutcome::Ran
            };
            (outcome, state.cognitive_ticks_total)
        };

        match outcome {
            TickOutcome::Ran => {
                let ctx = TickContext {
                    reduced: level == Some(InterventionLevel::Dampen),
                    optimism_bias: self.config.optimism_bias(ticks_total),
                };
                self.run_body(ctx).await;
            }
            TickOutcome::SkippedBreaker { level } => {
                info!(%level, "cognitive tick skipped: breaker intervention");
            }
            TickOutcome::SkippedDailyCap => {
                info!("cognitive tick skipped: daily cap reached");
            }
            TickOutcome::SkippedBudget => {
                warn!(ratio, "cognitive tick skipped: period budget spent");
            }
        }

        self.metrics.record_tick("cognitive", &outcome);
        match serde_json::to_value(outcome) {
            Ok(detail) => {
                self.journal
                    .record("tick", json!({ "kind": "cognitive", "result": detail }))
                    .await;
            }
            Err(e) => warn!(error = %e, "failed to serialize tick outcome"),
        }
        outcome
    }

    async fn run_body(&self, ctx: TickContext) {
        let limit = Duration::from_secs(self.config.scheduler.cognitive_tick_timeout_secs);
        let started = Instant::now();

        match timeout(limit, self.body.run(ctx)).await {
            Ok(Ok(())) => {
                debug!(elapsed_ms = started.elapsed().as_millis() as u64, "cognitive tick completed");
            }
            Ok(Err(e)) => {
                warn!(error = %e, "cognitive tick body failed");
            }
            Err(_) => {
                warn!(timeout_secs = limit.as_secs(), "cognitive tick body timed out");
            }
        }
        self.metrics
            .cognitive_tick_seconds
            .observe(started.elapsed().as_secs_f64());

        // Completion bookkeeping happens only here: a skipped tick
        // leaves the schedule untouched, and a crash mid-body never
        // records a completion it didn't reach.
        let mut state = self.state.write().await;
        state.last_cognitive_tick = Some(Utc::now());
        state.cognitive_ticks_total += 1;
    }

    pub async fn tick_state(&self) -> TickState {
        self.state.read().await.clone()
    }
}
