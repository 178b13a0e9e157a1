//! Vigil daemon - curiosity-safety control core.
//!
//! Wires the breaker bank, surprise evaluator, grounding executor, tick
//! scheduler, and degraded responder together, then serves the control
//! socket until shutdown.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vigil_common::config::VigilConfig;
use vigild::breakers::{BreakerBank, BreakerSupervisor};
use vigild::evaluator::SurpriseEvaluator;
use vigild::executor::GroundingExecutor;
use vigild::journal::Journal;
use vigild::metrics::Metrics;
use vigild::nli::HttpClassifier;
use vigild::notifier::CommandNotifier;
use vigild::pipeline::ReviewPipeline;
use vigild::responder::{DegradedResponder, StatusCache};
use vigild::rpc_server::{self, DaemonState};
use vigild::scheduler::{CachedCostFeed, TickScheduler};
use vigild::tools::HttpGroundingTool;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("vigild v{} starting", env!("CARGO_PKG_VERSION"));

    let config = VigilConfig::load();

    let metrics = Arc::new(Metrics::new());
    let journal = Arc::new(Journal::new(&config.daemon.journal_dir));

    let supervisor = BreakerSupervisor::new(
        BreakerBank::from_config(&config),
        Arc::new(CommandNotifier),
        journal.clone(),
        metrics.clone(),
    );

    let classifier = HttpClassifier::new(&config.classifier, metrics.clone());
    let evaluator = SurpriseEvaluator::new(classifier, supervisor.clone(), metrics.clone());

    let mut executor = GroundingExecutor::new(
        config.grounding.clone(),
        supervisor.clone(),
        journal.clone(),
        metrics.clone(),
    );
    for (tool, endpoint) in &config.grounding.tool_endpoints {
        executor.register_tool(
            tool.clone(),
            Arc::new(HttpGroundingTool::new(tool.clone(), endpoint.clone())),
        );
        info!(tool = %tool, endpoint = %endpoint, "grounding tool registered");
    }
    let executor = Arc::new(executor);

    let pipeline = Arc::new(ReviewPipeline::new(
        evaluator,
        executor.clone(),
        journal.clone(),
    ));

    let cache = Arc::new(StatusCache::new());
    let cost = Arc::new(CachedCostFeed::new(
        executor.clone(),
        Duration::from_secs(config.scheduler.cost_cache_secs),
    ));

    let scheduler = Arc::new(TickScheduler::new(
        config.clone(),
        supervisor.clone(),
        cost,
        pipeline.clone(),
        cache.clone(),
        journal.clone(),
        metrics.clone(),
    ));
    scheduler.clone().start();

    let responder = DegradedResponder::new(&config.responder, cache, metrics.clone());

    let state = Arc::new(DaemonState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        start_time: std::time::Instant::now(),
        config,
        supervisor,
        scheduler,
        executor,
        pipeline,
        responder,
        metrics,
    });
    tokio::spawn(async move {
        if let Err(e) = rpc_server::start_server(state).await {
            error!(error = %e, "control socket server failed");
        }
    });

    info!("vigild ready");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down gracefully");
    Ok(())
}
