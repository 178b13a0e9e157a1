//! Control socket: Unix-domain RPC between vigild and vigilctl.
//!
//! JSON-lines framing, one request/response pair per line. The dispatch
//! never reasons about claims itself; every method is a thin call into
//! the component that owns the state, so operator commands stay
//! answerable even when the cognitive layer is paused.

use crate::breakers::BreakerSupervisor;
use crate::executor::GroundingExecutor;
use crate::metrics::Metrics;
use crate::nli::Classifier;
use crate::pipeline::{QueuedClaim, ReviewPipeline};
use crate::responder::DegradedResponder;
use crate::scheduler::TickScheduler;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{error, info, warn};
use vigil_common::claim::Claim;
use vigil_common::config::VigilConfig;
use vigil_common::ipc::{Method, Request, Response, ResponseData, StatusData};

const SOCKET_PATH: &str = "/run/vigil/vigil.sock";

/// Socket path, overridable for tests and non-root runs.
pub fn socket_path() -> PathBuf {
    std::env::var("VIGILD_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(SOCKET_PATH))
}

/// Everything a connection handler can reach. One per daemon.
pub struct DaemonState<C: Classifier> {
    pub version: String,
    pub start_time: std::time::Instant,
    pub config: VigilConfig,
    pub supervisor: BreakerSupervisor,
    pub scheduler: Arc<TickScheduler>,
    pub executor: Arc<GroundingExecutor>,
    pub pipeline: Arc<ReviewPipeline<C>>,
    pub responder: DegradedResponder,
    pub metrics: Arc<Metrics>,
}

/// Bind the socket and serve until the daemon exits.
pub async fn start_server<C: Classifier + 'static>(state: Arc<DaemonState<C>>) -> Result<()> {
    let path = socket_path();
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .context("failed to create socket directory")?;
    }

    // Stale socket from a previous run.
    let _ = tokio::fs::remove_file(&path).await;

    let listener = UnixListener::bind(&path).context("failed to bind control socket")?;
    info!(path = %path.display(), "control socket listening");

    set_socket_permissions(&path)?;

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state).await {
                        error!(error = %e, "connection handler failed");
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "failed to accept connection");
            }
        }
    }
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o666))
        .context("failed to set socket permissions")
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

async fn handle_connection<C: Classifier>(
    stream: UnixStream,
    state: Arc<DaemonState<C>>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .context("failed to read from socket")?;
        if bytes_read == 0 {
            break;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "invalid request JSON");
                continue;
            }
        };

        let response = handle_request(request.id, request.method, &state).await;
        let response_json = serde_json::to_string(&response)? + "\n";
        writer
            .write_all(response_json.as_bytes())
            .await
            .context("failed to write response")?;
    }

    Ok(())
}

async fn handle_request<C: Classifier>(
    id: u64,
    method: Method,
    state: &DaemonState<C>,
) -> Response {
    let result = match method {
        Method::Ping => Ok(ResponseData::Ok),

        Method::Status => {
            let tick = state.scheduler.tick_state().await;
            let level = state
                .supervisor
                .aggregate_intervention_level()
                .await
                .unwrap_or_default();
            let open = state.supervisor.open_breaker_names().await;
            Ok(ResponseData::Status(StatusData {
                version: state.version.clone(),
                uptime_seconds: state.start_time.elapsed().as_secs(),
                emergency_mode: tick.emergency_mode,
                intervention_level: level,
                open_breakers: open.len(),
                cognitive_ticks_today: tick.cognitive_ticks_today,
                last_cognitive_tick: tick.last_cognitive_tick,
            }))
        }

        Method::GetBreakerStates => Ok(ResponseData::BreakerStates(
            state.supervisor.snapshots().await,
        )),

        Method::GetTickState => Ok(ResponseData::TickState(state.scheduler.tick_state().await)),

        Method::ForceOpen { breaker } => state
            .supervisor
            .force_open(&breaker)
            .await
            .map(|_| ResponseData::Ok)
            .map_err(|e| e.to_string()),

        Method::ForceClose { breaker } => state
            .supervisor
            .force_close(&breaker)
            .await
            .map(|_| ResponseData::Ok)
            .map_err(|e| e.to_string()),

        Method::Acknowledge { breaker } => state
            .supervisor
            .acknowledge(&breaker)
            .await
            .map(|_| ResponseData::Ok)
            .map_err(|e| e.to_string()),

        Method::ResetGroundingBudget { tool } => {
            state.executor.reset_usage(Some(&tool)).await;
            Ok(ResponseData::Ok)
        }

        Method::SubmitClaim {
            belief_key,
            premise,
            text,
            claim_type,
        } => {
            let claim = Claim::new(text, claim_type);
            let claim_id = claim.id;
            let queue_depth = state
                .pipeline
                .submit(QueuedClaim {
                    belief_key,
                    premise,
                    claim,
                })
                .await;
            Ok(ResponseData::Submitted {
                claim_id,
                queue_depth,
            })
        }

        Method::RecentReviews => Ok(ResponseData::Reviews(state.pipeline.recent_reviews().await)),

        Method::Respond { query } => Ok(ResponseData::Answer(state.responder.respond(&query).await)),

        Method::GetConfig => Ok(ResponseData::Config(Box::new(state.config.clone()))),

        Method::Metrics => Ok(ResponseData::Metrics(state.metrics.export())),
    };

    Response { id, result }
}
