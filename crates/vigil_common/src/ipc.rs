//! IPC protocol between vigild and vigilctl.
//!
//! JSON-lines over the daemon's Unix socket: one `Request` per line, one
//! `Response` per line, paired by id.

use crate::breaker::{BreakerSnapshot, InterventionLevel};
use crate::claim::ClaimType;
use crate::config::VigilConfig;
use crate::review::ClaimReview;
use crate::tick::TickState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: Method,
}

/// Response from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub result: Result<ResponseData, String>,
}

/// Operator methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum Method {
    /// Liveness check.
    Ping,

    /// Daemon status summary (degraded-mode safe).
    Status,

    /// Snapshot every breaker in the bank.
    GetBreakerStates,

    /// Snapshot the scheduler's tick state.
    GetTickState,

    /// Trip a breaker by hand.
    ForceOpen { breaker: String },

    /// Close a breaker by hand, bypassing the half-open trials.
    ForceClose { breaker: String },

    /// Acknowledge and close a non-auto-recovering breaker.
    Acknowledge { breaker: String },

    /// Clear the current period's counters for one tool.
    ResetGroundingBudget { tool: String },

    /// Queue a claim for review against a prior belief.
    SubmitClaim {
        belief_key: String,
        premise: String,
        text: String,
        claim_type: ClaimType,
    },

    /// Most recent claim reviews, newest first.
    RecentReviews,

    /// Answer a query through the degraded responder.
    Respond { query: String },

    /// Running configuration.
    GetConfig,

    /// Prometheus text-format metrics.
    Metrics,
}

/// Response payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ResponseData {
    /// Simple success/pong.
    Ok,

    /// Status summary.
    Status(StatusData),

    /// Breaker snapshots, bank order.
    BreakerStates(Vec<BreakerSnapshot>),

    /// Tick state snapshot.
    TickState(TickState),

    /// Claim accepted into the review queue.
    Submitted { claim_id: Uuid, queue_depth: usize },

    /// Recent reviews, newest first.
    Reviews(Vec<ClaimReview>),

    /// Degraded responder answer.
    Answer(String),

    /// Running configuration.
    Config(Box<VigilConfig>),

    /// Prometheus text exposition.
    Metrics(String),
}

/// Daemon status summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusData {
    pub version: String,
    pub uptime_seconds: u64,
    pub emergency_mode: bool,
    /// Aggregate intervention level across open breakers.
    pub intervention_level: InterventionLevel,
    pub open_breakers: usize,
    pub cognitive_ticks_today: u32,
    pub last_cognitive_tick: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_round_trip() {
        let req = Request {
            id: 7,
            method: Method::Acknowledge {
                breaker: "master_sanity".to_string(),
            },
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, 7);
        assert!(matches!(back.method, Method::Acknowledge { breaker } if breaker == "master_sanity"));
    }

    #[test]
    fn test_error_response_round_trip() {
        let resp = Response {
            id: 1,
            result: Err("unknown breaker: nope".to_string()),
        };
        let json = serde_json::to_string(&resp).unwrap();
        let back: Response = serde_json::from_str(&json).unwrap();
        assert!(back.result.is_err());
    }

    #[test]
    fn test_submit_claim_wire_shape() {
        let req = Request {
            id: 3,
            method: Method::SubmitClaim {
                belief_key: "deploy.region".to_string(),
                premise: "the service is deployed in eu-west-1".to_string(),
                text: "the service is deployed in us-east-2".to_string(),
                claim_type: ClaimType::Factual,
            },
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"type\":\"SubmitClaim\""));
        assert!(json.contains("\"claim_type\":\"factual\""));
        let back: Request = serde_json::from_str(&json).unwrap();
        assert!(
            matches!(back.method, Method::SubmitClaim { claim_type, .. } if claim_type == ClaimType::Factual)
        );
    }
}
