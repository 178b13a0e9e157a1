//! Shared types and pure decision logic for vigil components.
//!
//! Everything here is transport-free: the daemon and the CLI both depend on
//! this crate, so it holds the data model, the scoring and grounding-policy
//! math, configuration, and the IPC message vocabulary, never sockets,
//! clocks, or locks.
//! beta.21: grounding decisions carry their cost-bucket period key.
//! beta.29: intervention levels gained a total order (breaker aggregation).

pub mod breaker;
pub mod claim;
pub mod config;
pub mod entailment;
pub mod error;
pub mod grounding;
pub mod ipc;
pub mod review;
pub mod surprise;
pub mod tick;

pub use breaker::{BreakerEvent, BreakerSnapshot, BreakerSpec, CircuitState, InterventionLevel, TriggerPredicate};
pub use claim::{Claim, ClaimType};
pub use config::VigilConfig;
pub use entailment::{EntailmentLabel, EntailmentResult};
pub use error::VigilError;
pub use grounding::{GroundingDecision, GroundingOutcome, GroundingResult, SkipReason};
pub use review::ClaimReview;
pub use surprise::SurpriseScore;
pub use tick::{TickContext, TickOutcome, TickState};
