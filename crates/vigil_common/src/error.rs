//! Error types shared across vigil components.

use crate::breaker::CircuitState;
use thiserror::Error;

/// Typed errors for the control surface and configuration paths.
///
/// The evaluation pipeline itself never returns these; transient failures
/// there fail soft into degraded results by design. These are for the
/// places where an error is the honest answer: operator commands aimed at
/// missing breakers, broken config files, and IPC plumbing.
#[derive(Error, Debug)]
pub enum VigilError {
    #[error("unknown breaker: {0}")]
    UnknownBreaker(String),

    #[error("breaker {0} is already closed")]
    BreakerAlreadyClosed(String),

    #[error("invalid transition for breaker {name}: {from} -> {to}")]
    InvalidTransition {
        name: String,
        from: CircuitState,
        to: CircuitState,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("classifier contract violation: {0}")]
    ContractViolation(String),

    #[error("daemon unavailable: {0}")]
    DaemonUnavailable(String),

    #[error("grounding unavailable for {tool}: {reason}")]
    GroundingUnavailable { tool: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VigilError {
    /// Process exit code for the CLI.
    pub fn code(&self) -> i32 {
        match self {
            VigilError::UnknownBreaker(_) => 2,
            VigilError::BreakerAlreadyClosed(_) => 3,
            VigilError::InvalidTransition { .. } => 4,
            VigilError::Config(_) => 5,
            VigilError::ContractViolation(_) => 6,
            VigilError::DaemonUnavailable(_) => 7,
            VigilError::GroundingUnavailable { .. } => 8,
            VigilError::Io(_) => 10,
            VigilError::Json(_) => 11,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(VigilError::UnknownBreaker("x".into()).code(), 2);
        assert_eq!(VigilError::BreakerAlreadyClosed("x".into()).code(), 3);
    }

    #[test]
    fn test_display_names_the_breaker() {
        let err = VigilError::UnknownBreaker("cost_guard".into());
        assert!(err.to_string().contains("cost_guard"));
    }
}
