//! Vigil daemon library - exposes modules for testing.

pub mod breakers;
pub mod evaluator;
pub mod executor;
pub mod journal;
pub mod metrics;
pub mod nli;
pub mod notifier;
pub mod pipeline;
pub mod responder;
pub mod rpc_server;
pub mod scheduler;
pub mod tools;
