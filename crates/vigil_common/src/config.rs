//! Configuration for the vigil daemon.
//!
//! Loads settings from /etc/vigil/config.toml, falling back to ./vigil.toml
//! for development checkouts, and finally to built-in defaults. Every field
//! has a serde default so partial files stay valid across upgrades.

use crate::breaker::{
    BreakerSpec, InterventionLevel, TriggerPredicate, CLASSIFIER_HEALTH, MASTER_SANITY,
    TOOL_HEALTH,
};
use crate::claim::ClaimType;
use crate::grounding::{default_tool_for, ToolBudget};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use tracing::{info, warn};

/// System config file path.
pub const CONFIG_PATH: &str = "/etc/vigil/config.toml";

/// Development fallback, relative to the working directory.
pub const LOCAL_CONFIG_PATH: &str = "./vigil.toml";

/// Daemon housekeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Directory for the JSONL event journal.
    #[serde(default = "default_journal_dir")]
    pub journal_dir: String,
}

fn default_journal_dir() -> String {
    "/var/lib/vigil/journal".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            journal_dir: default_journal_dir(),
        }
    }
}

/// Entailment classifier endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Classifier HTTP endpoint.
    #[serde(default = "default_classifier_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds.
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,

    /// Upper character bound per input; longer text is cut from the tail.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

fn default_classifier_endpoint() -> String {
    "http://127.0.0.1:8741/v1/classify".to_string()
}

fn default_classifier_timeout() -> u64 {
    2 // classifier unavailability must never stall the pipeline
}

fn default_max_input_chars() -> usize {
    2_048 // roughly the service's 512-token window
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: default_classifier_endpoint(),
            timeout_secs: default_classifier_timeout(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

/// Grounding policy and tool budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingConfig {
    /// Spot-check rate for general-knowledge claims.
    #[serde(default = "default_rate_general_knowledge")]
    pub sample_rate_general_knowledge: f64,

    /// Spot-check rate for reasoning-chain claims.
    #[serde(default = "default_rate_reasoning_chain")]
    pub sample_rate_reasoning_chain: f64,

    /// Spot-check rate for creative-content claims.
    #[serde(default = "default_rate_creative_content")]
    pub sample_rate_creative_content: f64,

    /// Default per-tool call timeout in seconds.
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Per-tool timeout overrides, keyed by tool id.
    #[serde(default)]
    pub tool_timeout_overrides: HashMap<String, u64>,

    /// Claim-type → tool overrides, keyed by the claim type's snake_case
    /// name. Unlisted types use the built-in routing.
    #[serde(default)]
    pub tool_overrides: HashMap<String, String>,

    /// Per-tool budgets, keyed by tool id. Unlisted tools get
    /// `default_unknown_tool_budget`.
    #[serde(default = "default_tool_budgets")]
    pub budgets: HashMap<String, ToolBudget>,

    /// Sidecar endpoint per tool id. Tools without an endpoint are not
    /// registered at startup.
    #[serde(default = "default_tool_endpoints")]
    pub tool_endpoints: HashMap<String, String>,

    /// Breaker that receives budget_exhausted signals.
    #[serde(default = "default_cost_breaker")]
    pub cost_breaker: String,
}

fn default_rate_general_knowledge() -> f64 {
    0.20 // inherited default, no empirical derivation; tune per deploy
}

fn default_rate_reasoning_chain() -> f64 {
    0.10
}

fn default_rate_creative_content() -> f64 {
    0.05
}

fn default_tool_timeout() -> u64 {
    5
}

fn default_cost_breaker() -> String {
    "cost_guard".to_string()
}

fn default_tool_budgets() -> HashMap<String, ToolBudget> {
    let mut budgets = HashMap::new();
    budgets.insert(
        "web_search".to_string(),
        ToolBudget {
            daily_calls: 200,
            monthly_calls: 4_000,
            daily_dollars: 5.0,
            monthly_dollars: 60.0,
            cost_per_call: 0.01,
        },
    );
    budgets.insert(
        "code_execution".to_string(),
        ToolBudget {
            daily_calls: 100,
            monthly_calls: 2_000,
            daily_dollars: 3.0,
            monthly_dollars: 40.0,
            cost_per_call: 0.02,
        },
    );
    budgets
}

fn default_tool_endpoints() -> HashMap<String, String> {
    let mut endpoints = HashMap::new();
    endpoints.insert(
        "web_search".to_string(),
        "http://127.0.0.1:8742/v1/search".to_string(),
    );
    endpoints.insert(
        "code_execution".to_string(),
        "http://127.0.0.1:8743/v1/execute".to_string(),
    );
    endpoints
}

fn default_unknown_tool_budget() -> ToolBudget {
    ToolBudget {
        daily_calls: 50,
        monthly_calls: 1_000,
        daily_dollars: 2.0,
        monthly_dollars: 20.0,
        cost_per_call: 0.02,
    }
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            sample_rate_general_knowledge: default_rate_general_knowledge(),
            sample_rate_reasoning_chain: default_rate_reasoning_chain(),
            sample_rate_creative_content: default_rate_creative_content(),
            tool_timeout_secs: default_tool_timeout(),
            tool_timeout_overrides: HashMap::new(),
            tool_overrides: HashMap::new(),
            budgets: default_tool_budgets(),
            tool_endpoints: default_tool_endpoints(),
            cost_breaker: default_cost_breaker(),
        }
    }
}

impl GroundingConfig {
    /// Tool id a claim type routes to.
    pub fn tool_for(&self, claim_type: ClaimType) -> String {
        self.tool_overrides
            .get(claim_type.as_str())
            .cloned()
            .unwrap_or_else(|| default_tool_for(claim_type).to_string())
    }

    /// Budget limits for a tool, with a conservative fallback for tools
    /// nobody configured.
    pub fn budget_for(&self, tool: &str) -> ToolBudget {
        self.budgets
            .get(tool)
            .cloned()
            .unwrap_or_else(default_unknown_tool_budget)
    }

    /// Effective timeout for a tool in seconds.
    pub fn timeout_for(&self, tool: &str) -> u64 {
        self.tool_timeout_overrides
            .get(tool)
            .copied()
            .unwrap_or(self.tool_timeout_secs)
    }
}

/// Tick scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// System tick interval in seconds. Cheap local work only.
    #[serde(default = "default_system_tick")]
    pub system_tick_secs: u64,

    /// Cognitive tick interval in seconds.
    #[serde(default = "default_cognitive_tick")]
    pub cognitive_tick_secs: u64,

    /// Hard cap on cognitive ticks per UTC day.
    #[serde(default = "default_max_ticks_per_day")]
    pub max_cognitive_ticks_per_day: u32,

    /// Timeout for one cognitive tick body in seconds.
    #[serde(default = "default_cognitive_tick_timeout")]
    pub cognitive_tick_timeout_secs: u64,

    /// Monthly spend budget in dollars; denominator of the cost ratio.
    #[serde(default = "default_period_budget")]
    pub period_budget_dollars: f64,

    /// How long a spend-to-date reading stays fresh.
    #[serde(default = "default_cost_cache")]
    pub cost_cache_secs: u64,
}

fn default_system_tick() -> u64 {
    2
}

fn default_cognitive_tick() -> u64 {
    300 // 5 minutes
}

fn default_max_ticks_per_day() -> u32 {
    200 // beta.26: below the 288 a free-running 5-minute cadence would hit
}

fn default_cognitive_tick_timeout() -> u64 {
    120
}

fn default_period_budget() -> f64 {
    50.0
}

fn default_cost_cache() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            system_tick_secs: default_system_tick(),
            cognitive_tick_secs: default_cognitive_tick(),
            max_cognitive_ticks_per_day: default_max_ticks_per_day(),
            cognitive_tick_timeout_secs: default_cognitive_tick_timeout(),
            period_budget_dollars: default_period_budget(),
            cost_cache_secs: default_cost_cache(),
        }
    }
}

/// Degraded-mode responder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderConfig {
    /// Hard wall-clock deadline for `respond` in milliseconds.
    #[serde(default = "default_responder_deadline")]
    pub deadline_ms: u64,
}

fn default_responder_deadline() -> u64 {
    500
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_responder_deadline(),
        }
    }
}

/// Optimistic-bootstrap bias for early exploration.
///
/// Neither value has an empirical basis yet; they exist as configuration
/// precisely so tuning does not require a rebuild. The core never acts on
/// the bias itself; it is computed and handed to tick bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimismConfig {
    /// Starting bias in [0,1].
    #[serde(default = "default_initial_bias")]
    pub initial_bias: f64,

    /// Multiplicative decay applied per completed cognitive tick.
    #[serde(default = "default_bias_decay")]
    pub bias_decay: f64,
}

fn default_initial_bias() -> f64 {
    0.3
}

fn default_bias_decay() -> f64 {
    0.98
}

impl Default for OptimismConfig {
    fn default() -> Self {
        Self {
            initial_bias: default_initial_bias(),
            bias_decay: default_bias_decay(),
        }
    }
}

/// The stock breaker bank. `master_sanity` is always present: the bank
/// refuses to start without it and re-adds it if a config file drops it.
pub fn default_breaker_specs() -> Vec<BreakerSpec> {
    vec![
        BreakerSpec {
            name: MASTER_SANITY.to_string(),
            predicate: TriggerPredicate::GenericThreshold { threshold: 1 },
            cooldown_secs: 86_400,
            half_open_trial_count: 1,
            auto_recover: false, // operator acknowledgment only
            intervention_level: InterventionLevel::Hibernate,
        },
        BreakerSpec {
            name: CLASSIFIER_HEALTH.to_string(),
            predicate: TriggerPredicate::FailureCount {
                threshold: 5,
                window_secs: 30,
            },
            cooldown_secs: 60,
            half_open_trial_count: 3,
            auto_recover: true,
            intervention_level: InterventionLevel::Dampen,
        },
        BreakerSpec {
            name: TOOL_HEALTH.to_string(),
            predicate: TriggerPredicate::FailureCount {
                threshold: 5,
                window_secs: 60,
            },
            cooldown_secs: 60,
            half_open_trial_count: 3,
            auto_recover: true,
            intervention_level: InterventionLevel::Pause,
        },
        BreakerSpec {
            name: "contradiction_loop".to_string(),
            predicate: TriggerPredicate::ContradictionLoop {
                max_repeats: 3,
                window_secs: 600,
            },
            cooldown_secs: 300,
            half_open_trial_count: 3,
            auto_recover: true,
            intervention_level: InterventionLevel::Reset,
        },
        BreakerSpec {
            name: "cost_guard".to_string(),
            predicate: TriggerPredicate::CostRatio { threshold: 1.0 },
            cooldown_secs: 1_800,
            half_open_trial_count: 3,
            auto_recover: true,
            intervention_level: InterventionLevel::Pause,
        },
    ]
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VigilConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub grounding: GroundingConfig,

    #[serde(default = "default_breaker_specs")]
    pub breakers: Vec<BreakerSpec>,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub responder: ResponderConfig,

    #[serde(default)]
    pub optimism: OptimismConfig,
}

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig::default(),
            classifier: ClassifierConfig::default(),
            grounding: GroundingConfig::default(),
            breakers: default_breaker_specs(),
            scheduler: SchedulerConfig::default(),
            responder: ResponderConfig::default(),
            optimism: OptimismConfig::default(),
        }
    }
}

impl VigilConfig {
    /// Load config from the system path, the local fallback, or defaults.
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_PATH)
            .or_else(|_| Self::load_from_path(LOCAL_CONFIG_PATH))
            .unwrap_or_else(|e| {
                warn!("Config not found, using defaults: {}", e);
                VigilConfig::default()
            })
    }

    /// Load config from a specific path.
    pub fn load_from_path(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: VigilConfig = toml::from_str(&content)?;
        info!("Loaded config from {}", path);
        Ok(config)
    }

    /// Save default config to path (for init).
    pub fn save_default(path: &str) -> Result<()> {
        let config = VigilConfig::default();
        let content = toml::to_string_pretty(&config)?;
        if let Some(parent) = std::path::Path::new(path).parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        info!("Saved default config to {}", path);
        Ok(())
    }

    /// Current optimistic-bootstrap bias after `completed_ticks` cognitive
    /// ticks: `initial_bias * bias_decay^n`, clamped to [0,1].
    pub fn optimism_bias(&self, completed_ticks: u32) -> f64 {
        let decayed =
            self.optimism.initial_bias * self.optimism.bias_decay.powi(completed_ticks as i32);
        decayed.clamp(0.0, 1.0)
    }

    /// The spec for one breaker, if configured.
    pub fn breaker_spec(&self, name: &str) -> Option<&BreakerSpec> {
        self.breakers.iter().find(|spec| spec.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bank_reserves_master_sanity() {
        let specs = default_breaker_specs();
        let sanity = specs.iter().find(|s| s.name == MASTER_SANITY).unwrap();
        assert!(!sanity.auto_recover);
        assert_eq!(sanity.intervention_level, InterventionLevel::Hibernate);
    }

    #[test]
    fn test_tool_routing_defaults() {
        let cfg = GroundingConfig::default();
        assert_eq!(cfg.tool_for(ClaimType::Numerical), "code_execution");
        assert_eq!(cfg.tool_for(ClaimType::Factual), "web_search");
    }

    #[test]
    fn test_optimism_bias_decays_and_clamps() {
        let cfg = VigilConfig::default();
        assert!(cfg.optimism_bias(0) > cfg.optimism_bias(10));
        assert!(cfg.optimism_bias(100_000) >= 0.0);
        assert!(cfg.optimism_bias(0) <= 1.0);
    }
}
