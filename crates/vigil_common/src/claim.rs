//! Claims under evaluation.
//!
//! A claim is an immutable text assertion plus the metadata the grounding
//! policy needs: its type tag and when it was made. Content never matters
//! to the core; only the tag does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed set of claim types the grounding policy knows how to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    /// Checkable statement of fact ("the capital of X is Y").
    Factual,
    /// Quantitative assertion; verified by computation, not lookup.
    Numerical,
    /// Date or ordering assertion.
    Temporal,
    /// Who-said-what or who-did-what.
    Attribution,
    /// Empirical/scientific assertion; verified by computation or literature.
    Scientific,
    /// Value judgment; no external ground truth exists.
    Opinion,
    /// Counterfactual or speculative; grounding is meaningless.
    Hypothetical,
    /// Statement about the agent itself.
    Meta,
    /// Widely-known background fact; spot-checked, not always verified.
    GeneralKnowledge,
    /// Intermediate step in a derivation.
    ReasoningChain,
    /// Fiction, style, or brainstorm output.
    CreativeContent,
}

impl ClaimType {
    /// Stable lowercase name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimType::Factual => "factual",
            ClaimType::Numerical => "numerical",
            ClaimType::Temporal => "temporal",
            ClaimType::Attribution => "attribution",
            ClaimType::Scientific => "scientific",
            ClaimType::Opinion => "opinion",
            ClaimType::Hypothetical => "hypothetical",
            ClaimType::Meta => "meta",
            ClaimType::GeneralKnowledge => "general_knowledge",
            ClaimType::ReasoningChain => "reasoning_chain",
            ClaimType::CreativeContent => "creative_content",
        }
    }
}

impl std::str::FromStr for ClaimType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "factual" => ClaimType::Factual,
            "numerical" => ClaimType::Numerical,
            "temporal" => ClaimType::Temporal,
            "attribution" => ClaimType::Attribution,
            "scientific" => ClaimType::Scientific,
            "opinion" => ClaimType::Opinion,
            "hypothetical" => ClaimType::Hypothetical,
            "meta" => ClaimType::Meta,
            "general_knowledge" => ClaimType::GeneralKnowledge,
            "reasoning_chain" => ClaimType::ReasoningChain,
            "creative_content" => ClaimType::CreativeContent,
            other => return Err(format!("unknown claim type: {other}")),
        })
    }
}

/// A text assertion under evaluation. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    /// Correlation id for journal and metrics lines.
    pub id: Uuid,
    /// The assertion itself.
    pub text: String,
    /// Type tag driving the grounding decision.
    pub claim_type: ClaimType,
    /// When the claim was made (UTC).
    pub created_at: DateTime<Utc>,
}

impl Claim {
    pub fn new(text: impl Into<String>, claim_type: ClaimType) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            claim_type,
            created_at: Utc::now(),
        }
    }
}
