//! Grounding tool backends.
//!
//! Each tool is a local sidecar speaking the same one-shot JSON POST
//! shape: the claim goes out, evidence comes back. The executor owns
//! retries-don't-exist and the per-tool timeout; this client just
//! makes the call and reports honestly.

use crate::executor::{GroundingTool, ToolReply};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vigil_common::claim::Claim;

#[derive(Debug, Serialize)]
struct ToolRequest<'a> {
    claim: &'a str,
    claim_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct ToolResponse {
    result_text: String,
    #[serde(default)]
    sources: Vec<String>,
}

/// HTTP client for one verification sidecar.
pub struct HttpGroundingTool {
    name: String,
    endpoint: String,
}

impl HttpGroundingTool {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl GroundingTool for HttpGroundingTool {
    async fn run(&self, claim: &Claim) -> Result<ToolReply> {
        // No client-side timeout: the executor wraps this call and a
        // cancelled future tears the connection down.
        let client = reqwest::Client::new();
        let resp = client
            .post(&self.endpoint)
            .json(&ToolRequest {
                claim: &claim.text,
                claim_type: claim.claim_type.as_str(),
            })
            .send()
            .await
            .with_context(|| format!("{} sidecar unreachable", self.name))?;

        if !resp.status().is_success() {
            return Err(anyhow!("{} returned status {}", self.name, resp.status()));
        }

        let body: ToolResponse = resp
            .json()
            .await
            .with_context(|| format!("{} returned malformed evidence", self.name))?;

        if body.result_text.trim().is_empty() {
            return Err(anyhow!("{} returned empty evidence", self.name));
        }

        Ok(ToolReply {
            result_text: body.result_text,
            sources: body.sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_common::claim::ClaimType;

    #[tokio::test]
    async fn test_unreachable_sidecar_is_an_error() {
        let tool = HttpGroundingTool::new("web_search", "http://127.0.0.1:1/v1/search");
        let claim = Claim::new("water boils at 100C at sea level", ClaimType::Scientific);
        let err = tool.run(&claim).await.unwrap_err();
        assert!(err.to_string().contains("web_search"));
    }
}
