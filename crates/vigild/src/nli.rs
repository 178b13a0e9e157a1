//! Entailment classifier adapter.
//!
//! HTTP client for the local NLI sidecar. The surface is infallible by
//! contract: any transport failure, timeout, non-2xx status, or
//! malformed probability triple degrades to the neutral sentinel
//! instead of surfacing an error, and downstream scoring treats the
//! sentinel as "no information". No cloud calls - all local.

use crate::metrics::Metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;
use vigil_common::config::ClassifierConfig;
use vigil_common::entailment::{EntailmentResult, PROB_SUM_TOLERANCE};

/// Asks whether a hypothesis follows from a premise.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, premise: &str, hypothesis: &str) -> EntailmentResult;
}

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    premise: &'a str,
    hypothesis: &'a str,
}

/// Wire reply from the sidecar. Only the triple matters; the label is
/// recomputed locally by argmax.
#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    /// [entailment, neutral, contradiction]
    probabilities: Vec<f64>,
}

/// Keep the final `max_chars` characters of an over-long input. The
/// tail carries the most recent context, which is what entailment
/// against a fresh claim needs.
pub fn truncate_tail(text: &str, max_chars: usize) -> (Cow<'_, str>, bool) {
    let count = text.chars().count();
    if count <= max_chars {
        (Cow::Borrowed(text), false)
    } else {
        (
            Cow::Owned(text.chars().skip(count - max_chars).collect()),
            true,
        )
    }
}

pub struct HttpClassifier {
    endpoint: String,
    timeout: Duration,
    max_input_chars: usize,
    metrics: Arc<Metrics>,
}

impl HttpClassifier {
    pub fn new(cfg: &ClassifierConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            endpoint: cfg.endpoint.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            max_input_chars: cfg.max_input_chars,
            metrics,
        }
    }

    async fn request(&self, premise: &str, hypothesis: &str) -> Result<[f64; 3], String> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| format!("client build failed: {}", e))?;

        let resp = client
            .post(&self.endpoint)
            .json(&ClassifyRequest { premise, hypothesis })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    "request timed out".to_string()
                } else if e.is_connect() {
                    format!("sidecar not reachable: {}", e)
                } else {
                    format!("transport error: {}", e)
                }
            })?;

        if !resp.status().is_success() {
            return Err(format!("status {}", resp.status()));
        }

        let body: ClassifyResponse = resp
            .json()
            .await
            .map_err(|e| format!("parse error: {}", e))?;

        let probs: [f64; 3] = body
            .probabilities
            .as_slice()
            .try_into()
            .map_err(|_| format!("expected 3 probabilities, got {}", body.probabilities.len()))?;

        let sum: f64 = probs.iter().sum();
        if (sum - 1.0).abs() > PROB_SUM_TOLERANCE {
            return Err(format!("probabilities sum to {:.4}", sum));
        }
        Ok(probs)
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, premise: &str, hypothesis: &str) -> EntailmentResult {
        // Empty input is a contract violation; release builds degrade
        // instead of panicking.
        if premise.trim().is_empty() || hypothesis.trim().is_empty() {
            debug_assert!(false, "empty classifier input");
            warn!("empty classifier input; returning neutral sentinel");
            self.metrics.record_classifier(true, 0);
            return EntailmentResult::degraded_sentinel();
        }

        let start = Instant::now();
        let (premise, premise_cut) = truncate_tail(premise, self.max_input_chars);
        let (hypothesis, hypothesis_cut) = truncate_tail(hypothesis, self.max_input_chars);
        let truncated = premise_cut || hypothesis_cut;

        let outcome = self.request(&premise, &hypothesis).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(probs) => EntailmentResult::from_probabilities(probs, truncated, latency_ms),
            Err(reason) => {
                warn!(%reason, "classifier degraded to neutral sentinel");
                let mut sentinel = EntailmentResult::degraded_sentinel();
                sentinel.truncated = truncated;
                sentinel.latency_ms = latency_ms;
                sentinel
            }
        };
        self.metrics.record_classifier(result.degraded, latency_ms);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_common::entailment::EntailmentLabel;

    #[test]
    fn test_short_input_passes_through_borrowed() {
        let (text, cut) = truncate_tail("hello", 10);
        assert_eq!(text, "hello");
        assert!(!cut);
        assert!(matches!(text, Cow::Borrowed(_)));
    }

    #[test]
    fn test_long_input_keeps_tail() {
        let input = "abcdefghij";
        let (text, cut) = truncate_tail(input, 4);
        assert_eq!(text, "ghij");
        assert!(cut);
    }

    #[test]
    fn test_truncation_counts_chars_not_bytes() {
        let input = "ααββγγδδ";
        let (text, cut) = truncate_tail(input, 4);
        assert_eq!(text, "γγδδ");
        assert!(cut);
    }

    #[test]
    fn test_exact_length_is_not_truncated() {
        let (_, cut) = truncate_tail("abcd", 4);
        assert!(!cut);
    }

    #[tokio::test]
    async fn test_unreachable_sidecar_degrades_to_sentinel() {
        // Port 1 refuses immediately; no real sidecar involved.
        let cfg = ClassifierConfig {
            endpoint: "http://127.0.0.1:1/v1/classify".to_string(),
            timeout_secs: 1,
            max_input_chars: 8,
        };
        let classifier = HttpClassifier::new(&cfg, Arc::new(Metrics::new()));

        let result = classifier
            .classify("a premise well beyond eight characters", "short")
            .await;
        assert!(result.degraded);
        assert_eq!(result.label, EntailmentLabel::Neutral);
        assert_eq!(result.confidence, 0.5);
        // Truncation happened before the transport failed.
        assert!(result.truncated);
    }
}
