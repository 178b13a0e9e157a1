//! Desktop notification dispatch.
//!
//! Transitions must never wait on the desktop: `notify` returns
//! immediately and the actual `notify-send` invocation runs detached
//! with a hard time bound. A missing or hung notification daemon costs
//! a warn line, nothing more.

use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// How long a single notify-send invocation may take before it is
/// abandoned.
const NOTIFY_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Normal,
    Critical,
}

impl Urgency {
    fn flag(&self) -> &'static str {
        match self {
            Urgency::Normal => "normal",
            Urgency::Critical => "critical",
        }
    }
}

/// Something that can surface an event to the operator. Implementations
/// must not block the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, urgency: Urgency, summary: &str, body: &str);
}

/// Sends via `notify-send`. Requires a running tokio runtime.
pub struct CommandNotifier;

impl Notifier for CommandNotifier {
    fn notify(&self, urgency: Urgency, summary: &str, body: &str) {
        let summary = summary.to_string();
        let body = body.to_string();
        tokio::spawn(async move {
            let result = timeout(
                NOTIFY_TIMEOUT,
                tokio::process::Command::new("notify-send")
                    .arg("--urgency")
                    .arg(urgency.flag())
                    .arg("--app-name")
                    .arg("vigil")
                    .arg(&summary)
                    .arg(&body)
                    .status(),
            )
            .await;
            match result {
                Ok(Ok(status)) if status.success() => {}
                Ok(Ok(status)) => {
                    debug!(%summary, ?status, "notify-send exited non-zero");
                }
                Ok(Err(e)) => {
                    debug!(%summary, error = %e, "notify-send unavailable");
                }
                Err(_) => {
                    warn!(%summary, "notify-send timed out; notification dropped");
                }
            }
        });
    }
}

/// Discards everything. Used in tests and headless deployments.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _urgency: Urgency, _summary: &str, _body: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Test double that records what it was asked to send.
    pub struct RecordingNotifier {
        pub sent: Arc<Mutex<Vec<(Urgency, String)>>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, urgency: Urgency, summary: &str, _body: &str) {
            self.sent.lock().unwrap().push((urgency, summary.to_string()));
        }
    }

    #[test]
    fn test_urgency_flags() {
        assert_eq!(Urgency::Normal.flag(), "normal");
        assert_eq!(Urgency::Critical.flag(), "critical");
    }

    #[test]
    fn test_null_notifier_is_silent() {
        NullNotifier.notify(Urgency::Critical, "x", "y");
    }

    #[test]
    fn test_recording_notifier_captures() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let n = RecordingNotifier { sent: sent.clone() };
        n.notify(Urgency::Critical, "breaker opened", "detail");
        assert_eq!(sent.lock().unwrap().len(), 1);
    }
}
