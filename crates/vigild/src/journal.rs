//! Append-only JSONL journal of breaker transitions and notable signals.
//!
//! One file per day under the configured journal directory, e.g.
//! `/var/lib/vigil/journal/vigil-2026-08-23.jsonl`. Every line is a
//! self-contained JSON object. Journal failures are logged and
//! swallowed: record-keeping must never take the control core down.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use tokio::fs::{create_dir_all, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// One journal line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Timestamp (ISO 8601)
    pub ts: DateTime<Utc>,
    /// Entry kind (breaker, tick, grounding, responder)
    pub kind: String,
    /// Kind-specific payload
    pub detail: Value,
}

pub struct Journal {
    dir: PathBuf,
}

impl Journal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Append one entry. Errors are downgraded to a warning.
    pub async fn record(&self, kind: &str, detail: Value) {
        let entry = JournalEntry {
            ts: Utc::now(),
            kind: kind.to_string(),
            detail,
        };
        if let Err(e) = self.write_entry(&entry).await {
            warn!(kind, error = %e, "failed to write journal entry");
        }
    }

    async fn write_entry(&self, entry: &JournalEntry) -> Result<()> {
        create_dir_all(&self.dir)
            .await
            .context("Failed to create journal directory")?;

        let path = self
            .dir
            .join(format!("vigil-{}.jsonl", entry.ts.format("%Y-%m-%d")));
        let json = serde_json::to_string(entry)? + "\n";

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .context("Failed to open journal file")?;

        file.write_all(json.as_bytes())
            .await
            .context("Failed to append journal entry")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_record_appends_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path());

        journal.record("breaker", json!({ "event": "opened" })).await;
        journal.record("tick", json!({ "outcome": "ran" })).await;

        let file = std::fs::read_dir(dir.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        let contents = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: JournalEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.kind, "breaker");
        assert_eq!(first.detail["event"], "opened");
    }

    #[tokio::test]
    async fn test_file_is_date_stamped() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path());
        journal.record("tick", json!({})).await;

        let name = std::fs::read_dir(dir.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .file_name();
        let name = name.to_string_lossy().to_string();
        assert!(name.starts_with("vigil-"));
        assert!(name.ends_with(".jsonl"));
    }

    #[tokio::test]
    async fn test_unwritable_dir_does_not_panic() {
        let journal = Journal::new("/proc/no-such-dir/journal");
        journal.record("breaker", json!({})).await;
    }
}
