//! Session-scoped append-only audit log
//!
//! Each session gets its own `session_<id>.jsonl` file. Every entry is one
//! serialized JSON object terminated by a newline, so a crash mid-session
//! never corrupts entries already on disk. Entries are never rewritten.
//!
//! Writing an entry is best-effort from the caller's point of view: the store
//! and the CLI report append failures via `tracing::warn!` and carry on,
//! because memory persistence is authoritative and logging is not.

use crate::error::{Error, Result};
use crate::memory::MemoryCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// The kind of event an audit entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    /// A whole-collection save
    Save,
    /// A single-record insert or replace
    Upsert,
    /// A hard delete
    Remove,
    /// A purge of completed todos
    Purge,
    /// A reconciliation transaction (merge of a candidate update)
    Reconciliation,
    /// A reported error
    Error,
}

/// One structured audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the event happened
    pub timestamp: DateTime<Utc>,
    /// What kind of event this is
    pub event: AuditEventKind,
    /// The affected category, when the event is category-scoped
    #[serde(default)]
    pub category: Option<MemoryCategory>,
    /// Free-form event details (diff summary, record id, error text)
    pub summary: serde_json::Value,
}

/// Append-only session audit log
pub struct AuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl AuditLog {
    /// Open the log for a session, creating `log_dir` and
    /// `session_<session_id>.jsonl` as needed. Appends to an existing file
    /// so a reopened session never loses prior entries.
    pub async fn open(log_dir: &Path, session_id: &str) -> Result<Self> {
        tokio::fs::create_dir_all(log_dir).await?;
        let path = log_dir.join(format!("session_{session_id}.jsonl"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Open an existing session log for inspection. A missing session is an
    /// error; unlike [`AuditLog::open`], nothing is created on disk.
    pub async fn open_existing(log_dir: &Path, session_id: &str) -> Result<Self> {
        let path = log_dir.join(format!("session_{session_id}.jsonl"));
        let file = match OpenOptions::new().append(true).open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::Audit(format!(
                    "no session log at {}",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the session log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry as a single terminated line.
    pub async fn append(
        &self,
        event: AuditEventKind,
        category: Option<MemoryCategory>,
        summary: serde_json::Value,
    ) -> Result<()> {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            category,
            summary,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Record a store mutation on one category.
    pub async fn record_mutation(
        &self,
        event: AuditEventKind,
        category: MemoryCategory,
        summary: serde_json::Value,
    ) -> Result<()> {
        self.append(event, Some(category), summary).await
    }

    /// Record the outcome of a reconciliation transaction.
    pub async fn record_reconciliation(&self, summary: serde_json::Value) -> Result<()> {
        self.append(AuditEventKind::Reconciliation, None, summary)
            .await
    }

    /// Record an error the caller chose to continue past.
    pub async fn record_error(&self, context: &str, message: &str) -> Result<()> {
        self.append(
            AuditEventKind::Error,
            None,
            serde_json::json!({ "context": context, "message": message }),
        )
        .await
    }

    /// Return the last `n` entries of the session log.
    pub async fn tail(&self, n: usize) -> Result<Vec<AuditEntry>> {
        let entries = self.read_all().await?;
        let skip = entries.len().saturating_sub(n);
        Ok(entries.into_iter().skip(skip).collect())
    }

    /// Per-event-kind counts for the session, for quick inspection.
    pub async fn session_summary(&self) -> Result<BTreeMap<AuditEventKind, usize>> {
        let entries = self.read_all().await?;
        let mut counts = BTreeMap::new();
        for entry in entries {
            *counts.entry(entry.event).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Flush buffered entries to disk and close the log.
    pub async fn close(self) -> Result<()> {
        let file = self.file.into_inner();
        file.sync_all().await?;
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<AuditEntry>> {
        // Hold the writer lock so a concurrent append cannot be half-read
        let _guard = self.file.lock().await;
        let data = tokio::fs::read_to_string(&self.path).await?;
        let mut entries = Vec::new();
        for (idx, line) in data.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: AuditEntry = serde_json::from_str(line).map_err(|e| {
                Error::Audit(format!(
                    "unparseable entry at {}:{}: {e}",
                    self.path.display(),
                    idx + 1
                ))
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }
}
