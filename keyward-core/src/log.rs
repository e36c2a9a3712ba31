//! Append-only action log.
//!
//! Every reportable step of a ceremony lands here, newest first. Front ends
//! render it directly or follow it live through [`ActionLog::subscribe`].

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Capacity of the live subscription channel. Slow subscribers observe
/// `RecvError::Lagged` but the log itself never drops entries.
const SUBSCRIBER_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Pass,
    Fail,
    Warn,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Pass => write!(f, "pass"),
            Self::Fail => write!(f, "fail"),
            Self::Warn => write!(f, "warn"),
        }
    }
}

/// One immutable log record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionEntry {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
}

/// Observable, newest-first sequence of [`ActionEntry`] values.
pub struct ActionLog {
    entries: Mutex<VecDeque<ActionEntry>>,
    live: broadcast::Sender<ActionEntry>,
}

impl ActionLog {
    pub fn new() -> Self {
        let (live, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        Self {
            entries: Mutex::new(VecDeque::new()),
            live,
        }
    }

    /// Prepend an entry and publish it to subscribers.
    pub fn record(
        &self,
        label: impl Into<String>,
        detail: Option<serde_json::Value>,
        severity: Severity,
    ) -> ActionEntry {
        let entry = ActionEntry {
            label: label.into(),
            detail,
            timestamp: Utc::now(),
            severity,
        };

        match severity {
            Severity::Fail => tracing::warn!(label = %entry.label, severity = %severity, "Action"),
            Severity::Warn => tracing::info!(label = %entry.label, severity = %severity, "Action"),
            Severity::Info | Severity::Pass => {
                tracing::debug!(label = %entry.label, severity = %severity, "Action")
            }
        }

        // Publish under the lock so subscribers see entries in stored order.
        let mut entries = self.lock();
        entries.push_front(entry.clone());
        // No receivers is fine; the entry is already stored.
        let _ = self.live.send(entry.clone());
        drop(entries);
        entry
    }

    pub fn info(&self, label: impl Into<String>, detail: Option<serde_json::Value>) -> ActionEntry {
        self.record(label, detail, Severity::Info)
    }

    pub fn pass(&self, label: impl Into<String>, detail: Option<serde_json::Value>) -> ActionEntry {
        self.record(label, detail, Severity::Pass)
    }

    pub fn warn(&self, label: impl Into<String>, detail: Option<serde_json::Value>) -> ActionEntry {
        self.record(label, detail, Severity::Warn)
    }

    pub fn fail(&self, label: impl Into<String>, detail: Option<serde_json::Value>) -> ActionEntry {
        self.record(label, detail, Severity::Fail)
    }

    /// Follow new entries as they are recorded.
    pub fn subscribe(&self) -> broadcast::Receiver<ActionEntry> {
        self.live.subscribe()
    }

    /// Snapshot of all entries, newest first.
    pub fn entries(&self) -> Vec<ActionEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<ActionEntry> {
        self.lock().front().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of entries with the given severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.lock().iter().filter(|e| e.severity == severity).count()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ActionEntry>> {
        // A panicking writer cannot leave a half-inserted entry behind.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ActionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionLog")
            .field("len", &self.len())
            .finish()
    }
}
