//! Causally-ordered observation log for runner dispatch.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use sluice_store_core::Value;

/// How much the log records per dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Record nothing.
    #[default]
    Off,
    /// Record `{kind, claimed}` per event.
    Events,
    /// Additionally record the event payload.
    Data,
}

/// One observed dispatch: the event kind, the gate that claimed it (if
/// any), and at [`LogLevel::Data`] the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Kind of the dispatched event.
    pub kind: String,
    /// Name of the claiming gate, or `None` for an unclaimed event.
    pub claimed: Option<String>,
    /// Event payload, recorded only at [`LogLevel::Data`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// An append-only log of dispatch observations in causal order.
///
/// Entries appear in pre-order: an event's entry precedes every entry its
/// handling transitively produced. Cloning shares the underlying log.
#[derive(Debug, Clone)]
pub struct StreamLog {
    level: LogLevel,
    entries: Arc<RwLock<Vec<LogEntry>>>,
}

impl Default for StreamLog {
    fn default() -> Self {
        Self::new(LogLevel::default())
    }
}

impl StreamLog {
    /// Create an empty log recording at `level`.
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// The configured verbosity.
    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Append an observation. At [`LogLevel::Off`] this is a no-op.
    pub async fn record(&self, kind: &str, claimed: Option<&str>, data: &Value) {
        let entry = match self.level {
            LogLevel::Off => return,
            LogLevel::Events => LogEntry {
                kind: kind.to_owned(),
                claimed: claimed.map(str::to_owned),
                data: None,
            },
            LogLevel::Data => LogEntry {
                kind: kind.to_owned(),
                claimed: claimed.map(str::to_owned),
                data: Some(data.clone()),
            },
        };
        self.entries.write().await.push(entry);
    }

    /// Snapshot the entries in append order.
    pub async fn sample(&self) -> Vec<LogEntry> {
        self.entries.read().await.clone()
    }
}
