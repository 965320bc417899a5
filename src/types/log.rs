//! Activity log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of retained log entries; older entries are dropped.
pub const LOG_CAPACITY: usize = 200;

/// Severity of an activity log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// One entry of the bounded, newest-first activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    /// Optional structured payload (frequencies, filenames, error details).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// Build an entry stamped with the current time.
    pub fn now(severity: Severity, message: impl Into<String>) -> Self {
        Self { timestamp: Utc::now(), severity, message: message.into(), details: None }
    }

    /// Attach a structured payload.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
