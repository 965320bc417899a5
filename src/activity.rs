//! Activity log.
//!
//! Every component reports noteworthy steps here. Entries land in the
//! store's bounded newest-first log for the status surface and are mirrored
//! to `tracing` for operators. A store that cannot accept the entry only
//! costs a diagnostic, never the flow.

use std::sync::Arc;

use tracing::warn;

use crate::store::Store;
use crate::types::{LogEntry, Severity};

/// Shared handle for appending activity log entries.
#[derive(Clone)]
pub struct ActivityLog {
    store: Arc<dyn Store>,
}

impl ActivityLog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.record(LogEntry::now(Severity::Info, message)).await;
    }

    pub async fn warn(&self, message: impl Into<String>) {
        self.record(LogEntry::now(Severity::Warn, message)).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.record(LogEntry::now(Severity::Error, message)).await;
    }

    /// Append a prepared entry, mirroring it to `tracing`.
    pub async fn record(&self, entry: LogEntry) {
        match entry.severity {
            Severity::Info => tracing::info!(target: "skywave::activity", "{}", entry.message),
            Severity::Warn => tracing::warn!(target: "skywave::activity", "{}", entry.message),
            Severity::Error => tracing::error!(target: "skywave::activity", "{}", entry.message),
        }
        if let Err(err) = self.store.push_log(entry).await {
            warn!(%err, "failed to persist activity log entry");
        }
    }
}
