//! Persisted state.
//!
//! Three independent records live behind the [`Store`] seam: settings
//! (defaults merged on read, saved by field-wise merge), schedules (an
//! ordered list keyed by id, saved by wholesale replacement), and the
//! bounded activity log. [`MemoryStore`] keeps everything in process;
//! [`JsonStore`] persists the three records as a single JSON document.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RecorderError, Result};
use crate::types::{LOG_CAPACITY, LogEntry, Schedule, Settings, SettingsPatch};

/// Persistent key-value store contract.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Load settings with defaults merged over missing fields.
    async fn load_settings(&self) -> Result<Settings>;

    /// Merge a partial update over the stored settings; returns the merged
    /// result.
    async fn save_settings(&self, patch: SettingsPatch) -> Result<Settings>;

    /// Load all schedules in stored order.
    async fn load_schedules(&self) -> Result<Vec<Schedule>>;

    /// Replace the schedule list wholesale.
    async fn replace_schedules(&self, schedules: Vec<Schedule>) -> Result<()>;

    /// Newest-first slice of the activity log.
    async fn recent_log(&self, limit: usize) -> Result<Vec<LogEntry>>;

    /// Prepend a log entry, dropping the oldest past [`LOG_CAPACITY`].
    async fn push_log(&self, entry: LogEntry) -> Result<()>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Records {
    settings: Settings,
    schedules: Vec<Schedule>,
    logs: Vec<LogEntry>,
}

fn push_bounded(logs: &mut Vec<LogEntry>, entry: LogEntry) {
    logs.insert(0, entry);
    logs.truncate(LOG_CAPACITY);
}

/// In-process store; the default for tests and embedders that manage their
/// own persistence.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn load_settings(&self) -> Result<Settings> {
        Ok(self.records.lock().expect("store poisoned").settings.clone())
    }

    async fn save_settings(&self, patch: SettingsPatch) -> Result<Settings> {
        let mut records = self.records.lock().expect("store poisoned");
        records.settings = records.settings.merged(patch);
        Ok(records.settings.clone())
    }

    async fn load_schedules(&self) -> Result<Vec<Schedule>> {
        Ok(self.records.lock().expect("store poisoned").schedules.clone())
    }

    async fn replace_schedules(&self, schedules: Vec<Schedule>) -> Result<()> {
        self.records.lock().expect("store poisoned").schedules = schedules;
        Ok(())
    }

    async fn recent_log(&self, limit: usize) -> Result<Vec<LogEntry>> {
        let records = self.records.lock().expect("store poisoned");
        Ok(records.logs.iter().take(limit).cloned().collect())
    }

    async fn push_log(&self, entry: LogEntry) -> Result<()> {
        push_bounded(&mut self.records.lock().expect("store poisoned").logs, entry);
        Ok(())
    }
}

/// File-backed store holding the three records in one JSON document.
///
/// Every mutation is a read-modify-write of the whole document; writes go
/// through a temp file rename so a crash never leaves a torn document.
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read(&self) -> Result<Records> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let records = serde_json::from_slice(&bytes)
                    .context("malformed store document")
                    .map_err(|err| RecorderError::config_load(format!("{err:#}")))?;
                Ok(records)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "store document absent, using defaults");
                Ok(Records::default())
            }
            Err(err) => Err(RecorderError::store_with_source(
                format!("failed to read {}", self.path.display()),
                Box::new(err),
            )),
        }
    }

    async fn write(&self, records: &Records) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(records)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await.map_err(|err| {
            RecorderError::store_with_source(
                format!("failed to write {}", tmp.display()),
                Box::new(err),
            )
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|err| {
            RecorderError::store_with_source(
                format!("failed to replace {}", self.path.display()),
                Box::new(err),
            )
        })?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Store for JsonStore {
    async fn load_settings(&self) -> Result<Settings> {
        Ok(self.read().await?.settings)
    }

    async fn save_settings(&self, patch: SettingsPatch) -> Result<Settings> {
        let mut records = self.read().await?;
        records.settings = records.settings.merged(patch);
        self.write(&records).await?;
        Ok(records.settings)
    }

    async fn load_schedules(&self) -> Result<Vec<Schedule>> {
        Ok(self.read().await?.schedules)
    }

    async fn replace_schedules(&self, schedules: Vec<Schedule>) -> Result<()> {
        let mut records = self.read().await?;
        records.schedules = schedules;
        self.write(&records).await
    }

    async fn recent_log(&self, limit: usize) -> Result<Vec<LogEntry>> {
        Ok(self.read().await?.logs.into_iter().take(limit).collect())
    }

    async fn push_log(&self, entry: LogEntry) -> Result<()> {
        let mut records = self.read().await?;
        push_bounded(&mut records.logs, entry);
        self.write(&records).await
    }
}
