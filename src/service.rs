//! Service wiring and the status/management surface.
//!
//! [`spawn`] connects the engine, scheduler, and collaborators and returns
//! the [`ServiceHandle`] presentation layers talk to. The handle is a pure
//! consumer of the engine's status surface plus the management operations
//! over stored settings and schedules; it never mutates engine state
//! directly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

use crate::activity::ActivityLog;
use crate::alarm::AlarmService;
use crate::capture::CaptureContextFactory;
use crate::delivery::Delivery;
use crate::engine::{Engine, EngineChannels, EngineCommand, EngineDeps};
use crate::error::{RecorderError, Result};
use crate::scheduler::{Scheduler, sync_alarm, sync_all};
use crate::store::Store;
use crate::types::{
    EngineStatus, LogEntry, RecordingParams, Schedule, Settings, SettingsPatch,
};

/// The next scheduled wake-up, derived from stored schedules.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextWakeup {
    pub schedule_id: String,
    pub at: DateTime<Utc>,
}

/// Read-side projection for presentation layers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub engine: EngineStatus,
    pub next_wakeup: Option<NextWakeup>,
}

/// Handle to a running recorder service.
pub struct ServiceHandle {
    store: Arc<dyn Store>,
    alarms: Arc<dyn AlarmService>,
    log: ActivityLog,
    status: watch::Receiver<EngineStatus>,
    commands: mpsc::Sender<EngineCommand>,
    engine_cancel: CancellationToken,
    scheduler_cancel: CancellationToken,
}

/// Wire the collaborators, re-register schedule alarms from the store, and
/// spawn the engine and scheduler tasks.
pub async fn spawn(
    store: Arc<dyn Store>,
    alarms: Arc<dyn AlarmService>,
    capture: Arc<dyn CaptureContextFactory>,
    delivery: Arc<dyn Delivery>,
) -> Result<ServiceHandle> {
    let log = ActivityLog::new(Arc::clone(&store));

    // Alarm registrations live only in memory; rebuild them from the
    // stored schedules on every startup.
    sync_all(&*store, &*alarms).await?;

    let EngineChannels { status, commands, cancel: engine_cancel } = Engine::spawn(EngineDeps {
        store: Arc::clone(&store),
        alarms: Arc::clone(&alarms),
        delivery,
        capture,
        log: log.clone(),
    });

    let scheduler_cancel = Scheduler::spawn(
        Arc::clone(&store),
        Arc::clone(&alarms),
        log.clone(),
        commands.clone(),
    );

    log.info("recorder service started").await;

    Ok(ServiceHandle {
        store,
        alarms,
        log,
        status,
        commands,
        engine_cancel,
        scheduler_cancel,
    })
}

impl ServiceHandle {
    /// Submit a recording flow.
    ///
    /// The engine enforces its own entry guard; a busy rejection shows up
    /// in the activity log, not here.
    pub async fn start_recording(&self, params: RecordingParams) -> Result<()> {
        self.commands
            .send(EngineCommand::Start(params))
            .await
            .map_err(|_| RecorderError::connection_failed("engine task is gone"))
    }

    /// Ask the engine to stop the current recording, or reset a lingering
    /// error state.
    pub async fn stop_recording(&self) -> Result<()> {
        self.commands
            .send(EngineCommand::Stop)
            .await
            .map_err(|_| RecorderError::connection_failed("engine task is gone"))
    }

    /// Latest engine status snapshot.
    pub fn engine_status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }

    /// Stream of engine status snapshots, starting with the current one.
    pub fn status_updates(&self) -> impl Stream<Item = EngineStatus> + 'static {
        WatchStream::new(self.status.clone())
    }

    /// Full status projection: engine snapshot plus the next scheduled
    /// wake-up (the engine's internal watchdog alarm is not a wake-up).
    pub async fn status(&self) -> Result<StatusReport> {
        let schedules = self.store.load_schedules().await?;
        let now = Utc::now();
        let next_wakeup = schedules
            .iter()
            .filter(|schedule| schedule.enabled)
            .map(|schedule| NextWakeup {
                schedule_id: schedule.id.clone(),
                at: schedule.next_occurrence(now),
            })
            .min_by_key(|wakeup| wakeup.at);

        Ok(StatusReport { engine: self.engine_status(), next_wakeup })
    }

    /// Current settings, defaults merged.
    pub async fn settings(&self) -> Result<Settings> {
        self.store.load_settings().await
    }

    /// Merge a partial settings update over the stored values.
    pub async fn update_settings(&self, patch: SettingsPatch) -> Result<Settings> {
        let merged = self.store.save_settings(patch).await?;
        self.log.info("settings updated").await;
        Ok(merged)
    }

    /// All stored schedules.
    pub async fn schedules(&self) -> Result<Vec<Schedule>> {
        self.store.load_schedules().await
    }

    /// Insert or update a schedule and register its wake-up.
    ///
    /// The stored list is replaced wholesale; the alarm registration is
    /// re-derived from the new definition.
    pub async fn put_schedule(&self, schedule: Schedule) -> Result<()> {
        schedule.validate()?;

        let mut schedules = self.store.load_schedules().await?;
        match schedules.iter_mut().find(|existing| existing.id == schedule.id) {
            Some(existing) => *existing = schedule.clone(),
            None => schedules.push(schedule.clone()),
        }
        self.store.replace_schedules(schedules).await?;

        sync_alarm(&*self.alarms, &schedule).await?;
        self.log.info(format!("schedule '{}' saved", schedule.id)).await;
        Ok(())
    }

    /// Delete a schedule and clear its wake-up.
    pub async fn remove_schedule(&self, id: &str) -> Result<()> {
        let schedules = self.store.load_schedules().await?;
        let remaining: Vec<Schedule> =
            schedules.into_iter().filter(|schedule| schedule.id != id).collect();
        self.store.replace_schedules(remaining).await?;

        self.alarms.clear(id).await?;
        self.log.info(format!("schedule '{id}' removed")).await;
        Ok(())
    }

    /// Newest-first slice of the activity log.
    pub async fn recent_log(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.store.recent_log(limit).await
    }

    /// Stop the engine and scheduler tasks.
    pub async fn shutdown(&self) {
        self.log.info("recorder service stopping").await;
        self.engine_cancel.cancel();
        self.scheduler_cancel.cancel();
    }
}
