//! Schedule-to-alarm translation and fired-alarm handling.
//!
//! Alarm registrations carry no state of their own: each one is re-derived
//! from the stored schedule with the same identifier, so [`sync_all`] can
//! rebuild every registration after a process restart. The scheduler task
//! consumes firings, filters out stale ones, and submits recording flows to
//! the engine.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::activity::ActivityLog;
use crate::alarm::{AlarmFired, AlarmService};
use crate::engine::{EngineCommand, WATCHDOG_ALARM};
use crate::error::{RecorderError, Result};
use crate::store::Store;
use crate::types::{Repeat, Schedule};

/// A wake-up that fires further than this many seconds from its scheduled
/// time is considered stale and skipped.
const MAX_FIRE_DRIFT_SECS: i64 = 5 * 60;

/// Repeat period for daily schedules.
const DAILY: Duration = Duration::from_secs(24 * 60 * 60);

/// Register (or clear) the wake-up for one schedule.
///
/// Disabled schedules get their alarm cleared; enabled ones get an alarm at
/// the next occurrence of their start time, repeating daily when the
/// schedule does. Re-registration under the same id overwrites.
pub async fn sync_alarm(alarms: &dyn AlarmService, schedule: &Schedule) -> Result<()> {
    if !schedule.enabled {
        alarms.clear(&schedule.id).await?;
        debug!(id = %schedule.id, "schedule disabled, alarm cleared");
        return Ok(());
    }

    let at = schedule.next_occurrence(Utc::now());
    let repeat = match schedule.repeat {
        Repeat::Daily => Some(DAILY),
        Repeat::Once => None,
    };
    alarms.set(&schedule.id, at, repeat).await?;
    debug!(id = %schedule.id, %at, "schedule alarm registered");
    Ok(())
}

/// Rebuild every alarm registration from the stored schedules.
///
/// In-memory alarm state does not survive a process restart; this runs at
/// service startup to reconstruct it.
pub async fn sync_all(store: &dyn Store, alarms: &dyn AlarmService) -> Result<()> {
    let schedules = store.load_schedules().await?;
    info!(count = schedules.len(), "registering schedule alarms");
    for schedule in &schedules {
        sync_alarm(alarms, schedule).await?;
    }
    Ok(())
}

/// Scheduler spawns the fired-alarm consumer task.
pub struct Scheduler;

impl Scheduler {
    pub fn spawn(
        store: Arc<dyn Store>,
        alarms: Arc<dyn AlarmService>,
        log: ActivityLog,
        engine: mpsc::Sender<EngineCommand>,
    ) -> CancellationToken {
        let cancel = CancellationToken::new();
        let fired_rx = alarms.subscribe();
        tokio::spawn(run(store, alarms, log, engine, fired_rx, cancel.clone()));
        cancel
    }
}

async fn run(
    store: Arc<dyn Store>,
    alarms: Arc<dyn AlarmService>,
    log: ActivityLog,
    engine: mpsc::Sender<EngineCommand>,
    mut fired_rx: broadcast::Receiver<AlarmFired>,
    cancel: CancellationToken,
) {
    info!("scheduler task started");
    loop {
        let fired = tokio::select! {
            _ = cancel.cancelled() => break,
            fired = fired_rx.recv() => match fired {
                Ok(fired) => fired,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "scheduler missed alarm firings");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };

        if fired.name == WATCHDOG_ALARM {
            continue; // the engine's safety net, not a schedule
        }
        if let Err(err) = handle_fired(&*store, &*alarms, &log, &engine, &fired).await {
            log.error(format!("schedule '{}' failed to start: {err}", fired.name)).await;
        }
    }
    info!("scheduler task ended");
}

/// React to one fired schedule alarm.
///
/// Stale firings (drift over five minutes, e.g. after a long host suspend)
/// are skipped with a warning rather than recording the wrong thing late.
/// One-shot schedules are deleted once fired, skipped or not.
async fn handle_fired(
    store: &dyn Store,
    alarms: &dyn AlarmService,
    log: &ActivityLog,
    engine: &mpsc::Sender<EngineCommand>,
    fired: &AlarmFired,
) -> Result<()> {
    let drift = fired.fired_at - fired.scheduled_at;
    let stale = drift.num_seconds().abs() > MAX_FIRE_DRIFT_SECS;

    let schedules = store.load_schedules().await?;
    let schedule = schedules.iter().find(|schedule| schedule.id == fired.name);

    let Some(schedule) = schedule else {
        debug!(name = %fired.name, "alarm fired for an unknown schedule, clearing");
        alarms.clear(&fired.name).await?;
        return Ok(());
    };

    let one_shot = schedule.repeat == Repeat::Once;
    let params = schedule.params();
    let enabled = schedule.enabled;

    if one_shot {
        let remaining: Vec<Schedule> =
            schedules.iter().filter(|s| s.id != fired.name).cloned().collect();
        store.replace_schedules(remaining).await?;
        alarms.clear(&fired.name).await?;
    }

    if stale {
        let rejection = RecorderError::StaleAlarm { drift_secs: drift.num_seconds() };
        log.warn(format!("schedule '{}': {rejection}", fired.name)).await;
        return Ok(());
    }
    if !enabled {
        debug!(id = %fired.name, "schedule disabled, skipping fired alarm");
        return Ok(());
    }

    log.info(format!("schedule '{}' fired", fired.name)).await;
    engine
        .send(EngineCommand::Start(params))
        .await
        .map_err(|_| RecorderError::connection_failed("engine task is gone"))?;
    Ok(())
}
