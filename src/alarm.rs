//! Wake-up alarms.
//!
//! The host environment provides named alarms that fire at or after a
//! wall-clock instant, optionally repeating. [`AlarmService`] is the seam;
//! [`TokioAlarms`] is the in-process implementation over spawned sleep
//! tasks. Alarm registrations are re-derivable from stored schedules, so
//! nothing here is persisted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::Result;

/// A named alarm going off.
///
/// `fired_at` can trail `scheduled_at` arbitrarily far when the process was
/// suspended; consumers decide how much drift they tolerate.
#[derive(Debug, Clone)]
pub struct AlarmFired {
    pub name: String,
    pub scheduled_at: DateTime<Utc>,
    pub fired_at: DateTime<Utc>,
}

/// Host-provided wake-up facility.
#[async_trait::async_trait]
pub trait AlarmService: Send + Sync {
    /// Register (or overwrite) the alarm `name` to fire at `at`, then every
    /// `repeat` thereafter when given.
    async fn set(&self, name: &str, at: DateTime<Utc>, repeat: Option<Duration>) -> Result<()>;

    /// Remove the alarm `name`. Returns whether one existed.
    async fn clear(&self, name: &str) -> Result<bool>;

    /// Earliest registered alarm, if any.
    async fn next_fire(&self) -> Option<(String, DateTime<Utc>)>;

    /// Subscribe to alarm firings.
    fn subscribe(&self) -> broadcast::Receiver<AlarmFired>;
}

struct AlarmEntry {
    at: DateTime<Utc>,
    cancel: CancellationToken,
}

/// In-process [`AlarmService`] over spawned tokio timers.
///
/// Each registration owns a task that sleeps until the target instant,
/// broadcasts the firing, and either reschedules itself (repeating alarms)
/// or removes its registry entry. Re-registering a name cancels the old
/// task first, so `set` is overwrite-idempotent.
pub struct TokioAlarms {
    entries: Arc<Mutex<HashMap<String, AlarmEntry>>>,
    tx: broadcast::Sender<AlarmFired>,
}

impl Default for TokioAlarms {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioAlarms {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(32);
        Self { entries: Arc::new(Mutex::new(HashMap::new())), tx }
    }
}

#[async_trait::async_trait]
impl AlarmService for TokioAlarms {
    async fn set(&self, name: &str, at: DateTime<Utc>, repeat: Option<Duration>) -> Result<()> {
        let cancel = CancellationToken::new();
        {
            let mut entries = self.entries.lock().expect("alarm registry poisoned");
            if let Some(previous) = entries.insert(
                name.to_string(),
                AlarmEntry { at, cancel: cancel.clone() },
            ) {
                previous.cancel.cancel();
            }
        }
        debug!(name, %at, ?repeat, "alarm set");

        let name = name.to_string();
        let entries = Arc::clone(&self.entries);
        let tx = self.tx.clone();
        tokio::spawn(alarm_task(name, at, repeat, entries, tx, cancel));
        Ok(())
    }

    async fn clear(&self, name: &str) -> Result<bool> {
        let removed = self.entries.lock().expect("alarm registry poisoned").remove(name);
        match removed {
            Some(entry) => {
                entry.cancel.cancel();
                debug!(name, "alarm cleared");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn next_fire(&self) -> Option<(String, DateTime<Utc>)> {
        self.entries
            .lock()
            .expect("alarm registry poisoned")
            .iter()
            .min_by_key(|(_, entry)| entry.at)
            .map(|(name, entry)| (name.clone(), entry.at))
    }

    fn subscribe(&self) -> broadcast::Receiver<AlarmFired> {
        self.tx.subscribe()
    }
}

async fn alarm_task(
    name: String,
    mut at: DateTime<Utc>,
    repeat: Option<Duration>,
    entries: Arc<Mutex<HashMap<String, AlarmEntry>>>,
    tx: broadcast::Sender<AlarmFired>,
    cancel: CancellationToken,
) {
    loop {
        let wait = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::select! {
            _ = cancel.cancelled() => {
                trace!(%name, "alarm task cancelled");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        let fired = AlarmFired { name: name.clone(), scheduled_at: at, fired_at: Utc::now() };
        if tx.send(fired).is_err() {
            warn!(%name, "alarm fired with no subscribers");
        }

        match repeat {
            Some(period) => {
                at += chrono::Duration::from_std(period)
                    .unwrap_or_else(|_| chrono::Duration::days(1));
                let mut registry = entries.lock().expect("alarm registry poisoned");
                match registry.get_mut(&name) {
                    // Keep the registry's next-fire time current.
                    Some(entry) if !entry.cancel.is_cancelled() => entry.at = at,
                    _ => return,
                }
            }
            None => {
                let mut registry = entries.lock().expect("alarm registry poisoned");
                if let Some(entry) = registry.get(&name) {
                    if !entry.cancel.is_cancelled() && entry.at == at {
                        registry.remove(&name);
                    }
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn alarm_fires_and_clears_itself() {
        let alarms = TokioAlarms::new();
        let mut rx = alarms.subscribe();

        let at = Utc::now() + chrono::Duration::milliseconds(50);
        alarms.set("once", at, None).await.unwrap();
        assert!(alarms.next_fire().await.is_some());

        let fired = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("fires in time")
            .expect("broadcast open");
        assert_eq!(fired.name, "once");
        assert_eq!(fired.scheduled_at, at);

        // One-shot alarms vanish from the registry after firing.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(alarms.next_fire().await.is_none());
    }

    #[tokio::test]
    async fn repeating_alarm_stays_registered() {
        let alarms = TokioAlarms::new();
        let mut rx = alarms.subscribe();

        let at = Utc::now() + chrono::Duration::milliseconds(30);
        alarms.set("daily", at, Some(Duration::from_millis(60))).await.unwrap();

        for _ in 0..2 {
            tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("fires in time")
                .expect("broadcast open");
        }
        assert!(alarms.next_fire().await.is_some());
        assert!(alarms.clear("daily").await.unwrap());
        assert!(alarms.next_fire().await.is_none());
    }

    #[tokio::test]
    async fn re_registration_overwrites() {
        let alarms = TokioAlarms::new();
        let mut rx = alarms.subscribe();

        // First registration far in the future, second imminent.
        alarms.set("s1", Utc::now() + chrono::Duration::hours(6), None).await.unwrap();
        let soon = Utc::now() + chrono::Duration::milliseconds(40);
        alarms.set("s1", soon, None).await.unwrap();

        let fired = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("fires in time")
            .expect("broadcast open");
        assert_eq!(fired.scheduled_at, soon);
    }

    #[tokio::test]
    async fn clear_of_unknown_alarm_reports_absence() {
        let alarms = TokioAlarms::new();
        assert!(!alarms.clear("ghost").await.unwrap());
    }
}
