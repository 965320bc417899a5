//! Recording orchestration engine.
//!
//! A single spawned task owns all mutable recording state and drives every
//! flow: settings load, channel negotiation, capture hand-off, watchdog,
//! finalization. Everything else talks to it through [`EngineChannels`]:
//! commands in over an mpsc sender, status snapshots out over a watch
//! receiver, shutdown via the cancellation token.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::activity::ActivityLog;
use crate::alarm::AlarmService;
use crate::capture::{CaptureContextFactory, CaptureProxy};
use crate::delivery::Delivery;
use crate::store::Store;
use crate::types::{EngineStatus, RecordingParams};

mod runner;

use runner::EngineCore;

/// Name of the engine's backup wake-up alarm.
///
/// Armed for every recording slightly past the capture context's own stop
/// timer; if the context goes silent, this alarm is what ends the flow.
pub const WATCHDOG_ALARM: &str = "capture-watchdog";

/// Response budget for a single tune command.
pub(crate) const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Settling pause between the two tune commands; some rigs drop a command
/// that arrives while the previous one is still being applied.
pub(crate) const INTER_COMMAND_DELAY: Duration = Duration::from_millis(200);

/// How long a stop request waits for the capture context to finish on its
/// own before the context is force-closed.
pub(crate) const GRACEFUL_STOP_WAIT: Duration = Duration::from_secs(2);

/// Preferred capture encoding.
pub(crate) const PREFERRED_MIME: &str = "audio/webm";

/// Commands accepted by the engine task.
#[derive(Debug)]
pub enum EngineCommand {
    /// Start a recording flow. Rejected with a log entry unless the engine
    /// is idle; a previous error state is cleared first.
    Start(RecordingParams),
    /// Stop the current recording, or reset an error state.
    Stop,
}

/// Collaborators the engine drives.
pub struct EngineDeps {
    pub store: Arc<dyn Store>,
    pub alarms: Arc<dyn AlarmService>,
    pub delivery: Arc<dyn Delivery>,
    pub capture: Arc<dyn CaptureContextFactory>,
    pub log: ActivityLog,
}

/// Result of spawning the engine task.
pub struct EngineChannels {
    /// Receiver for status snapshots; updated on every transition.
    pub status: watch::Receiver<EngineStatus>,
    /// Sender for engine commands.
    pub commands: mpsc::Sender<EngineCommand>,
    /// Cancellation token for graceful shutdown.
    pub cancel: CancellationToken,
}

/// Engine spawns and manages the recording orchestration task.
pub struct Engine;

impl Engine {
    /// Spawn the engine task with the given collaborators.
    ///
    /// Returns the command sender, status receiver, and a cancellation
    /// token for shutdown.
    pub fn spawn(deps: EngineDeps) -> EngineChannels {
        let (status_tx, status_rx) = watch::channel(EngineStatus::default());
        let (command_tx, command_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let cancel = CancellationToken::new();
        let alarm_rx = deps.alarms.subscribe();
        let capture = CaptureProxy::new(Arc::clone(&deps.capture), event_tx);
        let core = EngineCore::new(deps, status_tx, capture);

        tokio::spawn(runner::run(core, command_rx, event_rx, alarm_rx, cancel.clone()));

        EngineChannels { status: status_rx, commands: command_tx, cancel }
    }
}
