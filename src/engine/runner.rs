//! Engine task internals: state, transitions, and the flow sequence.

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    EngineCommand, EngineDeps, GRACEFUL_STOP_WAIT, INTER_COMMAND_DELAY, PREFERRED_MIME,
    RESPONSE_TIMEOUT, WATCHDOG_ALARM,
};
use crate::alarm::AlarmFired;
use crate::capture::{CaptureArtifact, CaptureCommand, CaptureEvent, CaptureProxy};
use crate::channel::{CommandChannel, ConnectPolicy};
use crate::error::{RecorderError, Result};
use crate::filename;
use crate::protocol::RigCommand;
use crate::stream::ProgressTicker;
use crate::types::{EngineState, EngineStatus, RecordingParams, Settings};

/// Single owner of all mutable recording state.
pub(super) struct EngineCore {
    deps: EngineDeps,
    status: EngineStatus,
    status_tx: tokio::sync::watch::Sender<EngineStatus>,
    channel: CommandChannel,
    capture: CaptureProxy,
    ticker: Option<ProgressTicker>,
    /// Parameters of the flow currently in progress.
    active: Option<RecordingParams>,
    /// Settings snapshot taken at flow start; used through finalization.
    flow_settings: Option<Settings>,
}

/// Engine task loop.
///
/// Selects over engine commands, capture events, alarm firings (filtered to
/// the watchdog), the local progress ticker, and the cancellation token.
/// Capture events for flows the engine has already abandoned are ignored.
pub(super) async fn run(
    mut core: EngineCore,
    mut commands: mpsc::Receiver<EngineCommand>,
    mut events: mpsc::UnboundedReceiver<CaptureEvent>,
    mut alarms: broadcast::Receiver<AlarmFired>,
    cancel: CancellationToken,
) {
    info!("engine task started");
    let mut alarms_open = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            command = commands.recv() => match command {
                Some(EngineCommand::Start(params)) => core.start_flow(params).await,
                Some(EngineCommand::Stop) => stop_requested(&mut core, &mut events).await,
                None => break,
            },

            Some(event) = events.recv() => core.on_capture_event(event).await,

            fired = alarms.recv(), if alarms_open => match fired {
                Ok(fired) if fired.name == WATCHDOG_ALARM => {
                    watchdog_fired(&mut core, &mut events).await;
                }
                Ok(_) => {} // schedule alarms belong to the scheduler
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "engine missed alarm firings");
                }
                Err(broadcast::error::RecvError::Closed) => alarms_open = false,
            },

            Some(elapsed) = next_tick(&mut core.ticker), if core.ticker.is_some() => {
                core.on_tick(elapsed);
            }
        }
    }

    core.shutdown().await;
    info!("engine task ended");
}

async fn next_tick(ticker: &mut Option<ProgressTicker>) -> Option<u64> {
    match ticker {
        Some(ticker) => ticker.next().await,
        None => None,
    }
}

/// Handle a stop request from outside the engine.
async fn stop_requested(
    core: &mut EngineCore,
    events: &mut mpsc::UnboundedReceiver<CaptureEvent>,
) {
    match core.state() {
        EngineState::Recording => {
            core.deps.log.info("stop requested, asking capture to finish").await;
            graceful_stop(core, events).await;
        }
        EngineState::Error => {
            core.deps.log.info("resetting recorder after error").await;
            core.reset_to_idle().await;
        }
        state => debug!(%state, "stop request ignored"),
    }
}

/// The engine's backup timer went off while a capture should be running.
async fn watchdog_fired(
    core: &mut EngineCore,
    events: &mut mpsc::UnboundedReceiver<CaptureEvent>,
) {
    if core.state() != EngineState::Recording {
        debug!("watchdog fired outside recording, ignoring");
        return;
    }
    core.deps.log.warn("backup timer fired, capture context appears stalled").await;
    graceful_stop(core, events).await;
}

/// Ask the capture context to finish, draining its events for up to the
/// grace window. A context that produces its result transitions the engine
/// normally (including finalization); a silent one is force-closed and the
/// engine returns to idle — non-responsiveness here is a normal stop, not a
/// fault.
async fn graceful_stop(
    core: &mut EngineCore,
    events: &mut mpsc::UnboundedReceiver<CaptureEvent>,
) {
    let _ = core.capture.send(CaptureCommand::Stop);

    let deadline = tokio::time::Instant::now() + GRACEFUL_STOP_WAIT;
    while core.state() == EngineState::Recording {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Some(event)) => core.on_capture_event(event).await,
            Ok(None) | Err(_) => break,
        }
    }

    if core.state() == EngineState::Recording {
        core.deps.log.warn("capture did not acknowledge stop, forcing shutdown").await;
        core.cleanup_flow().await;
        core.transition(EngineState::Idle);
    }
}

impl EngineCore {
    pub(super) fn new(
        deps: EngineDeps,
        status_tx: tokio::sync::watch::Sender<EngineStatus>,
        capture: CaptureProxy,
    ) -> Self {
        Self {
            deps,
            status: EngineStatus::default(),
            status_tx,
            channel: CommandChannel::new(),
            capture,
            ticker: None,
            active: None,
            flow_settings: None,
        }
    }

    pub(super) fn state(&self) -> EngineState {
        self.status.state
    }

    fn publish(&self) {
        let _ = self.status_tx.send(self.status.clone());
    }

    /// Move to `state`, maintaining the snapshot invariants: the progress
    /// counters exist only in `Recording`, the error message only in
    /// `Error`.
    fn transition(&mut self, state: EngineState) {
        debug!(from = %self.status.state, to = %state, "engine transition");
        self.status.state = state;
        if state != EngineState::Recording {
            self.status.elapsed_secs = None;
            self.status.total_secs = None;
        }
        if state != EngineState::Error {
            self.status.error = None;
        }
        self.publish();
    }

    /// Entry point of a recording flow.
    ///
    /// Rejected unless idle; a lingering error state is auto-cleared first
    /// so alarm-triggered flows self-heal without manual intervention.
    pub(super) async fn start_flow(&mut self, params: RecordingParams) {
        match self.state() {
            EngineState::Idle => {}
            EngineState::Error => {
                self.deps.log.info("clearing previous error before new recording").await;
                self.reset_to_idle().await;
            }
            state => {
                let rejection = RecorderError::Busy { state: state.to_string() };
                self.deps.log.warn(rejection.to_string()).await;
                return;
            }
        }

        if let Err(err) = self.run_flow(&params).await {
            self.fail(err).await;
        }
    }

    /// The tune-and-record sequence up to the point where capture runs on
    /// its own. Any error aborts the whole flow; cleanup happens in
    /// [`fail`](Self::fail).
    async fn run_flow(&mut self, params: &RecordingParams) -> Result<()> {
        self.deps
            .log
            .info(format!(
                "starting recording: {} Hz {} for {} min",
                params.frequency, params.mode, params.duration_minutes
            ))
            .await;
        self.active = Some(*params);
        self.transition(EngineState::Connecting);

        let settings = match self.deps.store.load_settings().await {
            Ok(settings) => settings,
            Err(err @ RecorderError::ConfigLoad { .. }) => return Err(err),
            Err(err) => return Err(RecorderError::config_load(err.to_string())),
        };
        self.flow_settings = Some(settings.clone());
        let endpoint = settings.control_endpoint();
        let rig_port = settings.rig_port;

        self.channel.connect(&endpoint, &ConnectPolicy::default()).await?;
        self.deps.log.info(format!("connected to {endpoint}")).await;

        self.transition(EngineState::TuningFrequency);
        let command = RigCommand::SetFreq { port: rig_port, freq: params.frequency };
        let response = self.channel.send_command(&command, RESPONSE_TIMEOUT).await?;
        if !response.success() {
            return Err(RecorderError::protocol(
                response.error().unwrap_or("tune frequency rejected").to_string(),
            ));
        }
        self.status.last_frequency = Some(params.frequency);
        self.publish();
        self.deps.log.info(format!("frequency set to {} Hz", params.frequency)).await;

        // Give the rig time to settle between successive tune commands.
        tokio::time::sleep(INTER_COMMAND_DELAY).await;

        self.transition(EngineState::TuningMode);
        let command =
            RigCommand::SetMode { port: rig_port, mode: params.mode, data: params.data_mode };
        let response = self.channel.send_command(&command, RESPONSE_TIMEOUT).await?;
        if !response.success() {
            return Err(RecorderError::protocol(
                response.error().unwrap_or("tune mode rejected").to_string(),
            ));
        }
        self.status.last_mode = Some(params.mode);
        self.publish();
        self.deps.log.info(format!("mode set to {}", params.mode)).await;

        // The channel is not needed during capture and must not stay open.
        self.channel.disconnect().await;

        self.begin_capture(params).await
    }

    /// Hand off to the capture context and arm the safety net.
    async fn begin_capture(&mut self, params: &RecordingParams) -> Result<()> {
        self.transition(EngineState::Recording);
        self.status.elapsed_secs = Some(0);
        self.status.total_secs = Some(params.duration_secs());
        self.publish();

        self.capture
            .ensure()
            .map_err(|err| RecorderError::capture_start(err.to_string()))?;

        let device_id = self
            .flow_settings
            .as_ref()
            .and_then(|settings| settings.capture_device.clone())
            .ok_or(RecorderError::DeviceMissing)?;

        self.capture.send(CaptureCommand::Start {
            device_id,
            duration_ms: params.duration_ms(),
            mime_type: PREFERRED_MIME.to_string(),
        })?;
        self.deps
            .log
            .info(format!("capture started for {} min", params.duration_minutes))
            .await;

        // Backup timer, independent of the capture context's own stop timer
        // and deliberately slower than it.
        let watchdog_minutes = (f64::from(params.duration_minutes) + 0.1).max(1.0);
        let at = Utc::now()
            + chrono::Duration::milliseconds((watchdog_minutes * 60_000.0) as i64);
        self.deps.alarms.set(WATCHDOG_ALARM, at, None).await?;

        self.ticker = Some(ProgressTicker::new());
        Ok(())
    }

    /// Consume one event from the capture context.
    pub(super) async fn on_capture_event(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Progress { elapsed_secs, total_secs } => {
                if self.state() == EngineState::Recording {
                    let current = self.status.elapsed_secs.unwrap_or(0);
                    self.status.elapsed_secs = Some(current.max(elapsed_secs));
                    if total_secs > 0 {
                        self.status.total_secs = Some(total_secs);
                    }
                    self.publish();
                }
            }
            CaptureEvent::Finished(outcome) => {
                if self.state() != EngineState::Recording {
                    debug!("ignoring capture result for an abandoned flow");
                    return;
                }
                self.clear_watchdog().await;
                self.ticker = None;

                match (outcome.success, outcome.artifact) {
                    (true, Some(artifact)) => self.finalize(artifact).await,
                    (true, None) => {
                        self.fail(RecorderError::capture_failed(
                            "capture reported success without an artifact",
                        ))
                        .await;
                    }
                    (false, _) => {
                        let reason = outcome
                            .error
                            .unwrap_or_else(|| "unknown capture error".to_string());
                        self.fail(RecorderError::capture_failed(reason)).await;
                    }
                }
            }
        }
    }

    /// Advance the local elapsed counter; capture progress events may be
    /// ahead of it, never behind.
    pub(super) fn on_tick(&mut self, elapsed: u64) {
        if self.state() == EngineState::Recording {
            let current = self.status.elapsed_secs.unwrap_or(0);
            self.status.elapsed_secs = Some(current.max(elapsed));
            self.publish();
        }
    }

    /// Deliver the artifact and return to idle.
    async fn finalize(&mut self, artifact: CaptureArtifact) {
        self.transition(EngineState::Saving);

        let template = self
            .flow_settings
            .as_ref()
            .map(|settings| settings.filename_template.clone())
            .unwrap_or_else(|| Settings::default().filename_template);
        let params = self.active.unwrap_or(RecordingParams {
            frequency: self.status.last_frequency.unwrap_or(0),
            mode: self.status.last_mode.unwrap_or(crate::types::Mode::Am),
            data_mode: false,
            duration_minutes: 0,
        });
        let name = filename::render(&template, Utc::now(), params.frequency, params.mode);
        self.deps.log.info(format!("saving recording as '{name}'")).await;

        match self.deps.delivery.deliver(&name, &artifact).await {
            Ok(()) => {
                self.capture.close();
                self.active = None;
                self.flow_settings = None;
                self.deps.log.info("recording completed").await;
                self.transition(EngineState::Idle);
            }
            Err(err) => self.fail(err).await,
        }
    }

    /// Terminate the current flow in the error state.
    pub(super) async fn fail(&mut self, err: RecorderError) {
        let message = err.to_string();
        error!(%message, "recording flow failed");
        self.deps.log.error(message.clone()).await;

        self.cleanup_flow().await;
        self.status.state = EngineState::Error;
        self.status.error = Some(message);
        self.status.elapsed_secs = None;
        self.status.total_secs = None;
        self.publish();
    }

    /// Clear a previous flow's leftovers and go back to idle.
    pub(super) async fn reset_to_idle(&mut self) {
        self.cleanup_flow().await;
        self.transition(EngineState::Idle);
    }

    /// Release everything a flow may have acquired. Safe to call in any
    /// state; every operation here is idempotent.
    async fn cleanup_flow(&mut self) {
        self.ticker = None;
        self.clear_watchdog().await;
        self.channel.disconnect().await;
        self.capture.close();
        self.active = None;
        self.flow_settings = None;
    }

    async fn clear_watchdog(&mut self) {
        if let Err(err) = self.deps.alarms.clear(WATCHDOG_ALARM).await {
            warn!(%err, "failed to clear watchdog alarm");
        }
    }

    pub(super) async fn shutdown(&mut self) {
        self.cleanup_flow().await;
    }
}
