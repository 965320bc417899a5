//! Shared test doubles: a scripted control endpoint, a controllable capture
//! context, a manual alarm service, and an in-memory delivery target.

#![cfg(test)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, watch};

use crate::alarm::{AlarmFired, AlarmService};
use crate::capture::{
    CaptureArtifact, CaptureCommand, CaptureContext, CaptureContextFactory, CaptureEvent,
    CaptureOutcome,
};
use crate::delivery::Delivery;
use crate::error::Result;
use crate::store::{MemoryStore, Store};
use crate::types::{EngineState, EngineStatus, SettingsPatch};

/// How the scripted rig answers tune commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigScript {
    /// Answer success to everything.
    Accept,
    /// Report `success:false` to `setFreq`.
    RejectFreq,
    /// Accept `setFreq`, report `success:false` to `setMode`.
    RejectMode,
    /// Read commands and never answer.
    Silent,
}

/// A TCP control endpoint speaking the wire protocol from a fixed script.
///
/// Accepts any number of connections and records every command line it
/// receives.
pub struct ScriptedRig {
    pub addr: String,
    received: Arc<Mutex<Vec<String>>>,
}

impl ScriptedRig {
    pub async fn start(script: RigScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind scripted rig");
        let addr = listener.local_addr().expect("local addr").to_string();
        let received = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&received);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { break };
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let (read, mut write) = stream.into_split();
                    let mut lines = BufReader::new(read).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        log.lock().unwrap().push(line.clone());
                        let reply = match script {
                            RigScript::Silent => None,
                            RigScript::Accept => Some(reply_for(&line, true)),
                            RigScript::RejectFreq if line.contains("\"setFreq\"") => {
                                Some(reply_for(&line, false))
                            }
                            RigScript::RejectFreq => Some(reply_for(&line, true)),
                            RigScript::RejectMode if line.contains("\"setMode\"") => {
                                Some(reply_for(&line, false))
                            }
                            RigScript::RejectMode => Some(reply_for(&line, true)),
                        };
                        if let Some(reply) = reply {
                            if write.write_all(reply.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                    }
                });
            }
        });

        Self { addr, received }
    }

    /// Command lines received so far, in arrival order.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

fn reply_for(line: &str, success: bool) -> String {
    let tag = if line.contains("\"setFreq\"") { "setFreqResult" } else { "setModeResult" };
    if success {
        format!("{{\"type\":\"{tag}\",\"success\":true}}\n")
    } else {
        format!("{{\"type\":\"{tag}\",\"success\":false,\"error\":\"scripted failure\"}}\n")
    }
}

/// How the fake capture context reacts to a stop command.
#[derive(Debug, Clone)]
pub enum StopBehavior {
    /// Swallow the stop and stay silent, like a hung context.
    Ignore,
    /// Emit this terminal outcome.
    FinishWith(CaptureOutcome),
}

pub struct FakeCaptureState {
    events: Mutex<Option<mpsc::UnboundedSender<CaptureEvent>>>,
    commands: Mutex<Vec<CaptureCommand>>,
    created: AtomicUsize,
    closed: AtomicUsize,
    stop_behavior: Mutex<StopBehavior>,
}

/// Controllable capture context factory.
///
/// Tests drive the "context" by emitting events directly and by choosing
/// how it answers stop commands.
#[derive(Clone)]
pub struct FakeCapture {
    state: Arc<FakeCaptureState>,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self {
            state: Arc::new(FakeCaptureState {
                events: Mutex::new(None),
                commands: Mutex::new(Vec::new()),
                created: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
                stop_behavior: Mutex::new(StopBehavior::Ignore),
            }),
        }
    }

    pub fn set_stop_behavior(&self, behavior: StopBehavior) {
        *self.state.stop_behavior.lock().unwrap() = behavior;
    }

    /// Emit an event as if the capture context produced it.
    pub fn emit(&self, event: CaptureEvent) {
        if let Some(events) = self.state.events.lock().unwrap().as_ref() {
            let _ = events.send(event);
        }
    }

    pub fn commands(&self) -> Vec<CaptureCommand> {
        self.state.commands.lock().unwrap().clone()
    }

    pub fn created(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }
}

impl CaptureContextFactory for FakeCapture {
    fn create(
        &self,
        events: mpsc::UnboundedSender<CaptureEvent>,
    ) -> Result<Box<dyn CaptureContext>> {
        self.state.created.fetch_add(1, Ordering::SeqCst);
        *self.state.events.lock().unwrap() = Some(events);
        Ok(Box::new(FakeContext { state: Arc::clone(&self.state) }))
    }
}

struct FakeContext {
    state: Arc<FakeCaptureState>,
}

impl CaptureContext for FakeContext {
    fn send(&self, command: CaptureCommand) {
        let is_stop = command == CaptureCommand::Stop;
        self.state.commands.lock().unwrap().push(command);
        if is_stop {
            let behavior = self.state.stop_behavior.lock().unwrap().clone();
            if let StopBehavior::FinishWith(outcome) = behavior {
                if let Some(events) = self.state.events.lock().unwrap().as_ref() {
                    let _ = events.send(CaptureEvent::Finished(outcome));
                }
            }
        }
    }
}

impl Drop for FakeContext {
    fn drop(&mut self) {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// A successful capture outcome with a small webm artifact.
pub fn success_outcome() -> CaptureOutcome {
    CaptureOutcome {
        success: true,
        artifact: Some(CaptureArtifact {
            data: vec![0x1a, 0x45, 0xdf, 0xa3],
            mime_type: "audio/webm".to_string(),
        }),
        duration_ms: Some(60_000),
        error: None,
    }
}

/// Alarm service whose firings are driven by the test.
///
/// Registrations are recorded; nothing fires until [`fire`](Self::fire) is
/// called.
pub struct ManualAlarms {
    registered: Mutex<HashMap<String, DateTime<Utc>>>,
    tx: broadcast::Sender<AlarmFired>,
}

impl ManualAlarms {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(32);
        Self { registered: Mutex::new(HashMap::new()), tx }
    }

    /// Fire the named alarm as if its instant had arrived.
    pub fn fire(&self, name: &str) {
        let scheduled_at =
            self.registered.lock().unwrap().get(name).copied().unwrap_or_else(Utc::now);
        let _ = self.tx.send(AlarmFired {
            name: name.to_string(),
            scheduled_at,
            fired_at: Utc::now(),
        });
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registered.lock().unwrap().contains_key(name)
    }
}

#[async_trait::async_trait]
impl AlarmService for ManualAlarms {
    async fn set(&self, name: &str, at: DateTime<Utc>, _repeat: Option<Duration>) -> Result<()> {
        self.registered.lock().unwrap().insert(name.to_string(), at);
        Ok(())
    }

    async fn clear(&self, name: &str) -> Result<bool> {
        Ok(self.registered.lock().unwrap().remove(name).is_some())
    }

    async fn next_fire(&self) -> Option<(String, DateTime<Utc>)> {
        self.registered
            .lock()
            .unwrap()
            .iter()
            .min_by_key(|(_, at)| **at)
            .map(|(name, at)| (name.clone(), *at))
    }

    fn subscribe(&self) -> broadcast::Receiver<AlarmFired> {
        self.tx.subscribe()
    }
}

/// Delivery target that keeps artifacts in memory.
#[derive(Default)]
pub struct MemoryDelivery {
    delivered: Mutex<Vec<(String, Vec<u8>)>>,
    fail: Mutex<bool>,
}

impl MemoryDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self) {
        *self.fail.lock().unwrap() = true;
    }

    pub fn delivered(&self) -> Vec<(String, Vec<u8>)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Delivery for MemoryDelivery {
    async fn deliver(&self, filename: &str, artifact: &CaptureArtifact) -> Result<()> {
        if std::mem::take(&mut *self.fail.lock().unwrap()) {
            return Err(crate::RecorderError::delivery(filename, "scripted delivery failure"));
        }
        self.delivered.lock().unwrap().push((filename.to_string(), artifact.data.clone()));
        Ok(())
    }
}

/// A memory store pre-configured with a capture device and the given
/// control endpoint.
pub async fn store_for(addr: &str) -> Arc<MemoryStore> {
    let (host, port) = addr.rsplit_once(':').expect("host:port");
    let store = Arc::new(MemoryStore::new());
    store
        .save_settings(SettingsPatch {
            control_host: Some(host.to_string()),
            control_port: Some(port.parse().expect("port number")),
            capture_device: Some(Some("test-mic".to_string())),
            ..SettingsPatch::default()
        })
        .await
        .expect("seed settings");
    store
}

/// Wait until the engine reports `state`, or panic after `timeout`.
pub async fn wait_for_state(
    status: &mut watch::Receiver<EngineStatus>,
    state: EngineState,
    timeout: Duration,
) -> EngineStatus {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        {
            let current = status.borrow();
            if current.state == state {
                return current.clone();
            }
        }
        tokio::select! {
            changed = status.changed() => changed.expect("engine status channel closed"),
            _ = tokio::time::sleep_until(deadline) => {
                panic!("engine never reached {state} (currently {})", status.borrow().state);
            }
        }
    }
}
