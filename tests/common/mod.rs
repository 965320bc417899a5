//! Shared fixtures for integration tests: a cooperative control endpoint
//! and a self-completing capture context.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use skywave::{
    CaptureArtifact, CaptureCommand, CaptureContext, CaptureContextFactory, CaptureEvent,
    CaptureOutcome, MemoryStore, Result, SettingsPatch, Store,
};

/// Control endpoint that answers success to every tune command.
pub struct RigServer {
    pub addr: String,
}

impl RigServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind rig server");
        let addr = listener.local_addr().expect("local addr").to_string();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { break };
                tokio::spawn(async move {
                    let (read, mut write) = stream.into_split();
                    let mut lines = BufReader::new(read).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        let tag = if line.contains("\"setFreq\"") {
                            "setFreqResult"
                        } else {
                            "setModeResult"
                        };
                        let reply = format!("{{\"type\":\"{tag}\",\"success\":true}}\n");
                        if write.write_all(reply.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        Self { addr }
    }
}

/// Capture context that finishes on its own shortly after starting, like a
/// real context hitting its internal stop timer.
pub struct AutoCapture {
    delay: Duration,
    started: Arc<Mutex<Vec<CaptureCommand>>>,
}

impl AutoCapture {
    pub fn new(delay: Duration) -> Self {
        Self { delay, started: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn commands(&self) -> Vec<CaptureCommand> {
        self.started.lock().unwrap().clone()
    }
}

impl CaptureContextFactory for AutoCapture {
    fn create(
        &self,
        events: mpsc::UnboundedSender<CaptureEvent>,
    ) -> Result<Box<dyn CaptureContext>> {
        Ok(Box::new(AutoContext {
            events,
            delay: self.delay,
            started: Arc::clone(&self.started),
        }))
    }
}

struct AutoContext {
    events: mpsc::UnboundedSender<CaptureEvent>,
    delay: Duration,
    started: Arc<Mutex<Vec<CaptureCommand>>>,
}

impl CaptureContext for AutoContext {
    fn send(&self, command: CaptureCommand) {
        self.started.lock().unwrap().push(command.clone());
        let events = self.events.clone();
        let delay = match command {
            CaptureCommand::Start { .. } => self.delay,
            CaptureCommand::Stop => Duration::ZERO,
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(CaptureEvent::Finished(CaptureOutcome {
                success: true,
                artifact: Some(CaptureArtifact {
                    data: vec![0x1a, 0x45, 0xdf, 0xa3, 0x01],
                    mime_type: "audio/webm".to_string(),
                }),
                duration_ms: Some(delay.as_millis() as u64),
                error: None,
            }));
        });
    }
}

/// Memory store pointed at `addr` with a capture device configured.
pub async fn seeded_store(addr: &str) -> Arc<MemoryStore> {
    let (host, port) = addr.rsplit_once(':').expect("host:port");
    let store = Arc::new(MemoryStore::new());
    store
        .save_settings(SettingsPatch {
            control_host: Some(host.to_string()),
            control_port: Some(port.parse().expect("port number")),
            capture_device: Some(Some("integration-mic".to_string())),
            ..SettingsPatch::default()
        })
        .await
        .expect("seed settings");
    store
}
