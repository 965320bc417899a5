//! Capture context proxy.
//!
//! The capture context is an isolated execution unit that owns the actual
//! audio hardware; this crate never touches a microphone directly. The
//! engine fires command envelopes into the context and consumes its
//! asynchronous progress/result events from a separate stream. The context
//! may keep emitting events after the engine has abandoned a flow; receivers
//! must ignore those, never fail on them.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{RecorderError, Result};

/// Command envelope sent into the capture context. Fire-and-forget; results
/// arrive on the event stream, not as a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureCommand {
    /// Begin capturing from `device_id` for `duration_ms`, encoding to
    /// `mime_type`. The context runs its own stop timer off `duration_ms`;
    /// the engine's watchdog alarm is deliberately separate.
    Start { device_id: String, duration_ms: u64, mime_type: String },
    /// Ask the context to stop and emit its result.
    Stop,
}

/// Event emitted by the capture context.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// Periodic progress while capturing.
    Progress { elapsed_secs: u64, total_secs: u64 },
    /// Terminal event for one capture.
    Finished(CaptureOutcome),
}

/// Terminal result of a capture.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub success: bool,
    /// Present on success.
    pub artifact: Option<CaptureArtifact>,
    /// Actual captured length, when the context knows it.
    pub duration_ms: Option<u64>,
    /// Present on failure.
    pub error: Option<String>,
}

/// Encoded audio blob produced by the capture context.
#[derive(Debug, Clone)]
pub struct CaptureArtifact {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl CaptureArtifact {
    /// Filename extension for this artifact's MIME type.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "audio/webm" => "webm",
            "audio/ogg" => "ogg",
            "audio/mp4" => "m4a",
            "audio/wav" | "audio/wave" | "audio/x-wav" => "wav",
            _ => "bin",
        }
    }
}

/// Handle to a live capture context.
pub trait CaptureContext: Send {
    /// Deliver a command envelope. Fire-and-forget: errors inside the
    /// context surface as a failed [`CaptureEvent::Finished`], not here.
    fn send(&self, command: CaptureCommand);
}

/// Creates capture contexts on demand.
///
/// The factory receives the sender side of the event stream so every context
/// it creates reports into the same engine-owned receiver.
pub trait CaptureContextFactory: Send + Sync {
    fn create(
        &self,
        events: mpsc::UnboundedSender<CaptureEvent>,
    ) -> Result<Box<dyn CaptureContext>>;
}

/// Lifecycle manager for the capture context.
///
/// `ensure` and `close` are both idempotent; the engine keeps exactly one
/// context alive during a recording and tears it down on every completion
/// path.
pub struct CaptureProxy {
    factory: Arc<dyn CaptureContextFactory>,
    events: mpsc::UnboundedSender<CaptureEvent>,
    context: Option<Box<dyn CaptureContext>>,
}

impl CaptureProxy {
    pub fn new(
        factory: Arc<dyn CaptureContextFactory>,
        events: mpsc::UnboundedSender<CaptureEvent>,
    ) -> Self {
        Self { factory, events, context: None }
    }

    /// Create the context if absent.
    pub fn ensure(&mut self) -> Result<()> {
        if self.context.is_none() {
            debug!("creating capture context");
            self.context = Some(self.factory.create(self.events.clone())?);
        }
        Ok(())
    }

    /// Tear the context down if present.
    pub fn close(&mut self) {
        if self.context.take().is_some() {
            debug!("capture context closed");
        }
    }

    /// Whether a context currently exists.
    pub fn is_open(&self) -> bool {
        self.context.is_some()
    }

    /// Send a command envelope into the context.
    pub fn send(&self, command: CaptureCommand) -> Result<()> {
        match &self.context {
            Some(context) => {
                context.send(command);
                Ok(())
            }
            None => Err(RecorderError::capture_start("no capture context")),
        }
    }
}
