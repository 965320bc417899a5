//! Scheduled, time-boxed radio recording for remotely controlled receivers.
//!
//! Skywave drives a remote receiver through a JSON command channel (tune
//! frequency, tune mode), hands off to an isolated audio-capture context
//! for a bounded duration, and delivers the encoded artifact — on a manual
//! trigger or on wall-clock schedules that survive process restarts.
//!
//! # Architecture
//!
//! - **Engine**: one spawned task owning all recording state, driven by
//!   commands and observed through a watch channel of status snapshots.
//! - **Command channel**: reconnecting TCP client pairing outbound commands
//!   with inbound results by type tag, with per-operation timeouts.
//! - **Capture proxy**: message-passing envelope around the isolated
//!   capture context; a backup alarm guards against a context that stops
//!   responding.
//! - **Scheduler**: translates stored schedules into alarm registrations
//!   and turns firings into recording flows, skipping stale ones.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use skywave::{DirDelivery, JsonStore, Skywave, TokioAlarms};
//!
//! # fn capture_factory() -> Arc<dyn skywave::CaptureContextFactory> { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> skywave::Result<()> {
//!     let handle = Skywave::spawn(
//!         Arc::new(JsonStore::new("skywave.json")),
//!         Arc::new(TokioAlarms::new()),
//!         capture_factory(),
//!         Arc::new(DirDelivery::new("recordings")),
//!     )
//!     .await?;
//!
//!     let status = handle.status().await?;
//!     println!("recorder is {}", status.engine.state);
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod activity;
mod error;
pub mod filename;
#[cfg(test)]
pub mod test_utils;
pub mod types;

// Orchestration architecture
pub mod alarm;
pub mod capture;
pub mod channel;
pub mod engine;
pub mod protocol;
pub mod scheduler;
pub mod service;
pub mod stream;

// External collaborator seams and default implementations
pub mod delivery;
pub mod store;

// Core exports
pub use activity::ActivityLog;
pub use error::{RecorderError, Result};
pub use types::*;

// Component exports
pub use alarm::{AlarmFired, AlarmService, TokioAlarms};
pub use capture::{
    CaptureArtifact, CaptureCommand, CaptureContext, CaptureContextFactory, CaptureEvent,
    CaptureOutcome,
};
pub use channel::{CommandChannel, ConnectPolicy};
pub use delivery::{Delivery, DirDelivery};
pub use engine::{Engine, EngineChannels, EngineCommand, EngineDeps, WATCHDOG_ALARM};
pub use protocol::{RigCommand, RigResponse};
pub use service::{NextWakeup, ServiceHandle, StatusReport};
pub use store::{JsonStore, MemoryStore, Store};

use std::sync::Arc;

/// Unified entry point for the recorder service.
///
/// Wires the persistent store, alarm facility, capture factory, and
/// delivery target together, re-registers schedule alarms, and spawns the
/// engine and scheduler tasks.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use skywave::{DirDelivery, MemoryStore, Skywave, TokioAlarms};
///
/// # fn capture_factory() -> Arc<dyn skywave::CaptureContextFactory> { unimplemented!() }
/// # #[tokio::main]
/// # async fn main() -> skywave::Result<()> {
/// let handle = Skywave::spawn(
///     Arc::new(MemoryStore::new()),
///     Arc::new(TokioAlarms::new()),
///     capture_factory(),
///     Arc::new(DirDelivery::new("recordings")),
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
pub struct Skywave;

impl Skywave {
    /// Spawn the recorder service with the given collaborators.
    pub async fn spawn(
        store: Arc<dyn Store>,
        alarms: Arc<dyn AlarmService>,
        capture: Arc<dyn CaptureContextFactory>,
        delivery: Arc<dyn Delivery>,
    ) -> Result<ServiceHandle> {
        service::spawn(store, alarms, capture, delivery).await
    }
}
