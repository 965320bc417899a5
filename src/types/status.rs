//! Engine state and its observable snapshot.

use serde::{Deserialize, Serialize};

use super::Mode;

/// State of the recording engine.
///
/// Exactly one instance exists per process, owned by the engine task and
/// published to observers as part of [`EngineStatus`]. Held only in memory:
/// a process restart always comes back up in `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineState {
    /// Nothing in flight.
    Idle,
    /// Opening the command channel.
    Connecting,
    /// Tune-frequency command in flight.
    TuningFrequency,
    /// Tune-mode command in flight.
    TuningMode,
    /// Capture running, watchdog armed.
    Recording,
    /// Capture finished, delivering the artifact.
    Saving,
    /// A flow step failed; cleared by the next flow start or a reset.
    Error,
}

impl Default for EngineState {
    fn default() -> Self {
        Self::Idle
    }
}

impl EngineState {
    /// Stable tag used in status output and busy-rejection messages.
    pub fn as_str(self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Connecting => "connecting",
            EngineState::TuningFrequency => "tuning-frequency",
            EngineState::TuningMode => "tuning-mode",
            EngineState::Recording => "recording",
            EngineState::Saving => "saving",
            EngineState::Error => "error",
        }
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable snapshot of the engine, published on a watch channel after
/// every transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub state: EngineState,

    /// Last frequency successfully applied to the receiver.
    pub last_frequency: Option<u64>,

    /// Last mode successfully applied to the receiver.
    pub last_mode: Option<Mode>,

    /// Seconds of capture elapsed; `None` outside `Recording`.
    pub elapsed_secs: Option<u64>,

    /// Total capture seconds requested; `None` outside `Recording`.
    pub total_secs: Option<u64>,

    /// Human-readable failure message; `Some` only in `Error`.
    pub error: Option<String>,
}
