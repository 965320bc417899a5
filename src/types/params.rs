//! Per-invocation recording parameters

use serde::{Deserialize, Serialize};

use super::Mode;

/// Parameters for a single recording flow.
///
/// An ephemeral value handed to one engine invocation, built from a fired
/// schedule or a manual trigger. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingParams {
    /// Receiver frequency in Hz.
    pub frequency: u64,

    /// Demodulation mode.
    pub mode: Mode,

    /// Data sub-mode flag.
    pub data_mode: bool,

    /// Requested capture length in minutes.
    pub duration_minutes: u32,
}

impl RecordingParams {
    /// Total capture duration in seconds.
    pub fn duration_secs(&self) -> u64 {
        u64::from(self.duration_minutes) * 60
    }

    /// Total capture duration in milliseconds, as sent to the capture
    /// context.
    pub fn duration_ms(&self) -> u64 {
        self.duration_secs() * 1000
    }
}
