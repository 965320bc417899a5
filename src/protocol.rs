//! Wire protocol for the device-control endpoint.
//!
//! One JSON object per message, newline-delimited, discriminated by a
//! `"type"` tag. Commands go out, result messages come back; the channel
//! pairs them up by the expected result tag.

use serde::{Deserialize, Serialize};

use crate::types::Mode;

/// Outbound control command.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RigCommand {
    /// Tune the selected receiver to a frequency in Hz.
    SetFreq { port: u32, freq: u64 },
    /// Switch the selected receiver's demodulation mode.
    SetMode { port: u32, mode: Mode, data: bool },
}

impl RigCommand {
    /// Type tag of the response this command expects.
    pub fn response_tag(&self) -> &'static str {
        match self {
            RigCommand::SetFreq { .. } => "setFreqResult",
            RigCommand::SetMode { .. } => "setModeResult",
        }
    }
}

/// Inbound result message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RigResponse {
    SetFreqResult {
        success: bool,
        #[serde(default)]
        error: Option<String>,
    },
    SetModeResult {
        success: bool,
        #[serde(default)]
        error: Option<String>,
    },
}

impl RigResponse {
    /// Type tag of this response.
    pub fn tag(&self) -> &'static str {
        match self {
            RigResponse::SetFreqResult { .. } => "setFreqResult",
            RigResponse::SetModeResult { .. } => "setModeResult",
        }
    }

    /// Whether the remote reported success.
    pub fn success(&self) -> bool {
        match self {
            RigResponse::SetFreqResult { success, .. } => *success,
            RigResponse::SetModeResult { success, .. } => *success,
        }
    }

    /// Remote-supplied error text, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            RigResponse::SetFreqResult { error, .. } => error.as_deref(),
            RigResponse::SetModeResult { error, .. } => error.as_deref(),
        }
    }
}
