//! Receiver demodulation modes

use serde::{Deserialize, Serialize};

/// Demodulation mode of the remote receiver.
///
/// The wire protocol carries these as upper-case string tags. A boolean
/// "data" sub-mode travels next to the mode in commands and schedules, it is
/// not part of the vocabulary itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    Am,
    Fm,
    Lsb,
    Usb,
    Cw,
}

impl Mode {
    /// Wire/display tag for this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Am => "AM",
            Mode::Fm => "FM",
            Mode::Lsb => "LSB",
            Mode::Usb => "USB",
            Mode::Cw => "CW",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = crate::RecorderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AM" => Ok(Mode::Am),
            "FM" => Ok(Mode::Fm),
            "LSB" => Ok(Mode::Lsb),
            "USB" => Ok(Mode::Usb),
            "CW" => Ok(Mode::Cw),
            other => Err(crate::RecorderError::protocol(format!("unknown mode '{other}'"))),
        }
    }
}
