//! Recording schedules and their occurrence arithmetic.

use chrono::{DateTime, Days, NaiveTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use super::{Mode, RecordingParams};
use crate::{RecorderError, Result};

/// Minutes in a day, the modulus for wrap-around durations.
const MINUTES_PER_DAY: u32 = 1440;

/// How a schedule repeats after it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Repeat {
    /// Fire once, then the schedule is deleted.
    Once,
    /// Fire every day at the same start time.
    Daily,
}

/// A recurring or one-shot recording window.
///
/// `start` and `end` are wall-clock times of day. An `end` at or before
/// `start` means the window crosses midnight; the duration is never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// Caller-assigned identifier, unique across the stored set.
    pub id: String,

    /// Start time of day.
    pub start: NaiveTime,

    /// End time of day; may wrap past midnight.
    pub end: NaiveTime,

    /// Receiver frequency in Hz.
    pub frequency: u64,

    /// Demodulation mode.
    pub mode: Mode,

    /// Data sub-mode flag, carried verbatim into the tune-mode command.
    #[serde(default)]
    pub data_mode: bool,

    /// Repetition kind.
    pub repeat: Repeat,

    /// Disabled schedules keep their definition but register no wake-up.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Schedule {
    /// Duration of the recording window in minutes.
    ///
    /// Computed as `(end - start) mod 1440`, with the zero case (identical
    /// times) meaning a full 24-hour window. Always strictly positive.
    pub fn duration_minutes(&self) -> u32 {
        let start = self.start.hour() * 60 + self.start.minute();
        let end = self.end.hour() * 60 + self.end.minute();
        let diff = (MINUTES_PER_DAY + end - start) % MINUTES_PER_DAY;
        if diff == 0 { MINUTES_PER_DAY } else { diff }
    }

    /// Next wall-clock instant of `start`: today if still ahead of `now`,
    /// otherwise tomorrow.
    pub fn next_occurrence<Tz: TimeZone>(&self, now: DateTime<Tz>) -> DateTime<Tz> {
        let tz = now.timezone();
        let today = now.date_naive().and_time(self.start);
        // On DST transitions an ambiguous local time resolves to the
        // earliest valid instant.
        let candidate = match tz.from_local_datetime(&today).earliest() {
            Some(dt) => dt,
            None => tz
                .from_local_datetime(&(today + chrono::Duration::hours(1)))
                .earliest()
                .unwrap_or_else(|| now.clone()),
        };
        if candidate > now {
            candidate
        } else {
            let tomorrow = today + Days::new(1);
            tz.from_local_datetime(&tomorrow)
                .earliest()
                .unwrap_or_else(|| candidate + chrono::Duration::days(1))
        }
    }

    /// Check the schedule's own invariants.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(RecorderError::store("schedule id must not be empty"));
        }
        if self.frequency == 0 {
            return Err(RecorderError::store(format!(
                "schedule '{}' has zero frequency",
                self.id
            )));
        }
        Ok(())
    }

    /// Ephemeral recording parameters for one firing of this schedule.
    pub fn params(&self) -> RecordingParams {
        RecordingParams {
            frequency: self.frequency,
            mode: self.mode,
            data_mode: self.data_mode,
            duration_minutes: self.duration_minutes(),
        }
    }
}
