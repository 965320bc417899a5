//! Local recording progress ticker

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, interval};

pin_project! {
    /// A 1 Hz stream of cumulative elapsed seconds.
    ///
    /// The engine runs one of these for the lifetime of a capture so the
    /// elapsed counter keeps advancing even when the capture context's own
    /// progress events stop arriving. The stream never ends on its own; it
    /// is dropped when the recording leaves the `Recording` state.
    pub struct ProgressTicker {
        interval: Interval,
        elapsed: u64,
    }
}

impl ProgressTicker {
    /// Create a ticker starting at zero elapsed seconds.
    pub fn new() -> Self {
        let mut interval = interval(Duration::from_secs(1));
        // The first tick of a tokio interval is immediate; skip-to-next so
        // the first yield lands a full second in.
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.reset();
        Self { interval, elapsed: 0 }
    }

    /// Seconds counted so far.
    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }
}

impl Default for ProgressTicker {
    fn default() -> Self {
        Self::new()
    }
}

impl Stream for ProgressTicker {
    type Item = u64;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        ready!(this.interval.poll_tick(cx));
        *this.elapsed += 1;
        Poll::Ready(Some(*this.elapsed))
    }
}
