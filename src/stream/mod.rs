//! Stream utilities.

mod ticker;

pub use ticker::ProgressTicker;
