//! Error types for recording orchestration.
//!
//! Every failure a recording flow can hit maps onto one [`RecorderError`]
//! variant. Flow-level policy lives in the engine: a failed step terminates
//! the flow and surfaces as the `Error` state's message, it never panics the
//! process.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for recorder operations.
pub type Result<T, E = RecorderError> = std::result::Result<T, E>;

/// Main error type for recorder operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RecorderError {
    #[error("Failed to load configuration: {reason}")]
    ConfigLoad { reason: String },

    #[error("Failed to connect to control endpoint: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Command channel is not connected")]
    NotConnected,

    #[error("Remote endpoint reported failure: {reason}")]
    Protocol { reason: String },

    #[error("No response within {duration:?}")]
    Timeout { duration: Duration },

    #[error("A command awaiting '{tag}' is already in flight")]
    CommandPending { tag: &'static str },

    #[error("No capture device configured")]
    DeviceMissing,

    #[error("Failed to start capture: {reason}")]
    CaptureStart { reason: String },

    #[error("Capture failed: {reason}")]
    CaptureFailed { reason: String },

    #[error("Failed to deliver recording '{filename}': {reason}")]
    Delivery { filename: String, reason: String },

    #[error("Recorder is busy (state: {state})")]
    Busy { state: String },

    #[error("Alarm fired {drift_secs}s away from its scheduled time, skipping")]
    StaleAlarm { drift_secs: i64 },

    #[error("Store operation failed: {reason}")]
    Store {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RecorderError {
    /// Returns whether this error is potentially recoverable through retry.
    ///
    /// The engine itself never retries inside a flow; callers use this to
    /// decide whether a fresh trigger is worth attempting at all.
    pub fn is_retryable(&self) -> bool {
        match self {
            RecorderError::Connection { .. } => true,
            RecorderError::Timeout { .. } => true,
            RecorderError::NotConnected => true,
            RecorderError::Busy { .. } => true,
            RecorderError::CommandPending { .. } => true,
            RecorderError::ConfigLoad { .. } => false,
            RecorderError::Protocol { .. } => false,
            RecorderError::DeviceMissing => false,
            RecorderError::CaptureStart { .. } => false,
            RecorderError::CaptureFailed { .. } => false,
            RecorderError::Delivery { .. } => false,
            RecorderError::StaleAlarm { .. } => false,
            RecorderError::Store { .. } => false,
        }
    }

    /// Helper constructor for configuration load errors.
    pub fn config_load(reason: impl Into<String>) -> Self {
        RecorderError::ConfigLoad { reason: reason.into() }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        RecorderError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with the underlying cause.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        RecorderError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for remote-reported protocol failures.
    pub fn protocol(reason: impl Into<String>) -> Self {
        RecorderError::Protocol { reason: reason.into() }
    }

    /// Helper constructor for capture start failures.
    pub fn capture_start(reason: impl Into<String>) -> Self {
        RecorderError::CaptureStart { reason: reason.into() }
    }

    /// Helper constructor for capture failures.
    pub fn capture_failed(reason: impl Into<String>) -> Self {
        RecorderError::CaptureFailed { reason: reason.into() }
    }

    /// Helper constructor for delivery failures.
    pub fn delivery(filename: impl Into<String>, reason: impl Into<String>) -> Self {
        RecorderError::Delivery { filename: filename.into(), reason: reason.into() }
    }

    /// Helper constructor for store failures.
    pub fn store(reason: impl Into<String>) -> Self {
        RecorderError::Store { reason: reason.into(), source: None }
    }

    /// Helper constructor for store failures with the underlying cause.
    pub fn store_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        RecorderError::Store { reason: reason.into(), source: Some(source) }
    }
}

impl From<std::io::Error> for RecorderError {
    fn from(err: std::io::Error) -> Self {
        RecorderError::Store { reason: "I/O error".to_string(), source: Some(Box::new(err)) }
    }
}

impl From<serde_json::Error> for RecorderError {
    fn from(err: serde_json::Error) -> Self {
        RecorderError::Store {
            reason: "serialization error".to_string(),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[cfg(test)]
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn error_messages_contain_their_context(
                reason in ".*",
                filename in "[a-zA-Z0-9_.-]{1,40}",
                drift in -100000i64..100000i64
            ) {
                let conn = RecorderError::connection_failed(reason.clone());
                prop_assert!(conn.to_string().contains(&reason));

                let proto = RecorderError::protocol(reason.clone());
                prop_assert!(proto.to_string().contains(&reason));

                let delivery = RecorderError::delivery(filename.clone(), reason.clone());
                prop_assert!(delivery.to_string().contains(&filename));

                let stale = RecorderError::StaleAlarm { drift_secs: drift };
                prop_assert!(stale.to_string().contains(&drift.to_string()));
            }

            #[test]
            fn source_chains_are_traversable(reason in ".*", inner in ".*") {
                let io = std::io::Error::other(inner.clone());
                let err = RecorderError::connection_failed_with_source(
                    reason,
                    Box::new(io),
                );

                let source = std::error::Error::source(&err)
                    .expect("connection error should carry its source");
                prop_assert_eq!(source.to_string(), inner);
            }
        }
    }

    #[test]
    fn error_traits_validation() {
        // Compile-time check: RecorderError must be Send + Sync + 'static
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<RecorderError>();

        let error = RecorderError::connection_failed("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn retryability_classification() {
        assert!(RecorderError::connection_failed("x").is_retryable());
        assert!(RecorderError::Timeout { duration: Duration::from_secs(5) }.is_retryable());
        assert!(RecorderError::NotConnected.is_retryable());

        assert!(!RecorderError::DeviceMissing.is_retryable());
        assert!(!RecorderError::protocol("remote said no").is_retryable());
        assert!(!RecorderError::config_load("bad settings").is_retryable());
    }

    #[test]
    fn from_conversions_work() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing record");
        let err: RecorderError = io_err.into();
        match err {
            RecorderError::Store { source, .. } => {
                assert_eq!(source.expect("io source").to_string(), "missing record");
            }
            _ => panic!("Expected Store error variant"),
        }
    }
}
