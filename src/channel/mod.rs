//! Command channel to the device-control endpoint.
//!
//! A reconnecting TCP client exchanging newline-delimited JSON messages.
//! Outbound commands are paired with inbound result messages by type tag: a
//! spawned reader task parses every inbound line and hands it to the one-shot
//! waiter registered for that tag. Unparseable or unmatched messages are
//! dropped with a diagnostic, never surfaced to a waiter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, oneshot};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{RecorderError, Result};
use crate::protocol::{RigCommand, RigResponse};


/// Connection retry policy for [`CommandChannel::connect`].
#[derive(Debug, Clone)]
pub struct ConnectPolicy {
    /// Budget for a single connection attempt.
    pub attempt_timeout: Duration,
    /// Total attempts before giving up.
    pub max_attempts: u32,
    /// Pause between a failed attempt and the next one.
    pub retry_delay: Duration,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(5),
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Waiters keyed by the response tag they expect.
type PendingMap = Arc<StdMutex<HashMap<&'static str, oneshot::Sender<RigResponse>>>>;

/// Reconnecting client for the device-control endpoint.
///
/// Holds at most one live connection; [`connect`](Self::connect) always
/// tears down the previous one first. Commands on distinct response tags may
/// be in flight concurrently; a second command on the same tag is rejected
/// instead of racing the first.
pub struct CommandChannel {
    conn: Option<Connection>,
}

struct Connection {
    writer: Mutex<OwnedWriteHalf>,
    pending: PendingMap,
    cancel: CancellationToken,
}

impl Default for CommandChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandChannel {
    /// Create a disconnected channel.
    pub fn new() -> Self {
        Self { conn: None }
    }

    /// Whether a connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Connect to `endpoint` (a `host:port` address), retrying per `policy`.
    ///
    /// Any existing connection is torn down first. Each attempt is bounded
    /// by `policy.attempt_timeout`; failed attempts are separated by
    /// `policy.retry_delay`. After the last failure the error carries the
    /// last underlying cause.
    pub async fn connect(&mut self, endpoint: &str, policy: &ConnectPolicy) -> Result<()> {
        self.disconnect().await;

        let mut last_err: Option<Box<dyn std::error::Error + Send + Sync>> = None;
        for attempt in 1..=policy.max_attempts.max(1) {
            if attempt > 1 {
                tokio::time::sleep(policy.retry_delay).await;
            }
            debug!(endpoint, attempt, "connecting to control endpoint");

            match timeout(policy.attempt_timeout, TcpStream::connect(endpoint)).await {
                Ok(Ok(stream)) => {
                    self.conn = Some(Connection::start(stream));
                    info!(endpoint, "control channel connected");
                    return Ok(());
                }
                Ok(Err(err)) => {
                    debug!(endpoint, attempt, %err, "connection attempt failed");
                    last_err = Some(Box::new(err));
                }
                Err(_) => {
                    debug!(endpoint, attempt, "connection attempt timed out");
                    last_err = Some(Box::new(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("no connection within {:?}", policy.attempt_timeout),
                    )));
                }
            }
        }

        let reason =
            format!("{endpoint} unreachable after {} attempts", policy.max_attempts.max(1));
        Err(match last_err {
            Some(source) => RecorderError::connection_failed_with_source(reason, source),
            None => RecorderError::connection_failed(reason),
        })
    }

    /// Send a command and await the response matching its type tag.
    ///
    /// Fails immediately with [`RecorderError::NotConnected`] when no
    /// connection is open and with [`RecorderError::CommandPending`] when a
    /// waiter for the same tag is already registered. Times out after
    /// `response_timeout`, removing the waiter so a later call starts clean.
    pub async fn send_command(
        &self,
        command: &RigCommand,
        response_timeout: Duration,
    ) -> Result<RigResponse> {
        let conn = self.conn.as_ref().ok_or(RecorderError::NotConnected)?;
        let tag = command.response_tag();

        let rx = {
            let mut pending = conn.pending.lock().expect("pending map poisoned");
            if pending.contains_key(tag) {
                return Err(RecorderError::CommandPending { tag });
            }
            let (tx, rx) = oneshot::channel();
            pending.insert(tag, tx);
            rx
        };

        let mut line = serde_json::to_string(command)
            .map_err(|err| RecorderError::protocol(format!("unserializable command: {err}")))?;
        line.push('\n');

        {
            let mut writer = conn.writer.lock().await;
            if let Err(err) = writer.write_all(line.as_bytes()).await {
                conn.pending.lock().expect("pending map poisoned").remove(tag);
                return Err(RecorderError::connection_failed_with_source(
                    "failed to send command",
                    Box::new(err),
                ));
            }
            if let Err(err) = writer.flush().await {
                conn.pending.lock().expect("pending map poisoned").remove(tag);
                return Err(RecorderError::connection_failed_with_source(
                    "failed to flush command",
                    Box::new(err),
                ));
            }
        }

        match timeout(response_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            // Reader task dropped the waiter: connection went away.
            Ok(Err(_)) => {
                Err(RecorderError::connection_failed("channel closed while awaiting response"))
            }
            Err(_) => {
                conn.pending.lock().expect("pending map poisoned").remove(tag);
                Err(RecorderError::Timeout { duration: response_timeout })
            }
        }
    }

    /// Tear down the connection. Idempotent.
    ///
    /// Cancels the reader task, shuts the socket down normally, and drops
    /// every pending waiter — their callers observe a channel-closed error
    /// rather than waiting out their timeout.
    pub async fn disconnect(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.cancel.cancel();
            {
                let mut writer = conn.writer.lock().await;
                let _ = writer.shutdown().await;
            }
            conn.pending.lock().expect("pending map poisoned").clear();
            debug!("control channel disconnected");
        }
    }
}

impl Connection {
    fn start(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        let pending: PendingMap = Arc::new(StdMutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        tokio::spawn(reader_task(read_half, Arc::clone(&pending), cancel.clone()));

        Self { writer: Mutex::new(write_half), pending, cancel }
    }
}

/// Reads inbound lines and dispatches them to waiters until the socket
/// closes or the connection is torn down.
async fn reader_task(read_half: OwnedReadHalf, pending: PendingMap, cancel: CancellationToken) {
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) => dispatch_line(&line, &pending),
            Ok(None) => {
                debug!("control endpoint closed the connection");
                break;
            }
            Err(err) => {
                warn!(%err, "control channel read failed");
                break;
            }
        }
    }

    // Wake any remaining waiters with a closed-channel error instead of
    // leaving them to their timeouts.
    pending.lock().expect("pending map poisoned").clear();
}

fn dispatch_line(line: &str, pending: &PendingMap) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }

    let response: RigResponse = match serde_json::from_str(trimmed) {
        Ok(response) => response,
        Err(err) => {
            debug!(%err, "dropping unparseable control message");
            return;
        }
    };

    let tag = response.tag();
    let waiter = pending.lock().expect("pending map poisoned").remove(tag);
    match waiter {
        // The waiter may have timed out just now; a failed send is fine.
        Some(tx) => {
            let _ = tx.send(response);
        }
        None => debug!(tag, "dropping control message with no waiter"),
    }
}
