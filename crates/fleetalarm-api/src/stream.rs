//! Server-sent alarm stream with auto-reconnect.
//!
//! Opens the backend's `text/event-stream` endpoint, decodes `data:` frames
//! into raw alarm records, and forwards them through a [`tokio::sync::mpsc`]
//! channel. Reconnects with exponential backoff + jitter whenever the
//! stream errors, stalls, or ends, until [`StreamHandle::stop`] is called.
//!
//! # Example
//!
//! ```rust,ignore
//! use fleetalarm_api::{StreamConfig, StreamConnection, StreamEvent, TransportConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let http = TransportConfig::default().build_stream_client()?;
//! let (tx, mut rx) = tokio::sync::mpsc::channel(256);
//! let handle = StreamConnection::new(http, StreamConfig::new(url))
//!     .start(tx, CancellationToken::new());
//!
//! while let Some(event) = rx.recv().await {
//!     if let StreamEvent::Record(raw) = event {
//!         println!("{raw}");
//!     }
//! }
//!
//! handle.stop().await;
//! ```

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::client::check_status;
use crate::error::Error;
use crate::models::{RawRecord, record_id};

/// How many record ids a single connection remembers for its own de-dup pass.
const SEEN_CAPACITY: usize = 4096;

/// Longest partial line buffered while waiting for its newline.
const MAX_LINE_BYTES: usize = 1024 * 1024;

// ── Public types ─────────────────────────────────────────────────────

/// Lifecycle of a stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// What the stream task delivers to its consumer, in wire order.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// One decoded `data:` frame.
    Record(RawRecord),
    /// `true` once the endpoint answered and the body is being read,
    /// `false` when that connection is gone.
    Status(bool),
}

/// Exponential backoff configuration for stream reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum consecutive failed attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

/// Everything a [`StreamConnection`] needs besides the HTTP client.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: Url,
    pub reconnect: ReconnectConfig,
    /// Treat a connection that yields no bytes for this long as failed.
    /// `None` disables idle detection.
    pub idle_timeout: Option<Duration>,
}

impl StreamConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            reconnect: ReconnectConfig::default(),
            idle_timeout: Some(Duration::from_secs(90)),
        }
    }
}

// ── StreamConnection ─────────────────────────────────────────────────

/// A not-yet-started stream connection.
pub struct StreamConnection {
    http: reqwest::Client,
    config: StreamConfig,
}

impl StreamConnection {
    /// `http` should come from [`TransportConfig::build_stream_client`](crate::TransportConfig::build_stream_client)
    /// so the bearer token is attached and no total-request timeout applies.
    pub fn new(http: reqwest::Client, config: StreamConfig) -> Self {
        Self { http, config }
    }

    /// Spawn the connection loop and return a handle to it.
    ///
    /// Records and status changes are sent on `event_tx`. Cancelling
    /// `cancel` (or calling [`StreamHandle::stop`]) ends the loop.
    pub fn start(self, event_tx: mpsc::Sender<StreamEvent>, cancel: CancellationToken) -> StreamHandle {
        let (state_tx, state_rx) = watch::channel(StreamState::Idle);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            stream_loop(self.http, self.config, event_tx, state_tx, task_cancel).await;
        });

        StreamHandle {
            cancel,
            state: state_rx,
            task,
        }
    }
}

// ── StreamHandle ─────────────────────────────────────────────────────

/// Handle to a running stream connection.
pub struct StreamHandle {
    cancel: CancellationToken,
    state: watch::Receiver<StreamState>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    /// Observe connection state transitions.
    pub fn state(&self) -> watch::Receiver<StreamState> {
        self.state.clone()
    }

    /// Whether the stream is currently open.
    pub fn is_connected(&self) -> bool {
        *self.state.borrow() == StreamState::Open
    }

    /// Whether [`stop`](Self::stop) has been requested.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel the in-flight read and wait for the task to exit.
    ///
    /// Once this returns the task has finished, so no further events
    /// will be sent.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "stream task ended abnormally");
        }
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on end or error, backoff → reconnect.
async fn stream_loop(
    http: reqwest::Client,
    config: StreamConfig,
    event_tx: mpsc::Sender<StreamEvent>,
    state_tx: watch::Sender<StreamState>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        let _ = state_tx.send(StreamState::Connecting);

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(&http, &config, &event_tx, &state_tx, &cancel) => result,
        };

        // A connection that actually opened resets the backoff.
        if *state_tx.borrow() == StreamState::Open {
            attempt = 0;
            let _ = state_tx.send(StreamState::Closed);
            if !deliver(&event_tx, &cancel, StreamEvent::Status(false)).await {
                break;
            }
        } else {
            let _ = state_tx.send(StreamState::Closed);
        }

        match result {
            Ok(()) => tracing::info!("alarm stream ended, reconnecting"),
            Err(e) => tracing::warn!(error = %e, attempt, "alarm stream error"),
        }

        if let Some(max) = config.reconnect.max_retries {
            if attempt >= max {
                tracing::error!(
                    max_retries = max,
                    "alarm stream reconnection limit reached, giving up"
                );
                break;
            }
        }

        let delay = calculate_backoff(attempt, &config.reconnect);
        tracing::info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        attempt = attempt.saturating_add(1);
    }

    let _ = state_tx.send(StreamState::Closed);
    tracing::debug!("alarm stream loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Open one connection and read frames until it ends, errors, or stalls.
async fn connect_and_read(
    http: &reqwest::Client,
    config: &StreamConfig,
    event_tx: &mpsc::Sender<StreamEvent>,
    state_tx: &watch::Sender<StreamState>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    tracing::info!(url = %config.url, "connecting to alarm stream");

    let resp = http
        .get(config.url.clone())
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .send()
        .await
        .map_err(|e| Error::StreamConnect(e.to_string()))?;
    let resp = check_status(resp).await?;

    let _ = state_tx.send(StreamState::Open);
    tracing::info!("alarm stream open");
    if !deliver(event_tx, cancel, StreamEvent::Status(true)).await {
        return Ok(());
    }

    let mut body = resp.bytes_stream();
    let mut decoder = FrameDecoder::default();
    let mut seen = SeenIds::new(SEEN_CAPACITY);

    loop {
        let next = match config.idle_timeout {
            Some(idle) => tokio::time::timeout(idle, body.next())
                .await
                .map_err(|_| Error::StreamIdle {
                    idle_secs: idle.as_secs(),
                })?,
            None => body.next().await,
        };

        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err(Error::StreamConnect(e.to_string())),
            None => return Ok(()),
        };

        for record in decoder.push(&chunk) {
            if let Some(id) = record_id(&record) {
                if !seen.insert(id) {
                    tracing::trace!("dropping record already seen on this connection");
                    continue;
                }
            }
            if !deliver(event_tx, cancel, StreamEvent::Record(record)).await {
                return Ok(());
            }
        }
    }
}

/// Send one event unless cancelled. Returns `false` when the loop should stop.
async fn deliver(
    event_tx: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
    event: StreamEvent,
) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        sent = event_tx.send(event) => sent.is_ok() && !cancel.is_cancelled(),
    }
}

// ── Frame decoding ───────────────────────────────────────────────────

/// Line accumulator for the `data: <json>` wire format.
///
/// Splits on `\n` at the byte level, so a multi-byte UTF-8 character
/// split across chunks is reassembled before decoding. The trailing
/// partial line stays buffered for the next chunk, up to `max_line`
/// bytes; a longer line is dropped up to its terminating newline.
#[derive(Debug)]
pub(crate) struct FrameDecoder {
    buffer: Vec<u8>,
    max_line: usize,
    /// Skipping the remainder of an oversized line.
    discarding: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }
}

impl FrameDecoder {
    pub(crate) fn with_limit(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line,
            discarding: false,
        }
    }

    /// Feed one chunk, returning every record completed by it.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<RawRecord> {
        // Only the new bytes are scanned; the buffer never holds a newline.
        let Some(last_newline) = chunk.iter().rposition(|b| *b == b'\n') else {
            self.hold(chunk);
            return Vec::new();
        };
        let (head, tail) = chunk.split_at(last_newline + 1);

        let mut complete = std::mem::take(&mut self.buffer);
        complete.extend_from_slice(head);

        let mut lines = complete.split(|b| *b == b'\n');
        if std::mem::take(&mut self.discarding) {
            lines.next();
        }
        let records: Vec<RawRecord> = lines.filter_map(parse_line).collect();

        self.hold(tail);
        records
    }

    fn hold(&mut self, partial: &[u8]) {
        if self.discarding {
            return;
        }
        if self.buffer.len() + partial.len() > self.max_line {
            tracing::warn!(limit = self.max_line, "stream line too long, dropping frame");
            self.buffer.clear();
            self.discarding = true;
            return;
        }
        self.buffer.extend_from_slice(partial);
    }
}

/// Parse one complete line. Non-`data` lines (comments, `event:`, `id:`,
/// blank separators) are ignored; malformed JSON is logged and skipped.
fn parse_line(line: &[u8]) -> Option<RawRecord> {
    let line = String::from_utf8_lossy(line);
    let line = line.strip_suffix('\r').unwrap_or(&line);
    let payload = line.strip_prefix("data:")?;
    let payload = payload.strip_prefix(' ').unwrap_or(payload);

    if payload.trim().is_empty() {
        return None;
    }

    match serde_json::from_str(payload) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::debug!(error = %e, "skipping malformed stream frame");
            None
        }
    }
}

// ── Connection-local de-dup ──────────────────────────────────────────

/// Bounded FIFO set of ids already forwarded by one connection.
///
/// Reset on every reconnect; cross-connection de-dup is the reconciler's job.
struct SeenIds {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl SeenIds {
    fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Returns `true` if the id was not seen before.
    fn insert(&mut self, id: String) -> bool {
        if self.ids.contains(&id) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.ids.insert(id.clone());
        self.order.push_back(id);
        true
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 ± 0.25)`
///
/// Jitter spreads out reconnection storms from many dashboards.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(31)).unwrap_or(31);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        let d10 = calculate_backoff(10, &config);
        // With jitter factor up to 1.25, max effective is 12.5s
        assert!(
            d10 <= Duration::from_secs(13),
            "delay at attempt 10 ({d10:?}) should be capped near max_delay"
        );
        // Very large attempt counts must not overflow.
        assert!(calculate_backoff(u32::MAX, &config) <= Duration::from_secs(13));
    }

    #[test]
    fn decoder_parses_complete_frames() {
        let mut decoder = FrameDecoder::default();
        let records = decoder.push(b"data: {\"alarmId\":\"A1\"}\n\ndata: {\"alarmId\":\"A2\"}\n\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["alarmId"], "A1");
        assert_eq!(records[1]["alarmId"], "A2");
    }

    #[test]
    fn decoder_retains_partial_line() {
        let mut decoder = FrameDecoder::default();
        assert!(decoder.push(b"data: {\"alarmId\":").is_empty());
        assert!(decoder.push(b"\"A1\", \"speed\": 4").is_empty());
        let records = decoder.push(b"2}\n");
        assert_eq!(records, vec![json!({ "alarmId": "A1", "speed": 42 })]);
    }

    #[test]
    fn decoder_reassembles_split_utf8() {
        let frame = "data: {\"description\":\"Überholverbot\"}\n".as_bytes();
        // Split inside the two-byte `Ü`.
        let split = frame.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut decoder = FrameDecoder::default();
        assert!(decoder.push(&frame[..split]).is_empty());
        let records = decoder.push(&frame[split..]);
        assert_eq!(records[0]["description"], "Überholverbot");
    }

    #[test]
    fn decoder_skips_malformed_and_non_data_lines() {
        let mut decoder = FrameDecoder::default();
        let records = decoder.push(
            b": keepalive\nevent: alarm\ndata: {not json}\r\ndata: {\"id\":\"ok\"}\r\ndata:\n",
        );
        assert_eq!(records, vec![json!({ "id": "ok" })]);
    }

    #[test]
    fn decoder_drops_oversized_line_and_recovers() {
        let mut decoder = FrameDecoder::with_limit(16);
        assert!(decoder.push(b"data: {\"description\":\"").is_empty());
        assert!(decoder.push(&[b'x'; 64]).is_empty());
        assert!(decoder.buffer.is_empty());

        // The tail of the long line is skipped, the next frame decodes.
        let records = decoder.push(b"xx\"}\ndata: {\"id\":\"ok\"}\n");
        assert_eq!(records, vec![json!({ "id": "ok" })]);
        assert!(!decoder.discarding);
    }

    #[test]
    fn seen_ids_evicts_oldest() {
        let mut seen = SeenIds::new(2);
        assert!(seen.insert("a".into()));
        assert!(seen.insert("b".into()));
        assert!(!seen.insert("a".into()));
        assert!(seen.insert("c".into()));
        // "a" was evicted to make room for "c".
        assert!(seen.insert("a".into()));
        assert!(!seen.insert("c".into()));
    }
}
