// ── Polling fallback ──
//
// While the event stream is down, fetch the newest history page on a
// fixed interval so alarms still surface within one interval. Parks as
// soon as the stream reports open and resumes (with an immediate poll)
// when it drops again.

use std::time::Duration;

use fleetalarm_api::{AlarmClient, RawRecord};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Page polled by the fallback: the newest alarms.
const POLL_PAGE: u32 = 1;

/// Result of one poll.
#[derive(Debug)]
pub enum PollEvent {
    Batch(Vec<RawRecord>),
    Failed(String),
}

/// Periodic history poller gated on the stream's connected flag.
#[derive(Debug, Clone)]
pub struct PollingFallback {
    client: AlarmClient,
    interval: Duration,
    page_size: u32,
}

impl PollingFallback {
    pub fn new(client: AlarmClient, interval: Duration, page_size: u32) -> Self {
        Self {
            client,
            interval,
            page_size,
        }
    }

    /// Spawn the poll loop.
    ///
    /// Polls only while `connected` is `false`. If the sender side of
    /// `connected` goes away the stream is considered permanently down.
    pub fn spawn(
        self,
        connected: watch::Receiver<bool>,
        tx: mpsc::Sender<PollEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(connected, tx, cancel).await })
    }

    async fn run(
        self,
        mut connected: watch::Receiver<bool>,
        tx: mpsc::Sender<PollEvent>,
        cancel: CancellationToken,
    ) {
        let mut stream_tracked = true;

        loop {
            // Park while the stream is up.
            if stream_tracked && *connected.borrow_and_update() {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    changed = connected.changed() => {
                        if changed.is_err() {
                            stream_tracked = false;
                        }
                    }
                }
                continue;
            }

            info!(interval_secs = self.interval.as_secs(), "stream down, polling fallback active");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    changed = connected.changed(), if stream_tracked => {
                        if changed.is_err() {
                            stream_tracked = false;
                        } else if *connected.borrow_and_update() {
                            info!("stream open, polling fallback paused");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if !self.poll_once(&tx, &cancel).await {
                            return;
                        }
                    }
                }
            }
        }

        debug!("polling fallback exiting");
    }

    /// One fetch + delivery. Returns `false` when the loop should stop.
    async fn poll_once(&self, tx: &mpsc::Sender<PollEvent>, cancel: &CancellationToken) -> bool {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return false,
            result = self.client.fetch_historical(POLL_PAGE, self.page_size) => result,
        };

        let event = match result {
            Ok(records) => {
                debug!(count = records.len(), "fallback poll succeeded");
                PollEvent::Batch(records)
            }
            Err(e) => {
                warn!(error = %e, "fallback poll failed");
                PollEvent::Failed(e.to_string())
            }
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            sent = tx.send(event) => sent.is_ok(),
        }
    }
}
