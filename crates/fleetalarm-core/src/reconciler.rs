// ── Reconciler ──
//
// Owns the canonical alarm set and the session `seen` ids. Stream
// records, fallback polls and caller intents all arrive as messages on
// one actor task, which normalizes, folds into the store, and fires
// notifications for genuinely new live alarms.

use std::sync::Arc;
use std::time::Duration;

use fleetalarm_api::{
    AlarmAction, AlarmClient, RawRecord, StreamConfig, StreamConnection, StreamEvent, StreamHandle,
};
use strum::Display;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::ReconcilerCommand;
use crate::config::ReconcilerConfig;
use crate::error::CoreError;
use crate::merge::merge_with_capacity;
use crate::model::{Alarm, AlarmStatus, Channel};
use crate::normalize::normalize;
use crate::notify::NotificationSideEffects;
use crate::polling::{PollEvent, PollingFallback};
use crate::store::{AlarmCounts, AlarmSnapshot, AlarmStore, IngestOutcome, count};
use crate::stream::AlarmStream;

const COMMAND_CHANNEL_SIZE: usize = 64;
const STREAM_CHANNEL_SIZE: usize = 256;
const POLL_CHANNEL_SIZE: usize = 8;
const BROADCAST_CAPACITY: usize = 256;
const WATCHDOG_PERIOD: Duration = Duration::from_secs(1);

/// First page index of `GET /alarms/historical`.
const FIRST_PAGE: u32 = 1;

// ── Observable state ─────────────────────────────────────────────

/// Whether alarms are currently reaching the canonical set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Liveness {
    /// Starting up, or the stream just dropped and no poll has landed yet.
    Connecting,
    /// The event stream is open.
    Live,
    /// The stream is down but fallback polls are succeeding.
    Polling,
    /// Neither channel has delivered within the staleness window.
    Stale,
}

/// Out-of-band notices for the UI layer.
#[derive(Debug, Clone)]
pub enum ReconcilerEvent {
    /// The backend refused or failed an acknowledge/resolve. The local
    /// status change is kept.
    MutationFailed {
        id: String,
        action: AlarmAction,
        message: String,
    },
    /// A fallback poll failed.
    PollFailed { message: String },
}

/// Summary of a [`Reconciler::load_history`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryLoad {
    pub pages: u32,
    pub fetched: usize,
    pub added: usize,
}

// ── Reconciler ───────────────────────────────────────────────────

/// Handle to the alarm reconciler.
///
/// Cheaply cloneable via `Arc<ReconcilerInner>`. Create with
/// [`new`](Self::new), then [`start`](Self::start) the background
/// channels, and [`shutdown`](Self::shutdown) when done.
#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<ReconcilerInner>,
}

struct ReconcilerInner {
    config: ReconcilerConfig,
    client: AlarmClient,
    snapshot: watch::Receiver<AlarmSnapshot>,
    liveness: watch::Receiver<Liveness>,
    new_alarm_tx: broadcast::Sender<Arc<Alarm>>,
    event_tx: broadcast::Sender<ReconcilerEvent>,
    command_tx: mpsc::Sender<ReconcilerCommand>,
    /// Actor state, moved into the actor task by `start()`.
    pending: Mutex<Option<Actor>>,
    command_rx: Mutex<Option<mpsc::Receiver<ReconcilerCommand>>>,
    cancel: CancellationToken,
    stream: Mutex<Option<StreamHandle>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Reconciler {
    /// Build a reconciler. Does NOT touch the network; call
    /// [`start()`](Self::start) to load history and open the channels.
    pub fn new(
        config: ReconcilerConfig,
        effects: NotificationSideEffects,
    ) -> Result<Self, CoreError> {
        let client = AlarmClient::new(config.api_url.clone(), &config.transport())?;
        let store = AlarmStore::new(config.capacity);
        let snapshot = store.subscribe();
        let (liveness_tx, liveness) = watch::channel(Liveness::Connecting);
        let (new_alarm_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (event_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (connected_tx, _) = watch::channel(false);

        let stream_channel = if config.device_id.is_some() {
            Channel::LocalStream
        } else {
            Channel::GlobalStream
        };

        let actor = Actor {
            store,
            effects: Some(effects),
            notify_tx: None,
            new_alarm_tx: new_alarm_tx.clone(),
            event_tx: event_tx.clone(),
            liveness: liveness_tx,
            connected: connected_tx,
            stream_channel,
            stale_after: config.stale_after,
            stream_connected: false,
            down_since: Instant::now(),
            last_poll_ok: None,
        };

        Ok(Self {
            inner: Arc::new(ReconcilerInner {
                config,
                client,
                snapshot,
                liveness,
                new_alarm_tx,
                event_tx,
                command_tx,
                pending: Mutex::new(Some(actor)),
                command_rx: Mutex::new(Some(command_rx)),
                cancel: CancellationToken::new(),
                stream: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Access the reconciler configuration.
    pub fn config(&self) -> &ReconcilerConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Spawn the actor, notifier, event stream and polling fallback,
    /// then load the configured number of history pages.
    ///
    /// A failed initial history load is fatal only when the backend
    /// rejected the token; otherwise the live channels carry on.
    pub async fn start(&self) -> Result<(), CoreError> {
        let config = &self.inner.config;

        // Build the stream before spawning anything so a bad TLS setup
        // fails without leaving tasks behind.
        let stream = if config.stream_enabled {
            let http = config.transport().build_stream_client()?;
            let url = self.inner.client.stream_url(config.device_id.as_deref())?;
            Some(StreamConnection::new(
                http,
                StreamConfig {
                    url,
                    reconnect: config.reconnect.clone(),
                    idle_timeout: config.idle_timeout,
                },
            ))
        } else {
            None
        };

        let (Some(mut actor), Some(command_rx)) = (
            self.inner.pending.lock().await.take(),
            self.inner.command_rx.lock().await.take(),
        ) else {
            debug!("reconciler already started");
            return Ok(());
        };

        let mut handles = self.inner.task_handles.lock().await;

        if let Some(effects) = actor.effects.take() {
            let (notify_tx, notify_handle) = effects.spawn();
            actor.notify_tx = Some(notify_tx);
            handles.push(notify_handle);
        }

        let (stream_tx, stream_rx) = mpsc::channel(STREAM_CHANNEL_SIZE);
        if let Some(connection) = stream {
            let handle = connection.start(stream_tx, self.inner.cancel.child_token());
            *self.inner.stream.lock().await = Some(handle);
            info!(channel = %actor.stream_channel, "alarm stream spawned");
        }

        let (poll_tx, poll_rx) = mpsc::channel(POLL_CHANNEL_SIZE);
        let connected = actor.connected.subscribe();

        actor.down_since = Instant::now();
        let cancel = self.inner.cancel.clone();
        handles.push(tokio::spawn(actor.run(command_rx, stream_rx, poll_rx, cancel)));
        drop(handles);

        // History first: the poller fetches the same page, and records it
        // delivers count as live.
        if config.initial_history_pages > 0 {
            match self
                .load_history(config.initial_history_pages, config.history_page_size)
                .await
            {
                Ok(load) => info!(pages = load.pages, added = load.added, "initial history loaded"),
                Err(e @ CoreError::AuthenticationFailed { .. }) => return Err(e),
                Err(e) => warn!(error = %e, "initial history load failed, continuing with live channels"),
            }
        }

        if !config.poll_interval.is_zero() {
            let poller = PollingFallback::new(
                self.inner.client.clone(),
                config.poll_interval,
                config.history_page_size,
            );
            let handle = poller.spawn(connected, poll_tx, self.inner.cancel.child_token());
            self.inner.task_handles.lock().await.push(handle);
        }

        Ok(())
    }

    /// Stop the stream, cancel every background task and wait for all
    /// of them to exit. No record is ingested after this returns.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        if let Some(stream) = self.inner.stream.lock().await.take() {
            stream.stop().await;
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "reconciler task ended abnormally");
            }
        }
        debug!("reconciler shut down");
    }

    /// One-shot: start without live channels, run closure, shut down.
    ///
    /// Optimized for CLI commands that need a single request-response
    /// cycle against the backend.
    pub async fn oneshot<F, Fut, T>(config: ReconcilerConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Reconciler) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.stream_enabled = false;
        cfg.poll_interval = Duration::ZERO;
        cfg.initial_history_pages = 0;

        let reconciler = Reconciler::new(cfg, NotificationSideEffects::new())?;
        reconciler.start().await?;
        let result = f(reconciler.clone()).await;
        reconciler.shutdown().await;
        result
    }

    // ── Ingestion ────────────────────────────────────────────────

    /// Normalize and fold one raw record received on `channel`.
    pub async fn ingest(
        &self,
        raw: RawRecord,
        channel: Channel,
    ) -> Result<IngestOutcome, CoreError> {
        self.request(|reply| ReconcilerCommand::Ingest {
            raw,
            channel,
            reply,
        })
        .await
    }

    /// Fetch history pages `1..=pages` sequentially, stopping early on a
    /// short page, and merge them into the canonical set. Historical
    /// records never trigger notifications.
    pub async fn load_history(&self, pages: u32, size: u32) -> Result<HistoryLoad, CoreError> {
        let mut load = HistoryLoad::default();
        let mut lists = Vec::new();
        let full_page = usize::try_from(size).unwrap_or(usize::MAX);

        for offset in 0..pages {
            let page = FIRST_PAGE.saturating_add(offset);
            let records = self.inner.client.fetch_historical(page, size).await?;
            load.pages += 1;
            load.fetched += records.len();
            let short = records.len() < full_page;
            lists.push(normalize_all(&records, Channel::Historical));
            if short {
                debug!(page, count = records.len(), "short history page, stopping");
                break;
            }
        }

        let alarms = merge_with_capacity(lists, self.inner.config.capacity);
        load.added = self
            .request(|reply| ReconcilerCommand::IngestBatch { alarms, reply })
            .await?;
        Ok(load)
    }

    /// Fetch and normalize one history page without touching the
    /// canonical set.
    pub async fn fetch_page(&self, page: u32, size: u32) -> Result<Vec<Alarm>, CoreError> {
        let records = self.inner.client.fetch_historical(page, size).await?;
        Ok(merge_with_capacity(
            [normalize_all(&records, Channel::Historical)],
            self.inner.config.capacity,
        ))
    }

    // ── Intents ──────────────────────────────────────────────────

    /// Acknowledge an alarm: optimistic local update, then the backend.
    pub async fn acknowledge(&self, id: &str) -> Result<(), CoreError> {
        self.mutate(id, AlarmAction::Acknowledge).await
    }

    /// Resolve an alarm: optimistic local update, then the backend.
    pub async fn resolve(&self, id: &str) -> Result<(), CoreError> {
        self.mutate(id, AlarmAction::Resolve).await
    }

    async fn mutate(&self, id: &str, action: AlarmAction) -> Result<(), CoreError> {
        let target = match action {
            AlarmAction::Acknowledge => AlarmStatus::Acknowledged,
            AlarmAction::Resolve => AlarmStatus::Resolved,
        };

        let local = self
            .request(|reply| ReconcilerCommand::Transition {
                id: id.to_owned(),
                target,
                reply,
            })
            .await?;
        match local {
            Ok(changed) => debug!(alarm_id = id, %action, changed, "optimistic update applied"),
            Err(CoreError::AlarmNotFound { .. }) => {
                debug!(alarm_id = id, %action, "alarm not held locally, forwarding to backend");
            }
            Err(e) => return Err(e),
        }

        if let Err(e) = self.inner.client.mutate(id, action).await {
            let err = if e.is_not_found() {
                CoreError::AlarmNotFound { id: id.to_owned() }
            } else {
                CoreError::from(e)
            };
            warn!(alarm_id = id, %action, error = %err, "backend mutation failed, local status kept");
            let _ = self.inner.event_tx.send(ReconcilerEvent::MutationFailed {
                id: id.to_owned(),
                action,
                message: err.to_string(),
            });
            return Err(err);
        }

        info!(alarm_id = id, %action, "alarm updated");
        Ok(())
    }

    // ── State observation ────────────────────────────────────────

    /// Subscribe to canonical-set changes.
    pub fn subscribe(&self) -> AlarmStream {
        AlarmStream::new(self.inner.snapshot.clone())
    }

    /// Current canonical set, newest first.
    pub fn snapshot(&self) -> AlarmSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Badge counters over the current snapshot.
    pub fn counts(&self) -> AlarmCounts {
        count(&self.snapshot())
    }

    /// Fires once per newly ingested live alarm.
    pub fn new_alarms(&self) -> broadcast::Receiver<Arc<Alarm>> {
        self.inner.new_alarm_tx.subscribe()
    }

    /// Mutation failures and poll failures.
    pub fn events(&self) -> broadcast::Receiver<ReconcilerEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Subscribe to liveness changes.
    pub fn liveness(&self) -> watch::Receiver<Liveness> {
        self.inner.liveness.clone()
    }

    // ── Private helpers ──────────────────────────────────────────

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ReconcilerCommand,
    ) -> Result<T, CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::Stopped);
        }
        if self.inner.pending.lock().await.is_some() {
            return Err(CoreError::Internal("reconciler not started".into()));
        }

        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(build(tx))
            .await
            .map_err(|_| CoreError::Stopped)?;
        rx.await.map_err(|_| CoreError::Stopped)
    }
}

fn normalize_all(records: &[RawRecord], channel: Channel) -> Vec<Alarm> {
    records.iter().map(|raw| normalize(raw, channel)).collect()
}

// ── Actor ────────────────────────────────────────────────────────

/// Single owner of the store. Everything that mutates the canonical
/// set runs here, one message at a time.
struct Actor {
    store: AlarmStore,
    effects: Option<NotificationSideEffects>,
    notify_tx: Option<mpsc::UnboundedSender<Arc<Alarm>>>,
    new_alarm_tx: broadcast::Sender<Arc<Alarm>>,
    event_tx: broadcast::Sender<ReconcilerEvent>,
    liveness: watch::Sender<Liveness>,
    /// Stream open flag, observed by the polling fallback.
    connected: watch::Sender<bool>,
    stream_channel: Channel,
    stale_after: Duration,
    stream_connected: bool,
    down_since: Instant,
    last_poll_ok: Option<Instant>,
}

impl Actor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<ReconcilerCommand>,
        mut stream_rx: mpsc::Receiver<StreamEvent>,
        mut poll_rx: mpsc::Receiver<PollEvent>,
        cancel: CancellationToken,
    ) {
        let mut watchdog = tokio::time::interval(WATCHDOG_PERIOD);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(command) = commands.recv() => self.handle_command(command),
                Some(event) = stream_rx.recv() => self.handle_stream(event),
                Some(event) = poll_rx.recv() => self.handle_poll(event),
                _ = watchdog.tick() => self.refresh_liveness(),
            }
        }

        debug!("reconciler actor exiting");
    }

    fn handle_command(&mut self, command: ReconcilerCommand) {
        match command {
            ReconcilerCommand::Ingest {
                raw,
                channel,
                reply,
            } => {
                let outcome = self.ingest(&raw, channel);
                let _ = reply.send(outcome);
            }
            ReconcilerCommand::IngestBatch { alarms, reply } => {
                let added = self.ingest_batch(alarms, Channel::Historical);
                let _ = reply.send(added);
            }
            ReconcilerCommand::Transition { id, target, reply } => {
                let _ = reply.send(self.store.transition(&id, target));
            }
        }
    }

    fn handle_stream(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Status(connected) => {
                if connected == self.stream_connected {
                    return;
                }
                self.stream_connected = connected;
                self.connected.send_replace(connected);
                if connected {
                    info!("alarm stream connected");
                } else {
                    self.down_since = Instant::now();
                    warn!("alarm stream disconnected");
                }
                self.refresh_liveness();
            }
            StreamEvent::Record(raw) => {
                self.ingest(&raw, self.stream_channel);
            }
        }
    }

    fn handle_poll(&mut self, event: PollEvent) {
        match event {
            PollEvent::Batch(records) => {
                self.last_poll_ok = Some(Instant::now());
                let alarms = normalize_all(&records, Channel::Polling);
                let added = self.ingest_batch(alarms, Channel::Polling);
                debug!(fetched = records.len(), added, "fallback poll applied");
            }
            PollEvent::Failed(message) => {
                let _ = self.event_tx.send(ReconcilerEvent::PollFailed { message });
            }
        }
        self.refresh_liveness();
    }

    fn ingest(&mut self, raw: &RawRecord, channel: Channel) -> IngestOutcome {
        let outcome = self.store.ingest(normalize(raw, channel));
        self.announce(&outcome, channel);
        outcome
    }

    /// Returns how many alarms were new to the session.
    fn ingest_batch(&mut self, alarms: Vec<Alarm>, channel: Channel) -> usize {
        let outcomes = self.store.ingest_batch(alarms);
        for outcome in &outcomes {
            self.announce(outcome, channel);
        }
        outcomes.iter().filter(|o| o.is_new()).count()
    }

    /// Fire side effects for a genuinely new live alarm.
    fn announce(&self, outcome: &IngestOutcome, channel: Channel) {
        let IngestOutcome::New(alarm) = outcome else {
            return;
        };
        if !alarm.is_live {
            debug!(alarm_id = %alarm.id, %channel, "historical alarm added");
            return;
        }

        info!(
            alarm_id = %alarm.id,
            %channel,
            severity = %alarm.severity,
            alarm_type = %alarm.alarm_type,
            "new alarm"
        );
        if let Some(ref tx) = self.notify_tx {
            let _ = tx.send(Arc::clone(alarm));
        }
        let _ = self.new_alarm_tx.send(Arc::clone(alarm));
    }

    fn refresh_liveness(&mut self) {
        let now = Instant::now();
        let next = if self.stream_connected {
            Liveness::Live
        } else if self
            .last_poll_ok
            .is_some_and(|at| now.duration_since(at) < self.stale_after)
        {
            Liveness::Polling
        } else if now.duration_since(self.down_since) < self.stale_after {
            Liveness::Connecting
        } else {
            Liveness::Stale
        };

        let changed = self.liveness.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            if next == Liveness::Stale {
                warn!(
                    stale_after_secs = self.stale_after.as_secs(),
                    "no alarm channel has delivered recently, data may be stale"
                );
            } else {
                info!(liveness = %next, "liveness changed");
            }
        }
    }
}
