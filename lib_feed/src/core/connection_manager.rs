//! # Connection Manager
//!
//! Keeps one logical connection to an event source alive: it opens a channel
//! through a [`Connector`], forwards every well-formed event to an
//! [`EventSink`] in arrival order, and on failure reconnects with exponential
//! backoff until it is shut down.
//!
//! ## Core Design Principles:
//!
//! 1.  **Single Owner**: The manager runs as one tokio task that exclusively owns
//!     the [`ConnectionMachine`], the active channel task and the retry timer.
//!     Everything else talks to it through channels, so nothing is locked.
//!
//! 2.  **Generation-Tagged Channel Events**: Each channel runs in its own reader
//!     task and reports `Opened` / `Frame` / `Closed` tagged with its
//!     [`ChannelId`]. When a channel is replaced its task is aborted, and
//!     anything it had already queued is rejected by the machine's generation
//!     check.
//!
//! 3.  **Cancellable Retry Timer**: A pending retry is an `Option<Sleep>` polled
//!     inside the main `select!`. Replacing the channel or shutting down simply
//!     drops it.
//!
//! 4.  **Absorbed Payload Errors**: Malformed frames are counted and logged; they
//!     never reach the sink and never touch connection state.
//!
//! The consumer holds a [`ConnectionHandle`] for status, manual reconnect,
//! statistics and shutdown. Dropping the handle also stops the manager.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::backoff::{Backoff, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY, MAX_JITTER_RATIO};
use super::connection::{ChannelId, ConnectionMachine, ConnectionState, StatusSnapshot};
use super::event::{FeedEvent, Frame, FrameError};
use super::transport::{Connector, RawFrame, TransportError};

/// Default event source address.
pub const DEFAULT_FEED_URL: &str = "ws://localhost:8080/ws";

/// Invalid connection settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// No address configured.
    #[error("feed url must not be empty")]
    EmptyUrl,

    /// The address does not parse as a URL.
    #[error("invalid feed url '{url}': {reason}")]
    InvalidUrl {
        /// Address as configured.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The first retry delay is zero.
    #[error("initial reconnect delay must be greater than zero")]
    ZeroInitialDelay,

    /// The ceiling is below the first delay.
    #[error("max reconnect delay ({max_ms} ms) is below the initial delay ({initial_ms} ms)")]
    MaxBelowInitial {
        /// Configured initial delay.
        initial_ms: u128,
        /// Configured ceiling.
        max_ms: u128,
    },

    /// Jitter ratio outside `[0, MAX_JITTER_RATIO]`.
    #[error("reconnect jitter ratio must be within [0, 0.9], got {0}")]
    InvalidJitter(f64),
}

/// Settings for one [`ConnectionManager`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Event source address.
    pub url: String,
    /// First retry delay after a failure.
    pub initial_delay: Duration,
    /// Retry delay ceiling.
    pub max_delay: Duration,
    /// Fraction of each retry delay that may be randomly shaved off.
    pub jitter_ratio: f64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_ratio: 0.0,
        }
    }
}

impl ConnectionConfig {
    /// Default settings for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), ..Default::default() }
    }

    /// Checks the settings before the manager starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::EmptyUrl);
        }
        if let Err(e) = url::Url::parse(&self.url) {
            return Err(ConfigError::InvalidUrl { url: self.url.clone(), reason: e.to_string() });
        }
        if self.initial_delay.is_zero() {
            return Err(ConfigError::ZeroInitialDelay);
        }
        if self.max_delay < self.initial_delay {
            return Err(ConfigError::MaxBelowInitial {
                initial_ms: self.initial_delay.as_millis(),
                max_ms: self.max_delay.as_millis(),
            });
        }
        if !(0.0..=MAX_JITTER_RATIO).contains(&self.jitter_ratio) {
            return Err(ConfigError::InvalidJitter(self.jitter_ratio));
        }
        Ok(())
    }

    fn backoff(&self) -> Backoff {
        Backoff::new(self.initial_delay, self.max_delay).with_jitter(self.jitter_ratio)
    }
}

/// # Event Sink
///
/// The ingestion callback. Invoked on the manager task, once per valid event,
/// in arrival order.
pub trait EventSink: Send + 'static {
    /// Absorbs one validated event.
    fn ingest(&mut self, event: FeedEvent);
}

impl<F> EventSink for F
where
    F: FnMut(FeedEvent) + Send + 'static,
{
    fn ingest(&mut self, event: FeedEvent) {
        self(event)
    }
}

/// Counters shared between the manager task and its handle.
#[derive(Debug, Default)]
struct IngestCounters {
    frames_received: AtomicU64,
    events_forwarded: AtomicU64,
    malformed_frames: AtomicU64,
    non_object_frames: AtomicU64,
    heartbeats: AtomicU64,
    remote_errors: AtomicU64,
    connection_attempts: AtomicU64,
    successful_connects: AtomicU64,
}

impl IngestCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> IngestStats {
        IngestStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            events_forwarded: self.events_forwarded.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            non_object_frames: self.non_object_frames.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            remote_errors: self.remote_errors.load(Ordering::Relaxed),
            connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
            successful_connects: self.successful_connects.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the ingest counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Text frames read from any current channel.
    pub frames_received: u64,
    /// Events handed to the sink.
    pub events_forwarded: u64,
    /// Frames that failed to parse or validate.
    pub malformed_frames: u64,
    /// Frames that parsed to something other than an object.
    pub non_object_frames: u64,
    /// Heartbeat envelopes.
    pub heartbeats: u64,
    /// Error envelopes reported by the producer.
    pub remote_errors: u64,
    /// Channels opened or attempted.
    pub connection_attempts: u64,
    /// Attempts that reached `Connected`.
    pub successful_connects: u64,
}

#[derive(Debug)]
enum Command {
    ReconnectNow,
}

#[derive(Debug)]
enum ChannelEventKind {
    Opened,
    Frame(RawFrame),
    Closed(Option<TransportError>),
}

#[derive(Debug)]
struct ChannelEvent {
    channel: ChannelId,
    kind: ChannelEventKind,
}

/// # Connection Handle
///
/// Consumer-side view of a running [`ConnectionManager`].
pub struct ConnectionHandle {
    status: watch::Receiver<StatusSnapshot>,
    commands: mpsc::UnboundedSender<Command>,
    counters: Arc<IngestCounters>,
    token: CancellationToken,
    task: JoinHandle<()>,
    _drop_guard: DropGuard,
}

impl ConnectionHandle {
    /// Current lifecycle state.
    pub fn status(&self) -> ConnectionState {
        self.status.borrow().state
    }

    /// Last transport error, if any.
    pub fn last_error(&self) -> Option<String> {
        self.status.borrow().last_error.clone()
    }

    /// State and last error together.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    /// A receiver notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }

    /// Drops the active channel and any pending retry and connects again
    /// immediately.
    pub fn reconnect_now(&self) {
        if self.commands.send(Command::ReconnectNow).is_err() {
            log::debug!("Reconnect requested after the connection manager stopped.");
        }
    }

    /// Current ingest counters.
    pub fn stats(&self) -> IngestStats {
        self.counters.snapshot()
    }

    /// Stops reconnecting, releases the channel and waits for the manager task
    /// to exit. Status is left `Disconnected`.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            log::error!("Connection manager task ended abnormally: {}", e);
        }
    }
}

/// # Connection Manager
///
/// The async driver. Construct and start it with [`ConnectionManager::spawn`].
pub struct ConnectionManager<C: Connector, S: EventSink> {
    url: String,
    connector: Arc<C>,
    sink: S,
    machine: ConnectionMachine,
    status_tx: watch::Sender<StatusSnapshot>,
    counters: Arc<IngestCounters>,
    channel_task: Option<JoinHandle<()>>,
    retry_timer: Option<Pin<Box<Sleep>>>,
    events_tx: mpsc::UnboundedSender<ChannelEvent>,
    events_rx: mpsc::UnboundedReceiver<ChannelEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    token: CancellationToken,
}

impl<C: Connector, S: EventSink> ConnectionManager<C, S> {
    /// Validates `config`, spawns the manager on the current tokio runtime and
    /// starts the first connection attempt.
    pub fn spawn(config: ConnectionConfig, connector: C, sink: S) -> Result<ConnectionHandle, ConfigError> {
        config.validate()?;

        let (status_tx, status_rx) = watch::channel(StatusSnapshot::default());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let counters = Arc::new(IngestCounters::default());
        let token = CancellationToken::new();

        let manager = Self {
            machine: ConnectionMachine::new(config.backoff()),
            url: config.url,
            connector: Arc::new(connector),
            sink,
            status_tx,
            counters: Arc::clone(&counters),
            channel_task: None,
            retry_timer: None,
            events_tx,
            events_rx,
            commands: command_rx,
            token: token.clone(),
        };

        let task = tokio::spawn(manager.run());

        Ok(ConnectionHandle {
            status: status_rx,
            commands: command_tx,
            counters,
            _drop_guard: token.clone().drop_guard(),
            token,
            task,
        })
    }

    /// Main loop: commands, channel events and the retry timer, until cancelled.
    async fn run(mut self) {
        log::info!("Connection manager started for {}", self.url);

        let first = self.machine.begin_attempt();
        self.open_channel(first);

        loop {
            tokio::select! {
                biased;

                _ = self.token.cancelled() => break,

                Some(command) = self.commands.recv() => match command {
                    Command::ReconnectNow => {
                        log::info!("Manual reconnect requested.");
                        let id = self.machine.reconnect_now();
                        self.open_channel(id);
                    }
                },

                Some(event) = self.events_rx.recv() => self.handle_channel_event(event),

                _ = retry_due(&mut self.retry_timer) => {
                    self.retry_timer = None;
                    let id = self.machine.retry_elapsed();
                    self.open_channel(id);
                }
            }
        }

        self.machine.teardown();
        self.detach_channel();
        self.publish();
        log::info!("Connection manager stopped.");
    }

    /// Aborts the current reader task and cancels any pending retry.
    fn detach_channel(&mut self) {
        if let Some(task) = self.channel_task.take() {
            task.abort();
        }
        self.retry_timer = None;
    }

    /// Replaces the active channel with a new attempt stamped `id`.
    fn open_channel(&mut self, id: Option<ChannelId>) {
        self.detach_channel();
        let Some(id) = id else {
            return;
        };

        IngestCounters::bump(&self.counters.connection_attempts);
        self.publish();
        log::info!("Connecting to {} (channel {})", self.url, id);

        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        let tx = self.events_tx.clone();

        self.channel_task = Some(tokio::spawn(async move {
            let send = |kind| tx.send(ChannelEvent { channel: id, kind }).is_ok();

            let mut frames = match connector.connect(&url).await {
                Ok(frames) => frames,
                Err(e) => {
                    send(ChannelEventKind::Closed(Some(e)));
                    return;
                }
            };
            if !send(ChannelEventKind::Opened) {
                return;
            }

            while let Some(item) = frames.next().await {
                match item {
                    Ok(raw) => {
                        if !send(ChannelEventKind::Frame(raw)) {
                            return;
                        }
                    }
                    Err(e) => {
                        send(ChannelEventKind::Closed(Some(e)));
                        return;
                    }
                }
            }
            send(ChannelEventKind::Closed(None));
        }));
    }

    fn handle_channel_event(&mut self, event: ChannelEvent) {
        let id = event.channel;
        match event.kind {
            ChannelEventKind::Opened => {
                if self.machine.channel_opened(id) {
                    IngestCounters::bump(&self.counters.successful_connects);
                    log::info!("Connected to {} (channel {})", self.url, id);
                    self.publish();
                } else {
                    log::debug!("Ignoring open from stale channel {}", id);
                }
            }
            ChannelEventKind::Frame(raw) => {
                if self.machine.is_current(id) && self.machine.state() == ConnectionState::Connected {
                    self.handle_frame(&raw);
                } else {
                    log::debug!("Ignoring frame from stale channel {}", id);
                }
            }
            ChannelEventKind::Closed(error) => {
                let reason = error.as_ref().map(ToString::to_string);
                match self.machine.channel_closed(id, reason.clone()) {
                    Some(delay) => {
                        self.channel_task = None;
                        let sleep = self.machine.backoff().jittered();
                        match reason {
                            Some(reason) => log::warn!(
                                "Disconnected: {}. Retrying in {}ms (channel {})",
                                reason,
                                delay.as_millis(),
                                id
                            ),
                            None => log::warn!(
                                "Disconnected. Retrying in {}ms (channel {})",
                                delay.as_millis(),
                                id
                            ),
                        }
                        self.retry_timer = Some(Box::pin(tokio::time::sleep(sleep)));
                        self.publish();
                    }
                    None => log::debug!("Ignoring close from stale channel {}", id),
                }
            }
        }
    }

    fn handle_frame(&mut self, raw: &RawFrame) {
        IngestCounters::bump(&self.counters.frames_received);

        let parsed = match raw {
            RawFrame::Text(text) => Frame::parse(text),
            RawFrame::Binary(bytes) => Frame::parse_bytes(bytes),
        };
        match parsed {
            Ok(Frame::Event(event)) => {
                IngestCounters::bump(&self.counters.events_forwarded);
                self.sink.ingest(event);
            }
            Ok(Frame::Heartbeat) => {
                IngestCounters::bump(&self.counters.heartbeats);
                log::trace!("Heartbeat received.");
            }
            Ok(Frame::RemoteError(message)) => {
                IngestCounters::bump(&self.counters.remote_errors);
                log::warn!("Producer reported an error: {}", message);
            }
            Err(FrameError::NotAnObject) => {
                IngestCounters::bump(&self.counters.non_object_frames);
                log::debug!("Discarding non-object frame.");
            }
            Err(e) => {
                IngestCounters::bump(&self.counters.malformed_frames);
                log::warn!("Discarding malformed frame: {}", e);
            }
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.machine.snapshot());
    }
}

/// Resolves when the retry timer fires; never resolves when none is armed.
async fn retry_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(sleep) => sleep.await,
        None => std::future::pending().await,
    }
}
