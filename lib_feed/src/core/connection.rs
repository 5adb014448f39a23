//! # Connection State Machine
//!
//! The synchronous heart of the connection manager. It owns no sockets and no
//! timers; the async driver in `connection_manager` feeds it lifecycle events
//! and carries out the effects it returns.
//!
//! ## States
//!
//! ```text
//!   Disconnected ──begin_attempt──► Connecting ──channel_opened──► Connected
//!        ▲                              │                              │
//!        └────────── channel_closed ◄───┴──────────────────────────────┘
//! ```
//!
//! ## Generations
//!
//! Every attempt is stamped with a fresh [`ChannelId`]. Lifecycle events carry
//! the id of the channel that raised them, and anything from a superseded
//! channel is ignored. This is what stops a late close from an old socket
//! knocking a newer, already-live connection back to `Disconnected`.
//!
//! ## Teardown
//!
//! After [`ConnectionMachine::teardown`] every method is inert: no new attempts
//! start and no status changes are accepted.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use super::backoff::Backoff;

/// Connection lifecycle state. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No channel is open; a retry may be pending.
    Disconnected,
    /// An attempt is in flight.
    Connecting,
    /// The active channel is open.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
        }
    }
}

/// Published view of the connection: state plus the last transport error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Human-readable description of the last transport failure, cleared on
    /// every fresh attempt.
    pub last_error: Option<String>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self { state: ConnectionState::Disconnected, last_error: None }
    }
}

/// Generation token identifying one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// # Connection Machine
///
/// Tracks state, last error, the active generation, the backoff policy and
/// whether a retry timer should be pending.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    last_error: Option<String>,
    generation: u64,
    backoff: Backoff,
    retry_pending: bool,
    torn_down: bool,
}

impl ConnectionMachine {
    /// Creates an idle machine in `Disconnected`.
    pub fn new(backoff: Backoff) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            last_error: None,
            generation: 0,
            backoff,
            retry_pending: false,
            torn_down: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Last transport error, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// State and last error as one value.
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot { state: self.state, last_error: self.last_error.clone() }
    }

    /// Whether `id` is the current generation.
    pub fn is_current(&self, id: ChannelId) -> bool {
        !self.torn_down && id.0 == self.generation
    }

    /// Backoff policy.
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Whether a retry timer should currently be armed.
    pub fn retry_pending(&self) -> bool {
        self.retry_pending
    }

    /// Whether [`teardown`](Self::teardown) has run.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// # Begin Attempt
    ///
    /// Supersedes any previous channel, cancels a pending retry, clears the last
    /// error and enters `Connecting`. Returns the new generation, or `None` once
    /// torn down.
    pub fn begin_attempt(&mut self) -> Option<ChannelId> {
        if self.torn_down {
            return None;
        }
        self.generation += 1;
        self.retry_pending = false;
        self.last_error = None;
        self.state = ConnectionState::Connecting;
        Some(ChannelId(self.generation))
    }

    /// # Channel Opened
    ///
    /// Enters `Connected` and resets the backoff if `id` is current. Returns
    /// whether the event was accepted.
    pub fn channel_opened(&mut self, id: ChannelId) -> bool {
        if !self.is_current(id) || self.state != ConnectionState::Connecting {
            return false;
        }
        self.state = ConnectionState::Connected;
        self.backoff.reset();
        true
    }

    /// # Channel Closed
    ///
    /// Handles close or failure of channel `id`. A stale or post-teardown event
    /// is ignored and yields `None`. Otherwise the machine enters
    /// `Disconnected`, records `error` (a clean close passes `None`), arms the
    /// retry and returns the nominal delay to wait.
    pub fn channel_closed(&mut self, id: ChannelId, error: Option<String>) -> Option<Duration> {
        if !self.is_current(id) || self.state == ConnectionState::Disconnected {
            return None;
        }
        self.state = ConnectionState::Disconnected;
        if error.is_some() {
            self.last_error = error;
        }
        self.retry_pending = true;
        Some(self.backoff.current())
    }

    /// # Retry Elapsed
    ///
    /// Called when the retry timer fires: doubles the backoff for the next
    /// failure, then begins a new attempt.
    pub fn retry_elapsed(&mut self) -> Option<ChannelId> {
        if self.torn_down || !self.retry_pending {
            return None;
        }
        self.backoff.advance();
        self.begin_attempt()
    }

    /// # Reconnect Now
    ///
    /// Manual reconnect: drops any active channel and pending retry and starts
    /// immediately. The backoff delay is left as it is.
    pub fn reconnect_now(&mut self) -> Option<ChannelId> {
        self.begin_attempt()
    }

    /// # Teardown
    ///
    /// Permanently stops the machine. Invalidates the current generation so no
    /// in-flight result can land, and leaves the state `Disconnected`.
    pub fn teardown(&mut self) {
        self.torn_down = true;
        self.retry_pending = false;
        self.generation += 1;
        self.state = ConnectionState::Disconnected;
    }
}
