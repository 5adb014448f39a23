//! # Core Feed Module
//!
//! Everything the dashboard needs to turn an unreliable stream of text frames
//! into a clean, bounded, queryable set of events.
//!
//! ## Core Components:
//!
//! - **`event`**: The `FeedEvent` record, its `Category`, and `Frame` parsing
//!   with validation of every required field.
//!
//! - **`event_store`**: The bounded, newest-first, deduplicated `EventStore`
//!   with its filtered view and per-category counts.
//!
//! - **`backoff`**: Exponential reconnection delay with a ceiling and optional
//!   jitter.
//!
//! - **`connection`**: The synchronous `ConnectionMachine`: lifecycle state,
//!   last error and generation tracking for stale-channel rejection.
//!
//! - **`transport`**: The `Connector` seam that concrete transports implement.
//!
//! - **`connection_manager`**: The async driver that owns a connection, retries
//!   it and forwards valid events to an `EventSink`.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Exponential reconnection backoff.
pub mod backoff;
/// Connection lifecycle state machine.
pub mod connection;
/// Async connection driver and its consumer handle.
pub mod connection_manager;
/// Event model and frame parsing.
pub mod event;
/// Bounded, deduplicated event buffer.
pub mod event_store;
/// Transport abstraction.
pub mod transport;

pub use backoff::{Backoff, MAX_JITTER_RATIO};
pub use connection::{ChannelId, ConnectionMachine, ConnectionState, StatusSnapshot};
pub use connection_manager::{
    ConfigError, ConnectionConfig, ConnectionHandle, ConnectionManager, EventSink, IngestStats,
};
pub use event::{Category, FeedEvent, Frame, FrameError};
pub use event_store::{CategoryCounts, EventStore, InsertOutcome};
pub use transport::{Connector, FrameStream, RawFrame, TransportError};
