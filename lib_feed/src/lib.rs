//! # lib_feed
//!
//! Client-side core of the live feed dashboard: a resilient connection manager
//! that keeps a stream of category-tagged events flowing, and a bounded event
//! store that the presentation layer queries.
//!
//! Modules are gated by folder-level features (`core`, `ingestors`); `full` is
//! on by default.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Event model, event store and connection manager.
#[cfg(feature = "core")]
pub mod core;

/// Concrete transports for the connection manager.
#[cfg(feature = "ingestors")]
pub mod ingestors;

#[cfg(feature = "core")]
pub use crate::core::*;
