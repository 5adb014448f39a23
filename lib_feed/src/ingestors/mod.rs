//! # Feed Ingestors Module
//!
//! Concrete transports for the connection manager. Each submodule implements
//! [`Connector`](crate::core::transport::Connector) for one protocol and turns
//! that protocol's messages into plain text frames.
//!
//! ## Contained Modules:
//! - **`feed_wss`**: WebSocket transport over `tokio-tungstenite`.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// WebSocket transport.
pub mod feed_wss;

pub use feed_wss::WsConnector;
