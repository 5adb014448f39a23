//! # Transport Seam
//!
//! The connection manager is protocol-agnostic: it only needs something that,
//! given an address, opens a channel and hands back a stream of text frames.
//! Concrete transports live in `crate::ingestors`.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

/// Inbound frames from an open channel. The stream ending means the channel
/// closed cleanly; an `Err` item means it failed.
pub type FrameStream = BoxStream<'static, Result<RawFrame, TransportError>>;

/// One undecoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFrame {
    /// Text frame; already valid UTF-8.
    Text(String),
    /// Binary frame; must decode as UTF-8 before it is parsed.
    Binary(Vec<u8>),
}

impl From<String> for RawFrame {
    fn from(text: String) -> Self {
        RawFrame::Text(text)
    }
}

impl From<&str> for RawFrame {
    fn from(text: &str) -> Self {
        RawFrame::Text(text.to_string())
    }
}

/// Channel-level failures. The `Display` text becomes the manager's
/// `last_error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The target address could not be used.
    #[error("invalid feed url '{url}': {reason}")]
    InvalidUrl {
        /// Address as configured.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The channel could not be opened.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The open channel failed while reading.
    #[error("connection error: {0}")]
    Stream(String),
}

/// Opens channels to an event source.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens a new channel to `url`. Resolving `Ok` is the "open" signal.
    async fn connect(&self, url: &str) -> Result<FrameStream, TransportError>;
}
