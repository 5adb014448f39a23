//! # Feed WSS Ingestor
//!
//! WebSocket [`Connector`] for the live feed. Opening a channel performs the
//! handshake; the returned stream yields text and binary frames untouched and
//! leaves UTF-8 validation of binary payloads to the frame parser. Control
//! frames are handled by tungstenite and never surface.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::future;
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;
use url::Url;

use crate::core::transport::{Connector, FrameStream, RawFrame, TransportError};

/// Default handshake deadline.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket transport for `ws://` and `wss://` addresses.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self { connect_timeout: DEFAULT_CONNECT_TIMEOUT }
    }
}

impl WsConnector {
    /// Connector with the default handshake deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the handshake deadline.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn check_url(url: &str) -> Result<(), TransportError> {
        let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        match parsed.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(TransportError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", other),
            }),
        }
    }
}

/// Maps one WebSocket read to an optional data frame.
fn to_frame(message: Result<Message, WsError>) -> Option<Result<RawFrame, TransportError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(RawFrame::Text(text.as_str().to_owned()))),
        Ok(Message::Binary(bytes)) => Some(Ok(RawFrame::Binary(bytes.to_vec()))),
        Ok(Message::Close(frame)) => {
            if let Some(frame) = frame {
                log::debug!("Server closed the feed: {} {}", frame.code, frame.reason.as_str());
            }
            None
        }
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => None,
        Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => None,
        Err(e) => Some(Err(TransportError::Stream(e.to_string()))),
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<FrameStream, TransportError> {
        Self::check_url(url)?;

        let (ws_stream, response) = match tokio::time::timeout(self.connect_timeout, connect_async(url)).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return Err(TransportError::Connect(e.to_string())),
            Err(_) => {
                return Err(TransportError::Connect(format!(
                    "handshake timed out after {}ms",
                    self.connect_timeout.as_millis()
                )))
            }
        };
        log::debug!("WebSocket handshake with {} completed ({})", url, response.status());

        let frames = ws_stream.filter_map(|message| future::ready(to_frame(message)));
        Ok(frames.boxed())
    }
}
