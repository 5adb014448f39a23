//! # Feed Event Model
//!
//! Defines the unit of data that flows from the connection manager into the
//! event store, together with the validation that turns a raw text frame into
//! a well-formed [`FeedEvent`].
//!
//! ## Wire Format
//!
//! A frame is a JSON object:
//!
//! ```text
//! { "id": "news-1700000000000-k3j2h1", "feed": "news", "ts": 1700000000000,
//!   "title": "Market Opens Strong", "body": "optional text" }
//! ```
//!
//! The producer may also wrap events in an envelope carrying a `type` field
//! (`{"type":"event","data":{..}}`, `{"type":"ping"}`, `{"type":"error",..}`).
//! [`Frame::parse`] recognises both shapes.
//!
//! An event without a usable `id` is rejected rather than given a synthetic
//! identity, since `id` is the deduplication key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// # Category
///
/// The closed set of feed classifications. `All` is a virtual aggregate used
/// for filtering and counting; it is never assigned to a real event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Aggregate of every real category.
    All,
    /// News feed.
    News,
    /// Market activity feed.
    Market,
    /// Price movement feed.
    Price,
}

impl Category {
    /// Every category, virtual `All` first.
    pub const ALL_CATEGORIES: [Category; 4] =
        [Category::All, Category::News, Category::Market, Category::Price];

    /// The categories a real event can carry.
    pub const REAL: [Category; 3] = [Category::News, Category::Market, Category::Price];

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::All => "all",
            Category::News => "news",
            Category::Market => "market",
            Category::Price => "price",
        }
    }

    /// Human label used by the dashboard tabs.
    pub fn label(&self) -> &'static str {
        match self {
            Category::All => "All",
            Category::News => "News Feed",
            Category::Market => "Market Activity Feed",
            Category::Price => "Price Movement",
        }
    }

    /// Returns `true` for the virtual aggregate.
    pub fn is_virtual(&self) -> bool {
        matches!(self, Category::All)
    }

    /// Whether an event of category `other` belongs to this filter.
    pub fn matches(&self, other: Category) -> bool {
        self.is_virtual() || *self == other
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Category::All),
            "news" => Ok(Category::News),
            "market" => Ok(Category::Market),
            "price" => Ok(Category::Price),
            other => Err(FrameError::InvalidField {
                field: "feed",
                reason: format!("unknown category '{}'", other),
            }),
        }
    }
}

/// Reasons a frame never reaches the ingestion callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// A binary frame is not valid UTF-8.
    #[error("frame is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    /// The frame is not valid JSON.
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(String),

    /// The frame is valid JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// A required field is absent or null.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// A field is present but has the wrong type or value.
    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        /// Wire name of the field.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// An envelope with a `type` this client does not understand.
    #[error("unknown envelope type '{0}'")]
    UnknownEnvelope(String),
}

/// # Feed Event
///
/// An immutable, validated event. Fields are private; construct through
/// [`FeedEvent::new`] or [`FeedEvent::from_value`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedEvent {
    id: String,
    #[serde(rename = "feed")]
    category: Category,
    #[serde(rename = "ts")]
    timestamp: i64,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
}

impl FeedEvent {
    /// Builds an event, applying the same rules as frame validation.
    pub fn new(
        id: impl Into<String>,
        category: Category,
        timestamp: i64,
        title: impl Into<String>,
        body: Option<String>,
    ) -> Result<Self, FrameError> {
        let id = id.into();
        let title = title.into();

        if id.is_empty() {
            return Err(FrameError::InvalidField { field: "id", reason: "must not be empty".into() });
        }
        if category.is_virtual() {
            return Err(FrameError::InvalidField {
                field: "feed",
                reason: "'all' is not a real category".into(),
            });
        }
        if title.is_empty() {
            return Err(FrameError::InvalidField { field: "title", reason: "must not be empty".into() });
        }

        Ok(Self { id, category, timestamp, title, body })
    }

    /// Validates a decoded JSON value as a bare event object.
    pub fn from_value(value: &Value) -> Result<Self, FrameError> {
        let obj = value.as_object().ok_or(FrameError::NotAnObject)?;

        let id = required_str(obj, "id")?;
        let category: Category = required_str(obj, "feed")?.parse()?;
        let timestamp = match obj.get("ts") {
            None | Some(Value::Null) => return Err(FrameError::MissingField("ts")),
            Some(ts) => ts.as_i64().ok_or_else(|| FrameError::InvalidField {
                field: "ts",
                reason: format!("expected integer milliseconds, got {}", ts),
            })?,
        };
        let title = required_str(obj, "title")?;
        let body = match obj.get("body") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(FrameError::InvalidField {
                    field: "body",
                    reason: format!("expected string, got {}", other),
                })
            }
        };

        Self::new(id, category, timestamp, title, body)
    }

    /// Identity key.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Real category of this event.
    pub fn category(&self) -> Category {
        self.category
    }

    /// Producer timestamp, milliseconds since epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Display title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Optional display body.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Case-insensitive substring match on title, then body.
    ///
    /// `needle_lower` must already be lowercased; an empty needle matches.
    pub fn matches_search(&self, needle_lower: &str) -> bool {
        if needle_lower.is_empty() {
            return true;
        }
        if self.title.to_lowercase().contains(needle_lower) {
            return true;
        }
        self.body
            .as_deref()
            .is_some_and(|body| body.to_lowercase().contains(needle_lower))
    }
}

fn required_str(obj: &Map<String, Value>, field: &'static str) -> Result<String, FrameError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(FrameError::MissingField(field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(FrameError::InvalidField {
            field,
            reason: format!("expected string, got {}", other),
        }),
    }
}

/// # Decoded Frame
///
/// The outcome of parsing one inbound text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A well-formed event ready for ingestion.
    Event(FeedEvent),
    /// A keep-alive from the producer.
    Heartbeat,
    /// The producer reported an error in-band.
    RemoteError(String),
}

impl Frame {
    /// Parses a binary frame, rejecting payloads that are not valid UTF-8.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Frame, FrameError> {
        let text =
            std::str::from_utf8(bytes).map_err(|e| FrameError::InvalidUtf8(e.to_string()))?;
        Frame::parse(text)
    }

    /// Parses a raw text frame.
    ///
    /// Objects with a string `type` field are treated as envelopes; any other
    /// object is validated as a bare event.
    pub fn parse(text: &str) -> Result<Frame, FrameError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;

        let obj = value.as_object().ok_or(FrameError::NotAnObject)?;

        match obj.get("type").and_then(Value::as_str) {
            None => FeedEvent::from_value(&value).map(Frame::Event),
            Some("event") => {
                let data = obj.get("data").ok_or(FrameError::MissingField("data"))?;
                FeedEvent::from_value(data).map(Frame::Event)
            }
            Some("ping") => Ok(Frame::Heartbeat),
            Some("error") => {
                let message = obj
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("unspecified remote error")
                    .to_string();
                Ok(Frame::RemoteError(message))
            }
            Some(other) => Err(FrameError::UnknownEnvelope(other.to_string())),
        }
    }
}
