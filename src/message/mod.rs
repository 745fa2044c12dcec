//! Message payload representation.
//!
//! # Data Flow
//! ```text
//! Wire frame (text / binary)
//!     → Payload::Text | Payload::Binary
//!     → request pipe chain (may lift to Payload::Json)
//!     → handler
//!
//! Handler output (any variant)
//!     → response pipe chain (usually lowers to Payload::Text)
//!     → wire frame
//! ```
//!
//! # Design Decisions
//! - One enum for every stage of the pipe chain; pipes decide the shape
//! - Json serializes to a text frame at the socket if no pipe lowered it

use serde_json::Value;

/// A message payload at some point of a pipe chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Binary(Vec<u8>),
    Text(String),
    Json(Value),
}

impl Payload {
    /// Text content, if this payload is a text frame.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Parsed JSON content, if a pipe already lifted this payload.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Short variant name for log fields.
    pub fn variant(&self) -> &'static str {
        match self {
            Payload::Binary(_) => "binary",
            Payload::Text(_) => "text",
            Payload::Json(_) => "json",
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Payload::Binary(data)
    }
}
