//! WebSocket Message Types
//!
//! Client-to-server frames. Server-to-client frames are serialized
//! `Envelope`s, identical to what travels on the bus.

use serde::Deserialize;

use crate::domain::RoomId;

/// The only inbound frame type that carries content.
pub const MESSAGE_TYPE: &str = "message";

/// Chat content authored by the client (`type: "message"`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatMessage {
    pub chat_id: RoomId,
    pub content: String,
}

/// A decoded inbound text frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Message(ChatMessage),
    /// Any other `type`, reserved for future use
    Ignored(String),
}

impl Inbound {
    /// Decode a text frame.
    ///
    /// Errors are frame-level: the caller discards the frame and keeps the
    /// connection.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(text)?;

        let kind = value
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        if kind == MESSAGE_TYPE {
            Ok(Inbound::Message(serde_json::from_value(value)?))
        } else {
            Ok(Inbound::Ignored(kind))
        }
    }
}
