//! Message envelope.
//!
//! The envelope is the unit exchanged between connections, the hub and the
//! bus. Its JSON form is both the outbound WebSocket frame and the bus
//! payload:
//!
//! ```json
//! {"type":"message","id":42,"chat_id":"…","sender_id":"…","content":"hi","created_at":"2024-05-01T10:00:00Z"}
//! ```
//!
//! Envelopes are immutable once built; `with_sequence` returns a new value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{RoomId, UserId};

/// Envelope kind, carried as the `type` field on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    /// Chat content authored by a user
    Message,
    /// Liveness or control traffic; never fanned out to rooms
    Control,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    kind: EnvelopeKind,

    /// Durable sequence id assigned by the persistence collaborator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i64>,

    chat_id: RoomId,
    sender_id: UserId,
    content: String,
    created_at: DateTime<Utc>,
}

impl Envelope {
    /// Build a content envelope stamped with the current time.
    pub fn message(chat_id: RoomId, sender_id: UserId, content: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeKind::Message,
            id: None,
            chat_id,
            sender_id,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Copy of this envelope carrying a durable id and the store's timestamp.
    pub fn with_sequence(&self, id: i64, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Some(id),
            created_at,
            ..self.clone()
        }
    }

    pub fn kind(&self) -> EnvelopeKind {
        self.kind
    }

    pub fn is_content(&self) -> bool {
        self.kind == EnvelopeKind::Message
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn chat_id(&self) -> RoomId {
        self.chat_id
    }

    pub fn sender_id(&self) -> UserId {
        self.sender_id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Serialize to the wire/bus JSON form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse the wire/bus JSON form.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}
