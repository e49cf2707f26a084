//! Persisted chat message and the repository trait for storing it.
//!
//! Maps to the `messenger.messages` table:
//! - id: BIGSERIAL PRIMARY KEY
//! - chat_id: UUID NOT NULL
//! - sender_id: UUID NOT NULL
//! - content: TEXT NOT NULL
//! - created_at: TIMESTAMPTZ NOT NULL DEFAULT NOW()

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{RoomId, UserId};
use crate::shared::error::AppError;

/// A message about to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub chat_id: RoomId,
    pub sender_id: UserId,
    pub content: String,
}

/// Values the store assigned on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: i64,
    pub created_at: DateTime<Utc>,
}

/// Repository trait for message persistence.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Insert a message, returning its durable id and timestamp.
    async fn create(&self, message: &NewMessage) -> Result<StoredMessage, AppError>;
}
