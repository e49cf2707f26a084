//! Chat Service
//!
//! Authoring path for chat content: persist when a store is configured, then
//! publish on the bus. Publishing is the only way content reaches room
//! members, including members on the author's own instance; local delivery
//! happens exclusively through the room's bus subscription.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{Envelope, MessageRepository, NewMessage, RoomId, UserId};
use crate::infrastructure::pubsub::{BusBridge, BusError};

/// Chat service trait
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Author a message in a room. Returns the envelope that was published.
    async fn send(
        &self,
        sender_id: UserId,
        chat_id: RoomId,
        content: String,
    ) -> Result<Envelope, ChatError>;
}

/// Chat service errors
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Publish failed: {0}")]
    Publish(#[from] BusError),
}

/// ChatService implementation
pub struct ChatServiceImpl {
    bridge: BusBridge,
    store: Option<Arc<dyn MessageRepository>>,
}

impl ChatServiceImpl {
    pub fn new(bridge: BusBridge, store: Option<Arc<dyn MessageRepository>>) -> Self {
        Self { bridge, store }
    }

    /// Assign a durable id when a store is configured. A store failure only
    /// costs the id; the message is still fanned out.
    async fn persist(&self, envelope: Envelope) -> Envelope {
        let Some(store) = &self.store else {
            return envelope;
        };

        let new_message = NewMessage {
            chat_id: envelope.chat_id(),
            sender_id: envelope.sender_id(),
            content: envelope.content().to_string(),
        };

        match store.create(&new_message).await {
            Ok(stored) => envelope.with_sequence(stored.id, stored.created_at),
            Err(e) => {
                tracing::warn!(
                    chat_id = %envelope.chat_id(),
                    sender_id = %envelope.sender_id(),
                    error = %e,
                    "Failed to persist message, publishing without id"
                );
                envelope
            }
        }
    }
}

#[async_trait]
impl ChatService for ChatServiceImpl {
    async fn send(
        &self,
        sender_id: UserId,
        chat_id: RoomId,
        content: String,
    ) -> Result<Envelope, ChatError> {
        let envelope = self
            .persist(Envelope::message(chat_id, sender_id, content))
            .await;

        if let Err(e) = self.bridge.publish(&envelope).await {
            tracing::warn!(
                chat_id = %chat_id,
                sender_id = %sender_id,
                error = %e,
                "Bus publish failed, message dropped"
            );
            return Err(e.into());
        }

        tracing::debug!(chat_id = %chat_id, sender_id = %sender_id, id = ?envelope.id(), "Message published");
        Ok(envelope)
    }
}
