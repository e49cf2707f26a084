//! Pub/Sub Module
//!
//! Distributed publish/subscribe used to replicate room traffic across
//! server instances.
//!
//! # Architecture
//!
//! ```text
//! +-------------------+
//! |   BusBridge       |  <-- room id -> topic, envelope <-> JSON
//! +-------------------+
//!          |
//!          v
//! +-------------------+
//! |  MessageBus trait |  <-- Abstract interface
//! +-------------------+
//!      |         |
//!      v         v
//! +---------+ +-----------+
//! |RedisBus | | MemoryBus |
//! +---------+ +-----------+
//! ```
//!
//! Delivery is best-effort and at-most-once: a failed publish is reported to
//! the caller and never retried here.

mod bridge;
mod memory_bus;
mod redis_bus;

pub use bridge::BusBridge;
pub use memory_bus::MemoryBus;
pub use redis_bus::RedisBus;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

/// Stream of raw payloads delivered to one subscription. Dropping it
/// releases the subscription.
pub type BusStream = BoxStream<'static, String>;

/// Bus failures. All of them are bus-fatal for the affected message only.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("bus did not answer within {0:?}")]
    Timeout(Duration),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Publish/subscribe channel keyed by topic.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a payload to every current subscriber of `topic`.
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError>;

    /// Open a subscription to `topic`.
    async fn subscribe(&self, topic: &str) -> Result<BusStream, BusError>;
}

/// Topic naming.
pub mod topics {
    use std::fmt::Display;

    /// Default prefix for chat room topics (e.g., "messages:chat_id")
    pub const ROOM_PREFIX: &str = "messages:";

    /// Topic carrying a room's traffic
    #[inline]
    pub fn room(prefix: &str, room_id: impl Display) -> String {
        format!("{}{}", prefix, room_id)
    }
}
