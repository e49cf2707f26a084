//! Room-keyed view of the bus.

use std::sync::Arc;
use std::time::Duration;

use super::{topics, BusError, BusStream, MessageBus};
use crate::domain::{Envelope, RoomId};
use crate::infrastructure::metrics;

/// Deadline for the bus to confirm a new subscription.
pub const DEFAULT_SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Maps rooms to topics and envelopes to bus payloads.
#[derive(Clone)]
pub struct BusBridge {
    bus: Arc<dyn MessageBus>,
    prefix: Arc<str>,
    subscribe_timeout: Duration,
}

impl BusBridge {
    pub fn new(bus: Arc<dyn MessageBus>, prefix: impl Into<Arc<str>>) -> Self {
        Self {
            bus,
            prefix: prefix.into(),
            subscribe_timeout: DEFAULT_SUBSCRIBE_TIMEOUT,
        }
    }

    pub fn with_subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }

    /// Bridge using the default `messages:` prefix.
    pub fn with_default_prefix(bus: Arc<dyn MessageBus>) -> Self {
        Self::new(bus, topics::ROOM_PREFIX)
    }

    pub fn topic(&self, room: RoomId) -> String {
        topics::room(&self.prefix, room)
    }

    /// Publish an envelope on its room's topic.
    pub async fn publish(&self, envelope: &Envelope) -> Result<(), BusError> {
        let topic = self.topic(envelope.chat_id());
        let payload = envelope.to_json()?;
        let result = self.bus.publish(&topic, payload).await;
        metrics::record_publish(result.is_ok());
        result
    }

    /// Subscribe to a room's topic. A bus that does not answer within the
    /// subscribe timeout fails with `BusError::Timeout`.
    pub async fn subscribe(&self, room: RoomId) -> Result<BusStream, BusError> {
        let topic = self.topic(room);
        tokio::time::timeout(self.subscribe_timeout, self.bus.subscribe(&topic))
            .await
            .map_err(|_| BusError::Timeout(self.subscribe_timeout))?
    }
}
