//! Redis pub/sub bus.
//!
//! Publishing goes through a shared `ConnectionManager`. Every subscription
//! gets its own pub/sub connection, which is closed when the returned stream
//! is dropped.

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{info, instrument, warn};

use super::{BusError, BusStream, MessageBus};
use crate::config::RedisSettings;

#[derive(Clone)]
pub struct RedisBus {
    client: Client,
    publisher: ConnectionManager,
}

impl RedisBus {
    /// Open the client and the shared publishing connection.
    #[instrument(skip(settings), fields(url = %settings.url))]
    pub async fn connect(settings: &RedisSettings) -> Result<Self, redis::RedisError> {
        let client = Client::open(settings.url.as_str())?;
        let publisher = ConnectionManager::new(client.clone()).await?;
        info!("Redis bus connected");
        Ok(Self { client, publisher })
    }

    /// Handle to the publishing connection, for health checks.
    pub fn connection(&self) -> ConnectionManager {
        self.publisher.clone()
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError> {
        let mut conn = self.publisher.clone();
        let receivers: i64 = conn.publish(topic, payload).await?;
        tracing::trace!(topic = %topic, receivers, "Published to Redis");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BusStream, BusError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(topic).await?;

        let topic = topic.to_string();
        let stream = pubsub.into_on_message().filter_map(move |msg| {
            let topic = topic.clone();
            async move {
                match msg.get_payload::<String>() {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        warn!(topic = %topic, error = %e, "Dropping non-UTF-8 bus payload");
                        None
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}
