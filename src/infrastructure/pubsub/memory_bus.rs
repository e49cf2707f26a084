//! In-memory pub/sub for single-node deployments and tests.
//!
//! Several hubs sharing one `MemoryBus` behave like several server
//! instances sharing one Redis.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{BusError, BusStream, MessageBus};

#[derive(Debug)]
pub struct MemoryBus {
    /// Topic -> broadcast sender.
    topics: Mutex<HashMap<String, broadcast::Sender<String>>>,
    /// Buffer size for each topic's channel.
    capacity: usize,
}

impl MemoryBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Number of live subscriptions on a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .get(topic)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError> {
        let mut topics = self.topics.lock();
        if let Some(tx) = topics.get(topic) {
            // Err means every receiver is gone; forget the topic.
            if tx.send(payload).is_err() {
                topics.remove(topic);
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BusStream, BusError> {
        let rx = {
            let mut topics = self.topics.lock();
            topics
                .entry(topic.to_string())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };

        let topic = topic.to_string();
        let stream = futures::stream::unfold(rx, move |mut rx| {
            let topic = topic.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(payload) => return Some((payload, rx)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(topic = %topic, skipped, "Bus subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}
