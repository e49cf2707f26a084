//! Stored message ids travel with the delivered frame.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fake::faker::lorem::en::Sentence;
use fake::Fake;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use crate::common::{memory_bus, room, Instance};
use chat_fanout::domain::{MessageRepository, NewMessage, StoredMessage};
use chat_fanout::shared::error::AppError;

/// Hands out increasing ids and remembers what it stored.
struct CountingStore {
    next_id: AtomicI64,
    stamp: DateTime<Utc>,
    stored: Mutex<Vec<NewMessage>>,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            next_id: AtomicI64::new(100),
            stamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            stored: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MessageRepository for CountingStore {
    async fn create(&self, message: &NewMessage) -> Result<StoredMessage, AppError> {
        self.stored.lock().push(message.clone());
        Ok(StoredMessage {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            created_at: self.stamp,
        })
    }
}

struct DownStore;

#[async_trait]
impl MessageRepository for DownStore {
    async fn create(&self, _message: &NewMessage) -> Result<StoredMessage, AppError> {
        Err(AppError::Internal("connection refused".into()))
    }
}

#[tokio::test]
async fn test_stored_id_reaches_every_instance() {
    let bus = memory_bus();
    let store = Arc::new(CountingStore::new());
    let author_side = Instance::with_store(bus.clone(), Some(store.clone() as Arc<dyn MessageRepository>));
    let other_side = Instance::on(bus.clone());
    let r1 = room();

    let author = author_side.attach(r1, 8).await;
    let mut reader = other_side.attach(r1, 8).await;

    let content: String = Sentence(2..6).fake();
    author_side
        .chat
        .send(author.user_id, r1, content.clone())
        .await
        .unwrap();

    let received = reader.next().await;
    assert_eq!(received.id(), Some(100));
    assert_eq!(received.created_at(), store.stamp);
    assert_eq!(received.content(), content);

    let stored = store.stored.lock().clone();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].chat_id, r1);
    assert_eq!(stored[0].sender_id, author.user_id);
}

#[tokio::test]
async fn test_store_outage_still_delivers_without_id() {
    let bus = memory_bus();
    let instance = Instance::with_store(bus, Some(Arc::new(DownStore) as Arc<dyn MessageRepository>));
    let r1 = room();

    let author = instance.attach(r1, 8).await;
    let mut reader = instance.attach(r1, 8).await;

    instance.chat.send(author.user_id, r1, "hi".into()).await.unwrap();

    let received = reader.next().await;
    assert_eq!(received.id(), None);
    assert_eq!(received.content(), "hi");
}
