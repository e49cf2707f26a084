//! Room subscriptions under bad payloads and bus failures.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use crate::common::{eventually, memory_bus, room, topic, user, Instance, WAIT};
use chat_fanout::domain::{Envelope, RoomId};
use chat_fanout::infrastructure::pubsub::{BusBridge, BusError, BusStream, MessageBus};
use chat_fanout::presentation::websocket::{Connection, DisconnectReason, Hub, HubError};

#[tokio::test]
async fn test_malformed_bus_payload_does_not_kill_subscription() {
    let bus = memory_bus();
    let instance = Instance::on(bus.clone());
    let r1 = room();

    let author = instance.attach(r1, 8).await;
    let mut member = instance.attach(r1, 8).await;
    let generation = instance.hub.subscription_id(r1);

    bus.publish(&topic(r1), "{not json".into()).await.unwrap();
    bus.publish(&topic(r1), r#"{"type":"message"}"#.into()).await.unwrap();
    // Well-formed but addressed to another room.
    let stray = Envelope::message(room(), author.user_id, "stray");
    bus.publish(&topic(r1), stray.to_json().unwrap()).await.unwrap();

    instance.chat.send(author.user_id, r1, "valid".into()).await.unwrap();

    assert_eq!(member.next().await.content(), "valid");
    member.assert_quiet().await;
    assert_eq!(instance.hub.subscription_id(r1), generation);
}

/// A bus whose subscriptions are scripted by the test: each `subscribe`
/// takes the next prepared stream, or fails when none are left.
#[derive(Default)]
struct ScriptedBus {
    streams: Mutex<VecDeque<BusStream>>,
}

impl ScriptedBus {
    /// Queue one subscription; the returned sender feeds it and ends it on drop.
    fn prepare(&self) -> mpsc::UnboundedSender<String> {
        let (tx, rx) = mpsc::unbounded();
        self.streams.lock().push_back(rx.boxed());
        tx
    }
}

#[async_trait]
impl MessageBus for ScriptedBus {
    async fn publish(&self, _topic: &str, _payload: String) -> Result<(), BusError> {
        Ok(())
    }

    async fn subscribe(&self, _topic: &str) -> Result<BusStream, BusError> {
        self.streams.lock().pop_front().ok_or_else(|| {
            BusError::Redis(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into())
        })
    }
}

fn payload(room: RoomId, content: &str) -> String {
    Envelope::message(room, user(), content)
        .to_json()
        .unwrap()
}

#[tokio::test]
async fn test_join_fails_when_bus_refuses_subscription() {
    let bus = Arc::new(ScriptedBus::default());
    let instance = Instance::on(bus);
    let (connection, mut outbound) = Connection::new(user(), 8);
    let id = connection.id();
    instance.hub.register(connection).await.unwrap();

    let result = instance.hub.join(id, room()).await;

    assert!(matches!(result, Err(HubError::Subscribe(BusError::Redis(_)))));
    assert!(!instance.hub.is_registered(id));
    assert_eq!(instance.hub.room_count(), 0);
    assert!(outbound.recv().await.is_none());
}

#[tokio::test]
async fn test_ended_subscription_is_reopened_once() {
    let bus = Arc::new(ScriptedBus::default());
    let first = bus.prepare();
    let second = bus.prepare();
    let instance = Instance::on(bus.clone());
    let r1 = room();

    let mut member = instance.attach(r1, 8).await;
    let generation = instance.hub.subscription_id(r1).unwrap();

    first.unbounded_send(payload(r1, "before")).unwrap();
    assert_eq!(member.next().await.content(), "before");

    drop(first);

    let hub = instance.hub.clone();
    assert!(eventually(|| hub.subscription_id(r1).is_some_and(|g| g != generation)).await);
    assert!(instance.hub.is_registered(member.id));

    second.unbounded_send(payload(r1, "after")).unwrap();
    assert_eq!(member.next().await.content(), "after");
}

#[tokio::test]
async fn test_members_are_evicted_when_bus_is_lost() {
    let bus = Arc::new(ScriptedBus::default());
    let only = bus.prepare();
    let instance = Instance::on(bus.clone());
    let r1 = room();

    let mut a = instance.attach(r1, 8).await;
    let mut b = instance.attach(r1, 8).await;

    drop(only);

    a.closed().await;
    b.closed().await;
    assert_eq!(instance.hub.connection_count(), 0);
    assert!(!instance.hub.is_subscribed(r1));
}

/// A bus that accepts subscribe requests and never answers them.
struct SilentBus;

#[async_trait]
impl MessageBus for SilentBus {
    async fn publish(&self, _topic: &str, _payload: String) -> Result<(), BusError> {
        Ok(())
    }

    async fn subscribe(&self, _topic: &str) -> Result<BusStream, BusError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_unanswered_subscribe_does_not_stall_the_hub() {
    let timeout = Duration::from_millis(200);
    let hub = Hub::new(
        BusBridge::with_default_prefix(Arc::new(SilentBus)).with_subscribe_timeout(timeout),
    );

    let (stuck, mut stuck_outbound) = Connection::new(user(), 8);
    let (bystander, _bystander_outbound) = Connection::new(user(), 8);
    let (stuck_id, bystander_id) = (stuck.id(), bystander.id());
    hub.register(stuck).await.unwrap();
    hub.register(bystander).await.unwrap();

    let joining = tokio::spawn({
        let hub = hub.clone();
        async move { hub.join(stuck_id, room()).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let unregistered =
        tokio::time::timeout(WAIT, hub.unregister(bystander_id, DisconnectReason::Closed)).await;
    assert!(matches!(unregistered, Ok(Ok(()))));

    let joined = joining.await.unwrap();
    assert!(matches!(
        joined,
        Err(HubError::Subscribe(BusError::Timeout(d))) if d == timeout
    ));
    assert!(!hub.is_registered(stuck_id));
    assert_eq!(hub.room_count(), 0);
    assert!(stuck_outbound.recv().await.is_none());

    assert!(tokio::time::timeout(WAIT, hub.shutdown()).await.is_ok());
    assert!(hub.is_closed());
}
