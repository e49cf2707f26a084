//! Cross-instance delivery and backpressure.

use pretty_assertions::assert_eq;
use tokio_test::assert_ok;

use crate::common::{eventually, memory_bus, room, Instance};

#[tokio::test]
async fn test_message_reaches_member_on_other_instance_exactly_once() {
    let bus = memory_bus();
    let first = Instance::on(bus.clone());
    let second = Instance::on(bus.clone());
    let r1 = room();

    let mut a = first.attach(r1, 8).await;
    let mut b = second.attach(r1, 8).await;

    assert_ok!(first.chat.send(a.user_id, r1, "hello".into()).await);

    let received = b.next().await;
    assert_eq!(received.content(), "hello");
    assert_eq!(received.sender_id(), a.user_id);
    assert_eq!(received.chat_id(), r1);
    b.assert_quiet().await;

    // The author's own instance delivers through its subscription too, once.
    assert_eq!(a.next().await.content(), "hello");
    a.assert_quiet().await;
}

#[tokio::test]
async fn test_members_of_other_rooms_receive_nothing() {
    let bus = memory_bus();
    let instance = Instance::on(bus);
    let (r1, r2) = (room(), room());

    let sender = instance.attach(r1, 8).await;
    let mut outsider = instance.attach(r2, 8).await;

    instance.chat.send(sender.user_id, r1, "only r1".into()).await.unwrap();

    outsider.assert_quiet().await;
}

#[tokio::test]
async fn test_full_queue_evicts_only_the_slow_member() {
    let bus = memory_bus();
    let instance = Instance::on(bus);
    let r1 = room();

    let author = instance.attach(r1, 8).await;
    let mut slow = instance.attach(r1, 1).await;
    let mut fast = instance.attach(r1, 8).await;

    for n in 0..3 {
        instance
            .chat
            .send(author.user_id, r1, format!("m{n}"))
            .await
            .unwrap();
    }

    for n in 0..3 {
        assert_eq!(fast.next().await.content(), format!("m{n}"));
    }

    let hub = instance.hub.clone();
    let slow_id = slow.id;
    assert!(eventually(|| !hub.is_registered(slow_id)).await);
    assert!(!instance.hub.members(r1).contains(&slow.id));
    assert!(instance.hub.is_registered(fast.id));

    // Its queue is closed, which is what makes the writer hang up.
    slow.closed().await;

    instance
        .chat
        .send(author.user_id, r1, "after".into())
        .await
        .unwrap();
    assert_eq!(fast.next().await.content(), "after");
}

#[tokio::test]
async fn test_dropped_writer_is_treated_as_gone() {
    let bus = memory_bus();
    let instance = Instance::on(bus);
    let r1 = room();

    let author = instance.attach(r1, 8).await;
    let gone = instance.attach(r1, 8).await;
    let gone_id = gone.id;
    drop(gone);

    instance.chat.send(author.user_id, r1, "x".into()).await.unwrap();

    let hub = instance.hub.clone();
    assert!(eventually(|| !hub.is_registered(gone_id)).await);
    assert_eq!(instance.hub.members(r1).len(), 1);
}
