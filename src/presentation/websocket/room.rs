//! Rooms and their bus subscriptions.
//!
//! A room exists exactly while it has local members, and owns exactly one
//! bus subscription for that whole time. Members are held by id only; the
//! hub owns the connections.

use std::collections::HashSet;

use futures::StreamExt;
use tokio::task::JoinHandle;

use super::hub::Hub;
use crate::domain::{ConnectionId, Envelope, RoomId};
use crate::infrastructure::metrics;
use crate::infrastructure::pubsub::BusStream;

/// A named set of locally attached connections.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    members: HashSet<ConnectionId>,
    subscription: RoomSubscription,
}

impl Room {
    /// Rooms are born with their first member and their subscription.
    pub(super) fn new(id: RoomId, first: ConnectionId, subscription: RoomSubscription) -> Self {
        let mut members = HashSet::new();
        members.insert(first);
        Self {
            id,
            members,
            subscription,
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn members(&self) -> impl Iterator<Item = &ConnectionId> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members.contains(id)
    }

    pub fn subscription_id(&self) -> u64 {
        self.subscription.id
    }

    pub(super) fn insert(&mut self, id: ConnectionId) -> bool {
        self.members.insert(id)
    }

    pub(super) fn remove(&mut self, id: &ConnectionId) -> bool {
        self.members.remove(id)
    }

    pub(super) fn replace_subscription(&mut self, subscription: RoomSubscription) -> RoomSubscription {
        std::mem::replace(&mut self.subscription, subscription)
    }

    /// Tear the room down, waiting until its subscription is released.
    pub(super) async fn close(self) {
        self.subscription.close().await;
    }
}

/// Handle to the task draining a room's bus subscription.
///
/// The task owns the `BusStream`; ending the task drops the stream, which
/// releases the subscription on the bus.
#[derive(Debug)]
pub struct RoomSubscription {
    id: u64,
    task: Option<JoinHandle<()>>,
}

impl RoomSubscription {
    /// Start draining `stream` into the hub's local fan-out for `room`.
    pub(super) fn spawn(room: RoomId, id: u64, mut stream: BusStream, hub: Hub) -> Self {
        let task = tokio::spawn(async move {
            tracing::debug!(chat_id = %room, subscription = id, "Room subscription opened");

            while let Some(payload) = stream.next().await {
                match Envelope::from_json(&payload) {
                    Ok(envelope) if envelope.is_content() && envelope.chat_id() == room => {
                        hub.broadcast_local(room, &envelope);
                    }
                    Ok(envelope) => {
                        tracing::debug!(
                            chat_id = %room,
                            kind = ?envelope.kind(),
                            payload_chat_id = %envelope.chat_id(),
                            "Ignoring non-content or foreign bus payload"
                        );
                        metrics::record_frame_discarded("bus_payload");
                    }
                    Err(e) => {
                        tracing::warn!(chat_id = %room, error = %e, "Dropping malformed bus payload");
                        metrics::record_frame_discarded("bus_payload");
                    }
                }
            }

            tracing::warn!(chat_id = %room, subscription = id, "Room subscription ended");
            hub.subscription_ended(room, id);
        });

        Self {
            id,
            task: Some(task),
        }
    }

    /// Abort the task and wait for it to be dropped.
    pub(super) async fn close(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for RoomSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
