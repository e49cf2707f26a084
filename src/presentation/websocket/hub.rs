//! Connection Hub
//!
//! Single authority over the connection set and room membership.
//!
//! Every mutation (register, join, leave, unregister, shutdown) is a command
//! handled one at a time by the hub actor, so membership transitions are
//! linearizable. The actor is also the only task that opens or closes bus
//! subscriptions, which keeps "room has members" and "room is subscribed" in
//! lock-step.
//!
//! Fan-out (`broadcast_local`) does not go through the actor: it takes a
//! shared read view of both maps. Both maps sit behind one lock, so a
//! broadcast sees a connection either fully registered or fully gone.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use super::connection::{Connection, DisconnectReason, Frame};
use super::room::{Room, RoomSubscription};
use crate::domain::{ConnectionId, Envelope, RoomId};
use crate::infrastructure::metrics;
use crate::infrastructure::pubsub::{BusBridge, BusError};

/// Hub errors
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The hub has shut down. The caller must close its socket.
    #[error("hub is closed")]
    Closed,

    #[error("connection {0} is not registered")]
    NotRegistered(ConnectionId),

    #[error("failed to subscribe room to the bus: {0}")]
    Subscribe(#[from] BusError),
}

type Reply<T> = oneshot::Sender<Result<T, HubError>>;

enum Command {
    Register {
        connection: Connection,
        reply: Reply<()>,
    },
    Join {
        id: ConnectionId,
        room: RoomId,
        reply: Reply<()>,
    },
    Leave {
        id: ConnectionId,
        reply: Reply<()>,
    },
    Unregister {
        id: ConnectionId,
        reason: DisconnectReason,
        reply: Option<Reply<()>>,
    },
    SubscriptionEnded {
        room: RoomId,
        subscription: u64,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Connection and room maps. Only the actor writes.
#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, Connection>,
    rooms: HashMap<RoomId, Room>,
    closed: bool,
}

impl HubState {
    /// Detach a connection from its room. Returns the room if it emptied.
    fn detach(&mut self, id: ConnectionId) -> Option<Room> {
        let room_id = self.connections.get_mut(&id)?.set_room(None)?;
        let room = self.rooms.get_mut(&room_id)?;
        room.remove(&id);
        if room.is_empty() {
            self.rooms.remove(&room_id)
        } else {
            None
        }
    }

    fn publish_gauges(&self) {
        metrics::set_hub_gauges(self.connections.len(), self.rooms.len());
    }
}

struct Shared {
    state: RwLock<HubState>,
    commands: mpsc::UnboundedSender<Command>,
}

/// Cloneable handle to the hub.
#[derive(Clone)]
pub struct Hub {
    shared: Arc<Shared>,
}

impl Hub {
    /// Create a hub and spawn its actor on the current runtime.
    pub fn new(bridge: BusBridge) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let hub = Self {
            shared: Arc::new(Shared {
                state: RwLock::new(HubState::default()),
                commands,
            }),
        };

        let actor = HubActor {
            hub: hub.clone(),
            bridge,
            next_subscription: 0,
        };
        tokio::spawn(actor.run(rx));

        hub
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, HubError> {
        let (tx, rx) = oneshot::channel();
        self.shared
            .commands
            .send(command(tx))
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)?
    }

    /// Admit a freshly accepted connection. Fails only after shutdown.
    pub async fn register(&self, connection: Connection) -> Result<(), HubError> {
        self.request(|reply| Command::Register { connection, reply })
            .await
    }

    /// Attach a connection to exactly one room, leaving its previous room
    /// first. The room and its bus subscription are created on first member.
    pub async fn join(&self, id: ConnectionId, room: RoomId) -> Result<(), HubError> {
        self.request(|reply| Command::Join { id, room, reply }).await
    }

    /// Detach a connection from its room without unregistering it.
    pub async fn leave(&self, id: ConnectionId) -> Result<(), HubError> {
        self.request(|reply| Command::Leave { id, reply }).await
    }

    /// Remove a connection everywhere. Idempotent.
    pub async fn unregister(
        &self,
        id: ConnectionId,
        reason: DisconnectReason,
    ) -> Result<(), HubError> {
        self.request(|reply| Command::Unregister {
            id,
            reason,
            reply: Some(reply),
        })
        .await
    }

    /// Fire-and-forget unregister, for callers that must not wait.
    fn evict(&self, id: ConnectionId, reason: DisconnectReason) {
        let _ = self.shared.commands.send(Command::Unregister {
            id,
            reason,
            reply: None,
        });
    }

    pub(super) fn subscription_ended(&self, room: RoomId, subscription: u64) {
        let _ = self
            .shared
            .commands
            .send(Command::SubscriptionEnded { room, subscription });
    }

    /// Close every connection and release every bus subscription. Later
    /// operations fail with `HubError::Closed`.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .shared
            .commands
            .send(Command::Shutdown { reply: tx })
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Deliver an envelope to every local member of `room`.
    ///
    /// Never blocks: a member whose queue is full is evicted instead of
    /// stalling the others. Returns the number of members the frame was
    /// queued for.
    pub fn broadcast_local(&self, room: RoomId, envelope: &Envelope) -> usize {
        let frame: Frame = match envelope.to_json() {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::error!(chat_id = %room, error = %e, "Failed to encode envelope");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut evicted = Vec::new();
        {
            let state = self.shared.state.read();
            let Some(members) = state.rooms.get(&room) else {
                return 0;
            };

            for id in members.members() {
                // Already retired by the hub: treat as gone.
                let Some(connection) = state.connections.get(id) else {
                    continue;
                };
                match connection.try_enqueue(frame.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => evicted.push((*id, DisconnectReason::Backpressure)),
                    Err(TrySendError::Closed(_)) => evicted.push((*id, DisconnectReason::Closed)),
                }
            }
        }

        for (id, reason) in evicted {
            tracing::warn!(
                connection_id = %id,
                chat_id = %room,
                reason = %reason,
                "Evicting connection during broadcast"
            );
            self.evict(id, reason);
        }

        metrics::record_delivered(delivered);
        delivered
    }

    pub fn connection_count(&self) -> usize {
        self.shared.state.read().connections.len()
    }

    pub fn room_count(&self) -> usize {
        self.shared.state.read().rooms.len()
    }

    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.shared.state.read().connections.contains_key(&id)
    }

    /// Room the connection is currently a member of.
    pub fn room_of(&self, id: ConnectionId) -> Option<RoomId> {
        self.shared
            .state
            .read()
            .connections
            .get(&id)
            .and_then(|c| c.room())
    }

    /// Members of a room; empty when the room does not exist.
    pub fn members(&self, room: RoomId) -> Vec<ConnectionId> {
        self.shared
            .state
            .read()
            .rooms
            .get(&room)
            .map(|r| r.members().copied().collect())
            .unwrap_or_default()
    }

    /// Whether the room currently holds a bus subscription.
    pub fn is_subscribed(&self, room: RoomId) -> bool {
        self.shared.state.read().rooms.contains_key(&room)
    }

    /// Generation of the room's current subscription; changes on resubscribe.
    pub fn subscription_id(&self, room: RoomId) -> Option<u64> {
        self.shared
            .state
            .read()
            .rooms
            .get(&room)
            .map(|r| r.subscription_id())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.read().closed
    }
}

struct HubActor {
    hub: Hub,
    bridge: BusBridge,
    next_subscription: u64,
}

impl HubActor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        tracing::debug!("Hub actor started");

        while let Some(command) = commands.recv().await {
            match command {
                Command::Register { connection, reply } => {
                    let _ = reply.send(self.register(connection));
                }
                Command::Join { id, room, reply } => {
                    let _ = reply.send(self.join(id, room).await);
                }
                Command::Leave { id, reply } => {
                    let _ = reply.send(self.leave(id).await);
                }
                Command::Unregister { id, reason, reply } => {
                    self.unregister(id, reason).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(Ok(()));
                    }
                }
                Command::SubscriptionEnded { room, subscription } => {
                    self.resubscribe(room, subscription).await;
                }
                Command::Shutdown { reply } => {
                    self.shutdown().await;
                    let _ = reply.send(());
                    break;
                }
            }
        }

        // Dropping the receiver fails every queued and future request with
        // `HubError::Closed`.
        tracing::debug!("Hub actor stopped");
    }

    fn state(&self) -> &RwLock<HubState> {
        &self.hub.shared.state
    }

    fn register(&mut self, connection: Connection) -> Result<(), HubError> {
        let (id, user_id) = (connection.id(), connection.user_id());
        let mut state = self.state().write();
        state.connections.entry(id).or_insert(connection);
        state.publish_gauges();
        drop(state);

        tracing::info!(connection_id = %id, user_id = %user_id, "Connection registered");
        Ok(())
    }

    async fn open_subscription(&mut self, room: RoomId) -> Result<RoomSubscription, BusError> {
        let stream = self.bridge.subscribe(room).await?;
        self.next_subscription += 1;
        Ok(RoomSubscription::spawn(
            room,
            self.next_subscription,
            stream,
            self.hub.clone(),
        ))
    }

    async fn join(&mut self, id: ConnectionId, room: RoomId) -> Result<(), HubError> {
        let (current, room_exists) = {
            let state = self.state().read();
            let Some(connection) = state.connections.get(&id) else {
                return Err(HubError::NotRegistered(id));
            };
            (connection.room(), state.rooms.contains_key(&room))
        };

        if current == Some(room) {
            return Ok(());
        }

        // First member: subscribe before the member becomes visible.
        let mut subscription = None;
        if !room_exists {
            match self.open_subscription(room).await {
                Ok(s) => subscription = Some(s),
                Err(e) => {
                    tracing::warn!(
                        connection_id = %id,
                        chat_id = %room,
                        error = %e,
                        "Room subscription failed, dropping connection"
                    );
                    self.unregister(id, DisconnectReason::Bus).await;
                    return Err(HubError::Subscribe(e));
                }
            }
        }

        let emptied = {
            let mut state = self.state().write();
            let emptied = state.detach(id);

            if let Some(existing) = state.rooms.get_mut(&room) {
                existing.insert(id);
            } else if let Some(subscription) = subscription {
                state
                    .rooms
                    .insert(room, Room::new(room, id, subscription));
            }

            if let Some(connection) = state.connections.get_mut(&id) {
                connection.set_room(Some(room));
            }
            state.publish_gauges();
            emptied
        };

        tracing::info!(connection_id = %id, chat_id = %room, previous = ?current, "Connection joined room");
        self.release(emptied).await;
        Ok(())
    }

    async fn leave(&mut self, id: ConnectionId) -> Result<(), HubError> {
        let emptied = {
            let mut state = self.state().write();
            if !state.connections.contains_key(&id) {
                return Err(HubError::NotRegistered(id));
            }
            let emptied = state.detach(id);
            state.publish_gauges();
            emptied
        };

        tracing::debug!(connection_id = %id, "Connection left room");
        self.release(emptied).await;
        Ok(())
    }

    async fn unregister(&mut self, id: ConnectionId, reason: DisconnectReason) {
        let (connection, emptied) = {
            let mut state = self.state().write();
            let emptied = state.detach(id);
            let connection = state.connections.remove(&id);
            state.publish_gauges();
            (connection, emptied)
        };

        // Dropping the record closes the outbound queue.
        if let Some(connection) = connection {
            metrics::record_connection_dropped(reason.as_str());
            tracing::info!(
                connection_id = %id,
                user_id = %connection.user_id(),
                reason = %reason,
                "Connection unregistered"
            );
        }
        self.release(emptied).await;
    }

    /// Close the subscription of a room that lost its last member.
    async fn release(&mut self, room: Option<Room>) {
        if let Some(room) = room {
            let id = room.id();
            room.close().await;
            tracing::info!(chat_id = %id, "Room emptied, bus subscription released");
        }
    }

    /// A room's bus stream ended on its own. Reopen it, or evict the members
    /// if the bus is unreachable.
    async fn resubscribe(&mut self, room: RoomId, subscription: u64) {
        let current = self
            .state()
            .read()
            .rooms
            .get(&room)
            .map(|r| r.subscription_id());
        if current != Some(subscription) {
            return;
        }

        match self.open_subscription(room).await {
            Ok(fresh) => {
                let stale = self
                    .state()
                    .write()
                    .rooms
                    .get_mut(&room)
                    .map(|r| r.replace_subscription(fresh));
                if let Some(stale) = stale {
                    stale.close().await;
                }
                tracing::info!(chat_id = %room, "Room bus subscription reopened");
            }
            Err(e) => {
                tracing::error!(chat_id = %room, error = %e, "Cannot reopen room subscription, evicting members");
                for id in self.hub.members(room) {
                    self.unregister(id, DisconnectReason::Bus).await;
                }
            }
        }
    }

    async fn shutdown(&mut self) {
        let (connections, rooms) = {
            let mut state = self.state().write();
            state.closed = true;
            let connections: Vec<Connection> = state.connections.drain().map(|(_, c)| c).collect();
            let rooms: Vec<Room> = state.rooms.drain().map(|(_, r)| r).collect();
            state.publish_gauges();
            (connections, rooms)
        };

        tracing::info!(
            connections = connections.len(),
            rooms = rooms.len(),
            "Hub shutting down"
        );

        for room in rooms {
            room.close().await;
        }
        for _ in &connections {
            metrics::record_connection_dropped(DisconnectReason::Shutdown.as_str());
        }
        drop(connections);
    }
}
