//! Registry-side record of an attached WebSocket session.

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::domain::{ConnectionId, RoomId, UserId};

/// A serialized outbound text frame. Cheap to clone across room members.
pub type Frame = Utf8Bytes;

/// Why a connection was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Outbound queue was full during a broadcast
    Backpressure,
    /// No pong within the liveness window
    PingTimeout,
    /// Inbound frame above the size limit
    Oversize,
    /// Transport error while reading
    ReadError,
    /// Transport error while writing
    WriteError,
    /// Peer closed, or the outbound queue was closed
    Closed,
    /// The room's bus subscription could not be opened or was lost
    Bus,
    /// Process shutdown
    Shutdown,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backpressure => "backpressure",
            Self::PingTimeout => "ping_timeout",
            Self::Oversize => "oversize",
            Self::ReadError => "read_error",
            Self::WriteError => "write_error",
            Self::Closed => "closed",
            Self::Bus => "bus",
            Self::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owned by the hub. Holds the only sender of the session's outbound queue;
/// dropping the record closes the queue, which the writer takes as the
/// signal to close the socket.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    room: Option<RoomId>,
    outbound: mpsc::Sender<Frame>,
}

impl Connection {
    /// Create a connection record and the receiving end of its bounded queue.
    pub fn new(user_id: UserId, capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let connection = Self {
            id: ConnectionId::new(),
            user_id,
            room: None,
            outbound,
        };
        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn room(&self) -> Option<RoomId> {
        self.room
    }

    pub(super) fn set_room(&mut self, room: Option<RoomId>) -> Option<RoomId> {
        std::mem::replace(&mut self.room, room)
    }

    /// Non-blocking enqueue.
    pub(super) fn try_enqueue(&self, frame: Frame) -> Result<(), TrySendError<Frame>> {
        self.outbound.try_send(frame)
    }
}
