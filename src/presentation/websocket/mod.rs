//! WebSocket Fan-out
//!
//! Room-scoped real-time delivery: the hub owns connections and rooms, each
//! room drains one bus subscription, and each attached session runs a reader
//! and a writer pump.

pub mod connection;
pub mod handler;
pub mod hub;
pub mod messages;
pub mod pump;
pub mod room;

pub use connection::{Connection, DisconnectReason, Frame};
pub use handler::{ws_handler, ConnectParams};
pub use hub::{Hub, HubError};
pub use messages::{ChatMessage, Inbound};
pub use pump::{read_pump, write_pump, PumpConfig, Session};
pub use room::Room;
