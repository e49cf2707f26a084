//! Connection I/O pumps.
//!
//! Each attached session runs one reader and one writer as separate tasks.
//! They share nothing but the connection's outbound queue; each returns the
//! reason it stopped so the session can unregister exactly once.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, timeout_at, Instant, MissedTickBehavior};

use super::connection::{DisconnectReason, Frame};
use super::hub::Hub;
use super::messages::{ChatMessage, Inbound};
use crate::application::services::ChatService;
use crate::config::WebSocketSettings;
use crate::domain::{ConnectionId, UserId};
use crate::infrastructure::metrics;

/// Timing and size limits for one session.
#[derive(Debug, Clone, Copy)]
pub struct PumpConfig {
    pub max_message_size: usize,
    pub pong_wait: Duration,
    pub ping_period: Duration,
    pub write_wait: Duration,
}

impl From<&WebSocketSettings> for PumpConfig {
    fn from(settings: &WebSocketSettings) -> Self {
        Self {
            max_message_size: settings.max_message_size,
            pong_wait: settings.pong_wait(),
            ping_period: settings.ping_period(),
            write_wait: settings.write_wait(),
        }
    }
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self::from(&WebSocketSettings::default())
    }
}

/// What the reader needs to turn frames into published messages.
#[derive(Clone)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub hub: Hub,
    pub chat: Arc<dyn ChatService>,
    pub config: PumpConfig,
}

/// Inbound path. Runs until the peer goes away or misbehaves.
///
/// Only a pong extends the liveness deadline. Content is handed to the chat
/// service, never delivered locally from here.
pub async fn read_pump<S, E>(session: Session, mut stream: S) -> DisconnectReason
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let id = session.connection_id;
    let mut deadline = Instant::now() + session.config.pong_wait;

    loop {
        let message = match timeout_at(deadline, stream.next()).await {
            Err(_) => {
                tracing::info!(connection_id = %id, "No pong within liveness window");
                return DisconnectReason::PingTimeout;
            }
            Ok(None) => return DisconnectReason::Closed,
            Ok(Some(Err(e))) => {
                tracing::debug!(connection_id = %id, error = %e, "WebSocket read error");
                return DisconnectReason::ReadError;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => {
                let size = text.as_str().len();
                if size > session.config.max_message_size {
                    tracing::info!(connection_id = %id, size, "Inbound frame too large");
                    return DisconnectReason::Oversize;
                }
                handle_text(&session, text.as_str()).await;
            }
            Message::Binary(data) => {
                if data.len() > session.config.max_message_size {
                    tracing::info!(connection_id = %id, size = data.len(), "Inbound frame too large");
                    return DisconnectReason::Oversize;
                }
                tracing::debug!(connection_id = %id, "Discarding binary frame");
                metrics::record_frame_discarded("malformed");
            }
            Message::Pong(_) => {
                deadline = Instant::now() + session.config.pong_wait;
            }
            // Answered by the transport
            Message::Ping(_) => {}
            Message::Close(_) => return DisconnectReason::Closed,
        }
    }
}

async fn handle_text(session: &Session, text: &str) {
    let id = session.connection_id;

    let message = match Inbound::decode(text) {
        Ok(Inbound::Message(message)) => message,
        Ok(Inbound::Ignored(kind)) => {
            tracing::debug!(connection_id = %id, kind = %kind, "Ignoring frame type");
            return;
        }
        Err(e) => {
            tracing::debug!(connection_id = %id, error = %e, "Discarding malformed frame");
            metrics::record_frame_discarded("malformed");
            return;
        }
    };

    let ChatMessage { chat_id, content } = message;

    // Content may only be authored into the room the connection is attached to.
    if session.hub.room_of(id) != Some(chat_id) {
        tracing::debug!(connection_id = %id, chat_id = %chat_id, "Frame for a room the connection is not in");
        metrics::record_frame_discarded("room_mismatch");
        return;
    }

    // Failures are logged by the service and cost only this message.
    let _ = session.chat.send(session.user_id, chat_id, content).await;
}

/// Outbound path. Drains the queue to the socket and keeps the peer alive.
///
/// A closed queue means the hub retired the connection: send a close frame
/// and stop.
pub async fn write_pump<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Frame>,
    config: PumpConfig,
) -> DisconnectReason
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ping = interval_at(Instant::now() + config.ping_period, config.ping_period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let message = tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => Message::Text(frame),
                None => {
                    let _ = write(&mut sink, Message::Close(None), config.write_wait).await;
                    return DisconnectReason::Closed;
                }
            },
            _ = ping.tick() => Message::Ping(Bytes::new()),
        };

        if let Err(e) = write(&mut sink, message, config.write_wait).await {
            tracing::debug!(error = %e, "WebSocket write failed");
            return DisconnectReason::WriteError;
        }
    }
}

async fn write<S>(sink: &mut S, message: Message, wait: Duration) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match timeout(wait, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("write deadline exceeded".to_string()),
    }
}
