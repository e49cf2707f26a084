//! WebSocket Connection Handler
//!
//! Accepts `GET /ws/connect?user_id=..&chat_id=..`, admits the connection to
//! the hub and supervises its two pumps until one of them stops.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::time::timeout;

use super::connection::{Connection, DisconnectReason};
use super::hub::HubError;
use super::pump::{read_pump, write_pump, PumpConfig, Session};
use crate::domain::{RoomId, UserId};
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Attachment query. Identity is taken from the query as-is.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

impl ConnectParams {
    pub fn resolve(&self) -> Result<(UserId, RoomId), AppError> {
        let user_id = self
            .user_id
            .as_deref()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| AppError::BadRequest("invalid user_id".into()))?;
        let chat_id = self
            .chat_id
            .as_deref()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| AppError::BadRequest("invalid chat_id".into()))?;
        Ok((user_id, chat_id))
    }
}

/// WebSocket upgrade handler
///
/// Parameters are validated before the upgrade is attempted.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AppError> {
    let (user_id, chat_id) = params.resolve()?;

    if state.hub.is_closed() {
        return Err(AppError::ServiceUnavailable("shutting down".into()));
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let limit = state.settings.websocket.max_message_size;
    Ok(ws
        .max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| run_session(socket, state, user_id, chat_id)))
}

/// Drive one attached session from admission to unregister.
async fn run_session(socket: WebSocket, state: AppState, user_id: UserId, chat_id: RoomId) {
    let config = PumpConfig::from(&state.settings.websocket);
    let (connection, outbound) =
        Connection::new(user_id, state.settings.websocket.send_queue_capacity);
    let id = connection.id();
    let hub = state.hub.clone();

    let (mut sink, stream) = socket.split();

    if let Err(e) = hub.register(connection).await {
        tracing::debug!(connection_id = %id, error = %e, "Registration refused");
        let _ = sink.send(Message::Close(None)).await;
        return;
    }

    if let Err(e) = hub.join(id, chat_id).await {
        tracing::warn!(connection_id = %id, chat_id = %chat_id, error = %e, "Join failed");
        let _ = hub.unregister(id, DisconnectReason::Bus).await;
        let _ = sink.send(Message::Close(None)).await;
        return;
    }

    let session = Session {
        connection_id: id,
        user_id,
        hub: hub.clone(),
        chat: state.chat.clone(),
        config,
    };

    let mut writer = tokio::spawn(write_pump(sink, outbound, config));
    let mut reader = tokio::spawn(read_pump(session, stream));
    let mut writer_running = true;

    let reason = tokio::select! {
        result = &mut reader => result.unwrap_or(DisconnectReason::ReadError),
        result = &mut writer => {
            writer_running = false;
            result.unwrap_or(DisconnectReason::WriteError)
        }
    };

    match hub.unregister(id, reason).await {
        Ok(()) | Err(HubError::Closed) => {}
        Err(e) => tracing::warn!(connection_id = %id, error = %e, "Unregister failed"),
    }

    reader.abort();

    // Unregister closed the queue; give the writer one write to say goodbye.
    if writer_running && timeout(config.write_wait, &mut writer).await.is_err() {
        writer.abort();
    }

    tracing::debug!(connection_id = %id, user_id = %user_id, reason = %reason, "Session ended");
}
