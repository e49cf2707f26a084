//! Common Test Utilities
//!
//! Shared helpers, fixtures, and test infrastructure.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use tokio::sync::mpsc;
use uuid::Uuid;

use chat_fanout::application::services::{ChatService, ChatServiceImpl};
use chat_fanout::config::{
    BusBackend, CorsSettings, PubSubSettings, RedisSettings, ServerSettings, Settings,
    WebSocketSettings,
};
use chat_fanout::domain::{ConnectionId, Envelope, MessageRepository, RoomId, UserId};
use chat_fanout::infrastructure::pubsub::{BusBridge, MemoryBus, MessageBus};
use chat_fanout::presentation::http::routes::create_router;
use chat_fanout::presentation::websocket::{Connection, Frame, Hub};
use chat_fanout::startup::AppState;

/// How long a test waits for something that should happen.
pub const WAIT: Duration = Duration::from_secs(2);

/// How long a test waits to be sure something does not happen.
pub const QUIET: Duration = Duration::from_millis(100);

pub fn user() -> UserId {
    UserId::from_uuid(Uuid::new_v4())
}

pub fn room() -> RoomId {
    RoomId::from_uuid(Uuid::new_v4())
}

pub fn memory_bus() -> Arc<MemoryBus> {
    Arc::new(MemoryBus::new(64))
}

pub fn topic(room: RoomId) -> String {
    format!("messages:{room}")
}

/// Settings for an instance on the in-memory bus.
pub fn test_settings() -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".into(),
            port: 0,
        },
        redis: RedisSettings {
            url: "redis://127.0.0.1:6379".into(),
        },
        database: None,
        pubsub: PubSubSettings {
            backend: BusBackend::Memory,
            topic_prefix: "messages:".into(),
            memory_capacity: 64,
            subscribe_timeout_secs: 10,
        },
        websocket: WebSocketSettings::default(),
        cors: CorsSettings {
            allowed_origins: vec![],
        },
        environment: "test".into(),
    }
}

/// One simulated server instance: a hub and a chat service over a shared bus.
pub struct Instance {
    pub hub: Hub,
    pub chat: Arc<dyn ChatService>,
}

impl Instance {
    pub fn on(bus: Arc<dyn MessageBus>) -> Self {
        Self::with_store(bus, None)
    }

    pub fn with_store(bus: Arc<dyn MessageBus>, store: Option<Arc<dyn MessageRepository>>) -> Self {
        let bridge = BusBridge::with_default_prefix(bus);
        Self {
            hub: Hub::new(bridge.clone()),
            chat: Arc::new(ChatServiceImpl::new(bridge, store)),
        }
    }

    /// Register a connection and put it in `room`.
    pub async fn attach(&self, room: RoomId, capacity: usize) -> Member {
        let user_id = user();
        let (connection, outbound) = Connection::new(user_id, capacity);
        let id = connection.id();
        self.hub.register(connection).await.unwrap();
        self.hub.join(id, room).await.unwrap();
        Member {
            id,
            user_id,
            outbound,
        }
    }
}

/// A registered connection as seen from its writer's side.
pub struct Member {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub outbound: mpsc::Receiver<Frame>,
}

impl Member {
    /// Next delivered envelope, failing the test if none arrives in time.
    pub async fn next(&mut self) -> Envelope {
        let frame = tokio::time::timeout(WAIT, self.outbound.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("outbound queue closed");
        Envelope::from_json(frame.as_str()).unwrap()
    }

    /// Asserts nothing else is delivered for a short while.
    pub async fn assert_quiet(&mut self) {
        if let Ok(Some(frame)) = tokio::time::timeout(QUIET, self.outbound.recv()).await {
            panic!("unexpected frame: {}", frame.as_str());
        }
    }

    /// Waits for the hub to close this member's queue.
    pub async fn closed(&mut self) {
        tokio::time::timeout(WAIT, async {
            while self.outbound.recv().await.is_some() {}
        })
        .await
        .expect("outbound queue was not closed");
    }
}

/// Poll `condition` until it holds or the wait expires.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Test application over the in-memory bus
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
}

impl TestApp {
    pub async fn new() -> Self {
        let state = AppState::new(test_settings(), memory_bus(), None);
        let server = TestServer::new(create_router(state.clone())).unwrap();
        Self { server, state }
    }

    /// Same application served on a real port, so WebSocket upgrades complete.
    pub async fn with_http_transport() -> Self {
        let state = AppState::new(test_settings(), memory_bus(), None);
        let server = TestServer::builder()
            .http_transport()
            .build(create_router(state.clone()))
            .unwrap();
        Self { server, state }
    }
}
