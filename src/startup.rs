//! Application Startup
//!
//! Application building and server initialization.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower::ServiceBuilder;

use crate::application::services::{ChatService, ChatServiceImpl};
use crate::config::{BusBackend, Settings};
use crate::domain::MessageRepository;
use crate::infrastructure::database;
use crate::infrastructure::pubsub::{BusBridge, MemoryBus, MessageBus, RedisBus};
use crate::infrastructure::repositories::PgMessageRepository;
use crate::presentation::http::{handlers::health, routes};
use crate::presentation::middleware::{create_cors_layer, create_trace_layer};
use crate::presentation::websocket::Hub;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub chat: Arc<dyn ChatService>,
    /// Publishing connection, when the bus is Redis
    pub redis: Option<ConnectionManager>,
    pub db: Option<PgPool>,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Wire the hub and the chat service over one bus. Must be called inside
    /// a Tokio runtime; the hub spawns its actor here.
    pub fn new(
        settings: Settings,
        bus: Arc<dyn MessageBus>,
        store: Option<Arc<dyn MessageRepository>>,
    ) -> Self {
        let bridge = BusBridge::new(bus, settings.pubsub.topic_prefix.as_str())
            .with_subscribe_timeout(settings.pubsub.subscribe_timeout());
        let hub = Hub::new(bridge.clone());
        let chat: Arc<dyn ChatService> = Arc::new(ChatServiceImpl::new(bridge, store));

        Self {
            hub,
            chat,
            redis: None,
            db: None,
            settings: Arc::new(settings),
        }
    }
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
    hub: Hub,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        health::init_server_start();

        let db = match &settings.database {
            Some(db_settings) => {
                let pool = database::create_pool(db_settings)
                    .await
                    .context("failed to connect to PostgreSQL")?;
                tracing::info!("Database connection pool created");
                Some(pool)
            }
            None => {
                tracing::info!("No database configured, messages will not be persisted");
                None
            }
        };
        let store = db
            .clone()
            .map(|pool| Arc::new(PgMessageRepository::new(pool)) as Arc<dyn MessageRepository>);

        let (bus, redis) = match settings.pubsub.backend {
            BusBackend::Redis => {
                let bus = RedisBus::connect(&settings.redis)
                    .await
                    .context("failed to connect to Redis")?;
                let conn = bus.connection();
                (Arc::new(bus) as Arc<dyn MessageBus>, Some(conn))
            }
            BusBackend::Memory => {
                tracing::warn!("Using the in-memory bus; rooms are not shared across instances");
                (
                    Arc::new(MemoryBus::new(settings.pubsub.memory_capacity)) as Arc<dyn MessageBus>,
                    None,
                )
            }
        };

        let cors = create_cors_layer(&settings.cors);
        let addr = settings.server_addr();

        let mut state = AppState::new(settings, bus, store);
        state.redis = redis;
        state.db = db;
        let hub = state.hub.clone();

        let router = routes::create_router(state).layer(
            ServiceBuilder::new()
                .layer(create_trace_layer())
                .layer(cors),
        );

        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        tracing::info!("Listening on {}", addr);

        Ok(Self {
            listener,
            router,
            hub,
        })
    }

    /// Run the server until Ctrl-C or SIGTERM, then shut the hub down.
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal(self.hub))
            .await?;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

async fn shutdown_signal(hub: Hub) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    hub.shutdown().await;
}
