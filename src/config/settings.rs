//! Application settings and configuration structures.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// Redis configuration (pub/sub bus and health checks)
    pub redis: RedisSettings,

    /// Optional PostgreSQL configuration. Persistence is disabled when absent.
    #[serde(default)]
    pub database: Option<DatabaseSettings>,

    /// Message bus configuration
    pub pubsub: PubSubSettings,

    /// WebSocket configuration
    pub websocket: WebSocketSettings,

    /// CORS configuration
    pub cors: CorsSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

/// PostgreSQL database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Database connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections to maintain
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_acquire_timeout() -> u64 {
    30
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    /// Redis connection URL
    pub url: String,
}

/// Which bus implementation replicates room traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// Redis pub/sub, shared by every server instance
    Redis,
    /// Process-local broadcast channels (single instance only)
    Memory,
}

/// Message bus configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PubSubSettings {
    /// Bus implementation
    pub backend: BusBackend,

    /// Topic prefix; a room's topic is prefix + chat id
    pub topic_prefix: String,

    /// Per-topic buffer of the in-memory bus
    pub memory_capacity: usize,

    /// Seconds the bus gets to confirm a room subscription
    pub subscribe_timeout_secs: u64,
}

impl PubSubSettings {
    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_secs(self.subscribe_timeout_secs)
    }
}

/// WebSocket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketSettings {
    /// Maximum inbound frame size in bytes. Larger frames close the connection.
    pub max_message_size: usize,

    /// Seconds of peer silence (no pong) tolerated before the connection is dropped
    pub pong_wait_secs: u64,

    /// Deadline in seconds for a single socket write
    pub write_wait_secs: u64,

    /// Capacity of each connection's outbound queue
    pub send_queue_capacity: usize,
}

impl WebSocketSettings {
    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    /// Ping cadence: 9/10 of the pong window, so a ping always lands before it expires.
    pub fn ping_period(&self) -> Duration {
        self.pong_wait() * 9 / 10
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            max_message_size: 512,
            pong_wait_secs: 60,
            write_wait_secs: 10,
            send_queue_capacity: 256,
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    /// Allowed origins. Empty means any origin.
    pub allowed_origins: Vec<String>,
}

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. config/default.toml (base configuration)
    /// 2. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 3. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// or if a WebSocket limit is zero.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Config::builder()
            .set_default("environment", environment.clone())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            .set_default("pubsub.backend", "redis")?
            .set_default("pubsub.topic_prefix", "messages:")?
            .set_default("pubsub.memory_capacity", 1024_i64)?
            .set_default("pubsub.subscribe_timeout_secs", 10_i64)?
            .set_default("websocket.max_message_size", 512_i64)?
            .set_default("websocket.pong_wait_secs", 60_i64)?
            .set_default("websocket.write_wait_secs", 10_i64)?
            .set_default("websocket.send_queue_capacity", 256_i64)?
            .set_default("cors.allowed_origins", Vec::<String>::new())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // APP__WEBSOCKET__PONG_WAIT_SECS=30 -> websocket.pong_wait_secs = 30
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("redis.url", std::env::var("REDIS_URL").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .build()?
            .try_deserialize()
            .and_then(|settings: Self| {
                settings.validate()?;
                Ok(settings)
            })
    }

    /// Reject limits that would make every connection unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ws = &self.websocket;
        if ws.send_queue_capacity == 0 {
            return Err(ConfigError::Message(
                "websocket.send_queue_capacity must be greater than zero".into(),
            ));
        }
        if ws.max_message_size == 0 {
            return Err(ConfigError::Message(
                "websocket.max_message_size must be greater than zero".into(),
            ));
        }
        if ws.pong_wait_secs == 0 {
            return Err(ConfigError::Message(
                "websocket.pong_wait_secs must be greater than zero".into(),
            ));
        }
        if ws.write_wait_secs == 0 {
            return Err(ConfigError::Message(
                "websocket.write_wait_secs must be greater than zero".into(),
            ));
        }
        if self.pubsub.subscribe_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "pubsub.subscribe_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.pubsub.backend == BusBackend::Memory && self.pubsub.memory_capacity == 0 {
            return Err(ConfigError::Message(
                "pubsub.memory_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
