//! # Chat Fan-out Server
//!
//! Entry point that initializes:
//! - Tracing/logging subsystem
//! - Configuration loading
//! - Message bus, optional database pool
//! - HTTP/WebSocket server

use anyhow::Result;
use tracing::info;

use chat_fanout::config::Settings;
use chat_fanout::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    chat_fanout::telemetry::init_tracing();

    info!("Starting chat fan-out server...");

    let settings = Settings::load()?;
    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        environment = %settings.environment,
        backend = ?settings.pubsub.backend,
        persistence = settings.database.is_some(),
        "Configuration loaded"
    );

    let application = Application::build(settings).await?;

    info!("Server ready to accept connections");
    application.run_until_stopped().await?;

    info!("Server stopped");
    Ok(())
}
