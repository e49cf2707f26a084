//! Health Check API Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::Value;

use crate::common::{room, TestApp};
use chat_fanout::presentation::websocket::Connection;

#[tokio::test]
async fn test_health_check_returns_ok() {
    let app = TestApp::new().await;

    let response = app.server.get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_liveness_probe() {
    let app = TestApp::new().await;

    let response = app.server.get("/health/live").await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "alive");
}

#[tokio::test]
async fn test_readiness_reports_hub_occupancy() {
    let app = TestApp::new().await;
    let (connection, _outbound) = Connection::new(crate::common::user(), 4);
    let id = connection.id();
    app.state.hub.register(connection).await.unwrap();
    app.state.hub.join(id, room()).await.unwrap();

    let response = app.server.get("/health/ready").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["websocket"]["active_connections"], 1);
    assert_eq!(body["checks"]["websocket"]["active_rooms"], 1);
    // Neither Redis nor a database is configured for the in-memory bus.
    assert!(body["checks"].get("redis").is_none());
    assert!(body["checks"].get("database").is_none());
}

#[tokio::test]
async fn test_readiness_fails_after_shutdown() {
    let app = TestApp::new().await;
    app.state.hub.shutdown().await;

    let response = app.server.get("/health/ready").await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_hub_gauges() {
    let app = TestApp::new().await;

    let response = app.server.get("/metrics").await;

    response.assert_status_ok();
    assert!(response.text().contains("chat_fanout_websocket_connections_active"));
}
