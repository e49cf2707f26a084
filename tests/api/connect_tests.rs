//! Attachment Endpoint Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::Value;

use crate::common::{room, user, TestApp};

#[tokio::test]
async fn test_invalid_user_id_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .server
        .get("/ws/connect")
        .add_query_param("user_id", "not-a-uuid")
        .add_query_param("chat_id", room().to_string())
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["message"], "invalid user_id");
}

#[tokio::test]
async fn test_missing_chat_id_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .server
        .get("/ws/connect")
        .add_query_param("user_id", user().to_string())
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["message"], "invalid chat_id");
}

#[tokio::test]
async fn test_plain_http_request_is_not_upgraded() {
    let app = TestApp::new().await;

    let response = app
        .server
        .get("/ws/connect")
        .add_query_param("user_id", user().to_string())
        .add_query_param("chat_id", room().to_string())
        .expect_failure()
        .await;

    assert!(response.status_code().is_client_error());
    assert_eq!(app.state.hub.connection_count(), 0);
}

#[tokio::test]
async fn test_attach_refused_after_shutdown() {
    let app = TestApp::new().await;
    app.state.hub.shutdown().await;

    let response = app
        .server
        .get("/ws/connect")
        .add_query_param("user_id", user().to_string())
        .add_query_param("chat_id", room().to_string())
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}
