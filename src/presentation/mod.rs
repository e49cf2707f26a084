//! Presentation Layer
//!
//! HTTP routes, middleware and the WebSocket fan-out hub.

pub mod http;
pub mod middleware;
pub mod websocket;
