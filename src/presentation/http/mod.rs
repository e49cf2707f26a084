//! HTTP Layer
//!
//! Routes and handlers for the non-WebSocket endpoints.

pub mod handlers;
pub mod routes;
