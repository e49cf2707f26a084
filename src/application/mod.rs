//! Application Layer
//!
//! Services that sit between the WebSocket sessions and the domain and
//! infrastructure layers.

pub mod services;
