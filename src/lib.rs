//! # Chat Fan-out Library
//!
//! Real-time chat delivery core:
//! - WebSocket sessions attached to exactly one room each
//! - A hub that owns connections and room membership
//! - One pub/sub subscription per occupied room, so every instance sharing
//!   the bus delivers every room message to its local members
//! - Optional PostgreSQL persistence of authored messages
//!
//! ## Module Structure
//!
//! ```text
//! chat_fanout/
//! +-- config/         Configuration management
//! +-- domain/         Ids, envelopes, persistence trait
//! +-- application/    Chat authoring service
//! +-- infrastructure/ Bus backends, database, metrics
//! +-- presentation/   Hub, rooms, pumps, HTTP routes
//! +-- shared/         Errors
//! ```

// Configuration module
pub mod config;

// Domain layer
pub mod domain;

// Application layer
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
