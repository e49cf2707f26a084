//! Infrastructure Layer
//!
//! Contains implementations for external services including:
//! - Pub/sub bus (Redis, in-memory)
//! - Database pool and message repository (PostgreSQL)
//! - Prometheus metrics

pub mod database;
pub mod metrics;
pub mod pubsub;
pub mod repositories;
