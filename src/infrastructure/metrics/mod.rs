//! Prometheus Metrics Module
//!
//! Provides application-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Active WebSocket connections and rooms
//! - Bus publish outcomes
//! - Per-member deliveries
//! - Dropped connections and discarded frames by reason

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Connections currently registered with the local hub
pub static WEBSOCKET_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new(
            "websocket_connections_active",
            "Number of registered WebSocket connections",
        )
        .namespace("chat_fanout"),
    )
    .expect("Failed to create WEBSOCKET_CONNECTIONS_ACTIVE metric")
});

/// Rooms with at least one local member (one bus subscription each)
pub static ROOMS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("rooms_active", "Number of rooms with local members").namespace("chat_fanout"),
    )
    .expect("Failed to create ROOMS_ACTIVE metric")
});

/// Bus publishes by result ("ok", "error")
pub static BUS_MESSAGES_PUBLISHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bus_messages_published_total", "Messages published to the bus")
            .namespace("chat_fanout"),
        &["result"],
    )
    .expect("Failed to create BUS_MESSAGES_PUBLISHED_TOTAL metric")
});

/// Frames enqueued onto member outbound queues
pub static MESSAGES_DELIVERED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new(
            "messages_delivered_total",
            "Frames enqueued for local room members",
        )
        .namespace("chat_fanout"),
    )
    .expect("Failed to create MESSAGES_DELIVERED_TOTAL metric")
});

/// Connections torn down, by reason
pub static CONNECTIONS_DROPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("connections_dropped_total", "Connections torn down by reason")
            .namespace("chat_fanout"),
        &["reason"],
    )
    .expect("Failed to create CONNECTIONS_DROPPED_TOTAL metric")
});

/// Inbound or bus frames discarded without closing anything, by reason
pub static FRAMES_DISCARDED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("frames_discarded_total", "Frames discarded by reason")
            .namespace("chat_fanout"),
        &["reason"],
    )
    .expect("Failed to create FRAMES_DISCARDED_TOTAL metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(WEBSOCKET_CONNECTIONS_ACTIVE.clone()))
        .expect("Failed to register WEBSOCKET_CONNECTIONS_ACTIVE");
    registry
        .register(Box::new(ROOMS_ACTIVE.clone()))
        .expect("Failed to register ROOMS_ACTIVE");
    registry
        .register(Box::new(BUS_MESSAGES_PUBLISHED_TOTAL.clone()))
        .expect("Failed to register BUS_MESSAGES_PUBLISHED_TOTAL");
    registry
        .register(Box::new(MESSAGES_DELIVERED_TOTAL.clone()))
        .expect("Failed to register MESSAGES_DELIVERED_TOTAL");
    registry
        .register(Box::new(CONNECTIONS_DROPPED_TOTAL.clone()))
        .expect("Failed to register CONNECTIONS_DROPPED_TOTAL");
    registry
        .register(Box::new(FRAMES_DISCARDED_TOTAL.clone()))
        .expect("Failed to register FRAMES_DISCARDED_TOTAL");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Helper to record a bus publish outcome
pub fn record_publish(ok: bool) {
    BUS_MESSAGES_PUBLISHED_TOTAL
        .with_label_values(&[if ok { "ok" } else { "error" }])
        .inc();
}

/// Helper to record successful enqueues from one fan-out
pub fn record_delivered(count: usize) {
    MESSAGES_DELIVERED_TOTAL.inc_by(count as u64);
}

/// Helper to record a torn-down connection
pub fn record_connection_dropped(reason: &str) {
    CONNECTIONS_DROPPED_TOTAL.with_label_values(&[reason]).inc();
}

/// Helper to record a discarded frame
pub fn record_frame_discarded(reason: &str) {
    FRAMES_DISCARDED_TOTAL.with_label_values(&[reason]).inc();
}

/// Helper to update hub gauges
pub fn set_hub_gauges(connections: usize, rooms: usize) {
    WEBSOCKET_CONNECTIONS_ACTIVE.set(connections as i64);
    ROOMS_ACTIVE.set(rooms as i64);
}
