//! Metrics definitions for the room service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `rs_` prefix for the room service
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `actor_type`: 3 values (controller, room, connection)
//! - `event`: bounded by the wire event set (~25 values)
//! - `reason` / `error_type`: bounded by `RoomError` variants

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Event handling is in-memory; anything above a few ms is a backlog
        .set_buckets_for_metric(
            Matcher::Prefix("rs_event_latency".to_string()),
            &[
                0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250,
            ],
        )
        .map_err(|e| format!("Failed to set event latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Gauges
// ============================================================================

/// Metric: `rs_connections_active`
pub fn set_connections_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("rs_connections_active").set(count as f64);
}

/// Metric: `rs_rooms_active`
pub fn set_rooms_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("rs_rooms_active").set(count as f64);
}

/// Metric: `rs_participants_active`
pub fn set_participants_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("rs_participants_active").set(count as f64);
}

/// Set the mailbox depth for an actor type.
///
/// Metric: `rs_actor_mailbox_depth`
/// Labels: `actor_type`
pub fn set_actor_mailbox_depth(actor_type: &'static str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("rs_actor_mailbox_depth", "actor_type" => actor_type).set(depth as f64);
}

// ============================================================================
// Counters
// ============================================================================

/// Count an inbound event that passed schema validation.
///
/// Metric: `rs_events_total`
/// Labels: `event`
pub fn record_event(event: &'static str) {
    counter!("rs_events_total", "event" => event).increment(1);
}

/// Count a relay message whose target was not in the sender's room.
///
/// Metric: `rs_relay_dropped_total`
/// Labels: `event`
pub fn record_relay_dropped(event: &'static str) {
    counter!("rs_relay_dropped_total", "event" => event).increment(1);
}

/// Count a rejected join.
///
/// Metric: `rs_join_rejected_total`
/// Labels: `reason`
pub fn record_join_rejected(reason: &'static str) {
    counter!("rs_join_rejected_total", "reason" => reason).increment(1);
}

/// Count a handled error.
///
/// Metric: `rs_errors_total`
/// Labels: `error_type`
pub fn record_error(error_type: &'static str) {
    counter!("rs_errors_total", "error_type" => error_type).increment(1);
}

/// Count an actor panic.
///
/// Metric: `rs_actor_panics_total`
/// Labels: `actor_type`
///
/// Any non-zero value indicates a bug.
pub fn record_actor_panic(actor_type: &'static str) {
    counter!("rs_actor_panics_total", "actor_type" => actor_type).increment(1);
}

/// Count a socket closed for missing heartbeats.
///
/// Metric: `rs_heartbeat_timeouts_total`
pub fn record_heartbeat_timeout() {
    counter!("rs_heartbeat_timeouts_total").increment(1);
}

// ============================================================================
// Histograms
// ============================================================================

/// Record inbound event handling latency.
///
/// Metric: `rs_event_latency_seconds`
/// Labels: `event`
pub fn record_event_latency(event: &'static str, duration: Duration) {
    histogram!("rs_event_latency_seconds", "event" => event).record(duration.as_secs_f64());
}
