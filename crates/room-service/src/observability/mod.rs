//! Observability for the room service.
//!
//! # Privacy by Default
//!
//! Actor loops use `#[instrument(skip_all)]` with an explicit field list.
//! Room passwords, chat text and file contents never reach logs or labels;
//! only their lengths do.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `rs_connections_active` | Gauge | none | Open signaling sockets |
//! | `rs_rooms_active` | Gauge | none | Live rooms |
//! | `rs_participants_active` | Gauge | none | Participants across rooms |
//! | `rs_actor_mailbox_depth` | Gauge | `actor_type` | Backpressure indicator |
//! | `rs_events_total` | Counter | `event` | Inbound events accepted |
//! | `rs_relay_dropped_total` | Counter | `event` | Relay targets not reachable |
//! | `rs_join_rejected_total` | Counter | `reason` | Failed joins |
//! | `rs_errors_total` | Counter | `error_type` | Handled errors |
//! | `rs_heartbeat_timeouts_total` | Counter | none | Sockets dropped for silence |
//! | `rs_event_latency_seconds` | Histogram | `event` | Inbound event handling time |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;
