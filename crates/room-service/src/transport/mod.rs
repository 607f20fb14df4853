//! Client-facing signaling transport.
//!
//! - [`ws`] - axum WebSocket endpoint and per-connection read loop
//! - [`heartbeat`] - ping/miss accounting for idle sockets

pub mod heartbeat;
pub mod ws;

pub use heartbeat::{HeartbeatAction, HeartbeatMonitor};
pub use ws::{run_connection, signaling_router, SignalingState, TransportSettings};
