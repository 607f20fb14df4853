//! Health endpoints for the room service.
//!
//! - `GET /health` - Liveness probe (is the process running?)
//! - `GET /ready` - Readiness probe (are joins being accepted?)
//! - `GET /status` - JSON counts of rooms, connections and participants
//!
//! The `/metrics` endpoint is served separately via `metrics-exporter-prometheus`.

use crate::actors::ActorMetrics;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Health state for the room service.
#[derive(Debug)]
pub struct HealthState {
    /// False until the signaling listener is bound, and again once draining.
    ready: AtomicBool,
    metrics: Arc<ActorMetrics>,
}

impl HealthState {
    /// Create a new health state (not ready).
    #[must_use]
    pub fn new(metrics: Arc<ActorMetrics>) -> Self {
        Self {
            ready: AtomicBool::new(false),
            metrics,
        }
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Body of `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub ready: bool,
    pub rooms: usize,
    pub connections: usize,
    pub participants: usize,
}

/// Create the health router with liveness, readiness and status endpoints.
pub fn health_router(health_state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .route("/status", get(status_handler))
        .with_state(health_state)
}

async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

async fn readiness_handler(State(state): State<Arc<HealthState>>) -> StatusCode {
    if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn status_handler(State(state): State<Arc<HealthState>>) -> Json<StatusBody> {
    Json(StatusBody {
        ready: state.is_ready(),
        rooms: state.metrics.room_count(),
        connections: state.metrics.connection_count(),
        participants: state.metrics.participant_count(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    fn state() -> Arc<HealthState> {
        Arc::new(HealthState::new(ActorMetrics::new()))
    }

    async fn get_status(app: Router, uri: &str) -> axum::response::Response {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("Failed to build request");
        app.oneshot(request).await.expect("Failed to execute request")
    }

    #[test]
    fn test_health_state_transitions() {
        let state = state();
        assert!(!state.is_ready(), "Should not be ready by default");

        state.set_ready();
        assert!(state.is_ready());

        state.set_not_ready();
        assert!(!state.is_ready());
    }

    #[tokio::test]
    async fn test_liveness_always_ok() {
        let response = get_status(health_router(state()), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readiness_follows_state() {
        let state = state();
        let response = get_status(health_router(Arc::clone(&state)), "/ready").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.set_ready();
        let response = get_status(health_router(state), "/ready").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_reports_counts() {
        let metrics = ActorMetrics::new();
        metrics.room_created();
        metrics.connection_opened();
        metrics.connection_opened();
        metrics.participant_joined();
        let state = Arc::new(HealthState::new(metrics));
        state.set_ready();

        let response = get_status(health_router(state), "/status").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"ready": true, "rooms": 1, "connections": 2, "participants": 1})
        );
    }

    #[tokio::test]
    async fn test_unknown_path_returns_404() {
        let response = get_status(health_router(state()), "/nope").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
