//! Room Service
//!
//! Presence, chat and WebRTC signaling relay.
//!
//! # Servers
//!
//! - WebSocket signaling server (default: 0.0.0.0:3001, path `/ws`)
//! - HTTP server for health endpoints and metrics (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Initialize actor system (`RoomControllerHandle`)
//! 4. Start health HTTP server (liveness, readiness, status, metrics)
//! 5. Start signaling server, then mark ready
//! 6. Wait for shutdown signal, drain, exit

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use room_service::actors::{ActorMetrics, RoomControllerHandle};
use room_service::config::Config;
use room_service::observability::{health_router, init_metrics_recorder, HealthState};
use room_service::transport::{signaling_router, SignalingState, TransportSettings};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "room_service=debug,rs=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Room Service");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        health_bind_address = %config.health_bind_address,
        heartbeat_interval_seconds = config.heartbeat_interval_seconds,
        max_missed_heartbeats = config.max_missed_heartbeats,
        max_upload_bytes = config.max_upload_bytes,
        max_message_bytes = config.max_message_bytes,
        "Configuration loaded successfully"
    );

    info!("Initializing Prometheus metrics recorder...");
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    info!("Initializing actor system...");
    let actor_metrics = ActorMetrics::new();
    let controller = RoomControllerHandle::new(Arc::clone(&actor_metrics));
    let health_state = Arc::new(HealthState::new(Arc::clone(&actor_metrics)));

    // Independent of the controller token so sockets can close while rooms
    // still answer leaves.
    let shutdown_token = tokio_util::sync::CancellationToken::new();

    // Health server (MUST bind - fail startup if it doesn't)
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );
    let health_app = health_router(Arc::clone(&health_state)).merge(metrics_router);

    let health_listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;
    info!(addr = %health_addr, "Health server bound successfully");

    let health_shutdown_token = shutdown_token.child_token();
    let health_task = tokio::spawn(async move {
        let server = axum::serve(health_listener, health_app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    // Signaling server
    let signaling_addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid signaling bind address");
        format!("Invalid signaling bind address: {e}")
    })?;

    let connection_token = shutdown_token.child_token();
    let signaling_app = signaling_router(SignalingState {
        controller: controller.clone(),
        metrics: Arc::clone(&actor_metrics),
        settings: TransportSettings::from(&config),
        shutdown: connection_token.clone(),
    })
    .layer(TraceLayer::new_for_http());

    let signaling_listener = tokio::net::TcpListener::bind(signaling_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %signaling_addr, "Failed to bind signaling server");
            format!("Failed to bind signaling server to {signaling_addr}: {e}")
        })?;
    info!(addr = %signaling_addr, "Signaling server bound successfully");

    let signaling_shutdown_token = shutdown_token.child_token();
    let signaling_task = tokio::spawn(async move {
        let server = axum::serve(signaling_listener, signaling_app).with_graceful_shutdown(
            async move {
                signaling_shutdown_token.cancelled().await;
                info!("Signaling server shutting down");
            },
        );
        if let Err(e) = server.await {
            error!(error = %e, "Signaling server failed");
        }
    });

    health_state.set_ready();
    info!("Room Service running - press Ctrl+C to shutdown");

    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so load balancers stop sending traffic
    health_state.set_not_ready();

    // Close every socket with a going-away frame. Rooms stay up until the
    // sockets have left them.
    connection_token.cancel();

    let grace = Duration::from_secs(config.shutdown_grace_seconds);
    if tokio::time::timeout(grace, wait_for_connections(&actor_metrics))
        .await
        .is_err()
    {
        warn!(
            remaining = actor_metrics.connection_count(),
            "Connections still open after grace period"
        );
    }

    if let Err(e) = controller.shutdown().await {
        warn!(error = %e, "Actor system shutdown error");
    }

    shutdown_token.cancel();
    for (name, task) in [("signaling", signaling_task), ("health", health_task)] {
        if tokio::time::timeout(grace, task).await.is_err() {
            warn!(server = name, "Server did not stop in time");
        }
    }

    info!("Room Service shutdown complete");
    Ok(())
}

async fn wait_for_connections(metrics: &ActorMetrics) {
    while metrics.connection_count() > 0 {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(clippy::expect_used, reason = "Signal handler installation failure is unrecoverable")]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(clippy::expect_used, reason = "Signal handler installation failure is unrecoverable")]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
