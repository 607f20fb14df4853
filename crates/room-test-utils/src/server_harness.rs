//! Test server harness for E2E testing
//!
//! Provides `TestRoomServer` for spawning real room service instances in tests.

use room_service::actors::{ActorMetrics, RoomControllerHandle};
use room_service::config::{DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_MAX_UPLOAD_BYTES};
use room_service::transport::{signaling_router, SignalingState, TransportSettings};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Test harness for spawning the room service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_connected_first() -> Result<(), anyhow::Error> {
///     let server = TestRoomServer::spawn().await?;
///     let client = WsTestClient::connect(&server.url()).await?;
///     assert!(client.id().is_some());
///     Ok(())
/// }
/// ```
pub struct TestRoomServer {
    addr: SocketAddr,
    controller: RoomControllerHandle,
    metrics: Arc<ActorMetrics>,
    shutdown: CancellationToken,
    _handle: JoinHandle<()>,
}

impl TestRoomServer {
    /// Default settings for tests: heartbeat slow enough never to fire
    /// during a normal test.
    #[must_use]
    pub fn default_settings() -> TransportSettings {
        TransportSettings {
            heartbeat_interval: Duration::from_secs(60),
            max_missed_heartbeats: 2,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }

    /// Spawn a new test server instance with default settings.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(Self::default_settings()).await
    }

    /// Spawn a new test server instance.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the signaling router in the background
    pub async fn spawn_with(settings: TransportSettings) -> Result<Self, anyhow::Error> {
        let metrics = ActorMetrics::new();
        let controller = RoomControllerHandle::new(Arc::clone(&metrics));
        let shutdown = CancellationToken::new();

        let app = signaling_router(SignalingState {
            controller: controller.clone(),
            metrics: Arc::clone(&metrics),
            settings,
            shutdown: shutdown.clone(),
        });

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        // Spawn server in background
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            controller,
            metrics,
            shutdown,
            _handle: handle,
        })
    }

    /// Get the signaling WebSocket URL.
    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the room controller, for status checks.
    pub fn controller(&self) -> &RoomControllerHandle {
        &self.controller
    }

    pub fn metrics(&self) -> &Arc<ActorMetrics> {
        &self.metrics
    }

    /// Close every open connection from the server side.
    pub fn close_connections(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for TestRoomServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.controller.cancel();
        self._handle.abort();
    }
}
