//! # Room Test Utilities
//!
//! Shared test utilities for the room service and the room client.
//!
//! This crate provides:
//! - Server test harness (`TestRoomServer` for E2E tests)
//! - Raw WebSocket test client (`WsTestClient`)
//! - Scriptable media engine (`MockPeerConnection`, `MockPeerConnectionFactory`,
//!   `MockMediaSource`)
//! - Fixtures (participants, session descriptions, candidates)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use room_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let server = TestRoomServer::spawn().await?;
//!     let mut alice = WsTestClient::connect(&server.url()).await?;
//!
//!     alice.join("R1", "alice", None).await?;
//!     alice.expect_join_success().await?;
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod mock_peer;
pub mod server_harness;
pub mod ws_client;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_peer::*;
pub use server_harness::*;
pub use ws_client::*;
