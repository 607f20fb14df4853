//! Room Service Library
//!
//! Presence, chat and WebRTC signaling relay for Huddle rooms:
//!
//! - Room membership with an optional creator-set password
//! - Participant attribute sync (muted, deafened, speaking, presenter)
//! - Chat log with history replay and file sharing
//! - Point-to-point relay of offers, answers and ICE candidates
//!
//! Media never passes through the service; it only forwards the messages
//! peers need to negotiate direct connections.
//!
//! # Architecture
//!
//! ```text
//! RoomControllerActor (singleton)
//! └── RoomActor (one per live room)
//!     └── ConnectionActor (one per WebSocket)
//! ```
//!
//! # Modules
//!
//! - [`actors`] - Actor model implementation
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with client-safe messages
//! - [`handlers`] - Client event dispatch
//! - [`observability`] - Health endpoints and metrics
//! - [`transport`] - WebSocket endpoint and heartbeat
//! - [`upload`] - Shared file validation

#![warn(clippy::pedantic)]

pub mod actors;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod observability;
pub mod transport;
pub mod upload;
