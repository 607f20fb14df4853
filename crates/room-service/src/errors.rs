//! Room service error types.
//!
//! Internal details are logged server-side but not exposed to clients;
//! `client_message()` is the only text that goes on the wire.

use common::types::{ConnectionId, RoomId};
use thiserror::Error;

/// Reason string sent in `join-error` for a password mismatch.
pub const WRONG_PASSWORD_MESSAGE: &str = "Yanlış şifre!";

/// Room service error type.
///
/// Error codes:
/// - `Protocol`, `UploadFailed`: `INVALID_REQUEST` (1)
/// - `WrongPassword`: `UNAUTHORIZED` (2)
/// - `NotInRoom`, `RoomNotFound`, `PeerUnreachable`: `NOT_FOUND` (4)
/// - `Internal`, `Transport`: `INTERNAL_ERROR` (6)
/// - `UploadTooLarge`, `Draining`: `CAPACITY_EXCEEDED` (7)
#[derive(Debug, Error)]
pub enum RoomError {
    /// Supplied password does not match the room's.
    #[error("Wrong room password")]
    WrongPassword,

    /// Event needs room membership the connection does not have.
    #[error("Connection {0} is not in a room")]
    NotInRoom(ConnectionId),

    /// No live room with this id.
    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),

    /// Relay target is not a member of the sender's room.
    #[error("Peer unreachable: {0}")]
    PeerUnreachable(ConnectionId),

    /// Shared file exceeds the configured limit.
    #[error("Upload too large: {size} bytes exceeds {limit}")]
    UploadTooLarge { size: usize, limit: usize },

    /// Shared file could not be accepted.
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// Inbound frame failed schema validation.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Socket level failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Service is shutting down and no longer accepts joins.
    #[error("Room service is draining")]
    Draining,

    /// Internal error with context.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RoomError {
    /// Returns the numeric error code for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            RoomError::Protocol(_) | RoomError::UploadFailed(_) => 1, // INVALID_REQUEST
            RoomError::WrongPassword => 2,                             // UNAUTHORIZED
            RoomError::NotInRoom(_)
            | RoomError::RoomNotFound(_)
            | RoomError::PeerUnreachable(_) => 4, // NOT_FOUND
            RoomError::Internal(_) | RoomError::Transport(_) => 6,     // INTERNAL_ERROR
            RoomError::UploadTooLarge { .. } | RoomError::Draining => 7, // CAPACITY_EXCEEDED
        }
    }

    /// Bounded label for the `rs_errors_total` metric.
    #[must_use]
    pub const fn error_type_label(&self) -> &'static str {
        match self {
            RoomError::WrongPassword => "wrong_password",
            RoomError::NotInRoom(_) => "not_in_room",
            RoomError::RoomNotFound(_) => "room_not_found",
            RoomError::PeerUnreachable(_) => "peer_unreachable",
            RoomError::UploadTooLarge { .. } => "upload_too_large",
            RoomError::UploadFailed(_) => "upload_failed",
            RoomError::Protocol(_) => "protocol",
            RoomError::Transport(_) => "transport",
            RoomError::Draining => "draining",
            RoomError::Internal(_) => "internal",
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RoomError::WrongPassword => WRONG_PASSWORD_MESSAGE.to_string(),
            RoomError::NotInRoom(_) => "You are not in a room".to_string(),
            RoomError::RoomNotFound(_) => "Room not found".to_string(),
            RoomError::PeerUnreachable(_) => "Peer is not connected".to_string(),
            RoomError::UploadTooLarge { limit, .. } => {
                format!("File exceeds the {} MB limit", limit / (1024 * 1024))
            }
            RoomError::UploadFailed(reason) => format!("Upload failed: {reason}"),
            RoomError::Protocol(_) => "Malformed message".to_string(),
            RoomError::Draining => "Server is shutting down, please reconnect".to_string(),
            RoomError::Transport(_) | RoomError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }
}
