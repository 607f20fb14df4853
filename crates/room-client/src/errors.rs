//! Client error types.

use common::types::MediaKind;
use thiserror::Error;

use crate::negotiation::LinkState;

/// Failure inside one peer link.
///
/// Never retried: the link that produced it is torn down and the user has
/// to start sharing again.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NegotiationError {
    /// Operation on a link that was already closed.
    #[error("Peer link is closed")]
    Closed,

    /// Operation not allowed in the link's current state.
    #[error("Cannot {operation} in state {state:?}")]
    InvalidState {
        state: LinkState,
        operation: &'static str,
    },

    /// The media engine rejected a session description.
    #[error("Session description rejected: {0}")]
    Description(String),

    /// The media engine rejected an ICE candidate.
    #[error("ICE candidate rejected: {0}")]
    Candidate(String),

    /// Any other media engine failure (connection object, tracks, ICE).
    #[error("Media engine error: {0}")]
    Engine(String),
}

/// Room client error type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not open the signaling socket.
    #[error("Connect failed: {0}")]
    Connect(String),

    /// Signaling connection is gone.
    #[error("Signaling connection closed")]
    Closed,

    /// Frame failed to encode or decode.
    #[error("Protocol error: {0}")]
    Protocol(#[from] room_protocol::ProtocolError),

    /// File exceeds the local upload cap; nothing was sent.
    #[error("Upload too large: {size} bytes exceeds {limit}")]
    UploadTooLarge { size: usize, limit: usize },

    /// Server refused the file or the acknowledgement never arrived.
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// Local capture of the given kind failed or is unavailable.
    #[error("Media capture failed for {kind}: {reason}")]
    Media { kind: MediaKind, reason: String },

    /// Event needs a joined room.
    #[error("Not in a room")]
    NotInRoom,

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
}
