//! Message types for actor communication.
//!
//! Request/reply messages carry a `respond_to` oneshot; fire-and-forget
//! messages do not.

use crate::errors::RoomError;

use super::connection::ConnectionActorHandle;
use super::room::RoomActorHandle;

use common::secret::SecretString;
use common::types::{ConnectionId, MediaKind, RoomId};
use room_protocol::{
    Attribute, ChatEntry, IceCandidateInit, ParticipantSnapshot, ServerEvent, SessionDescription,
};
use tokio::sync::oneshot;

// ============================================================================
// RoomControllerActor Messages
// ============================================================================

/// Messages sent to the `RoomControllerActor`.
#[derive(Debug)]
pub enum ControllerMessage {
    /// Join (creating if needed) a room.
    JoinRoom {
        connection_id: ConnectionId,
        connection: ConnectionActorHandle,
        room_id: RoomId,
        username: String,
        password: Option<SecretString>,
        respond_to: oneshot::Sender<Result<JoinedRoom, RoomError>>,
    },

    /// Leave whatever room the connection is in. Idempotent.
    LeaveRoom {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<Option<RoomId>>,
    },

    /// Look up a live room.
    GetRoom {
        room_id: RoomId,
        respond_to: oneshot::Sender<Result<RoomInfo, RoomError>>,
    },

    /// Get controller status.
    GetStatus {
        respond_to: oneshot::Sender<ControllerStatus>,
    },

    /// Stop accepting joins and cancel every room.
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Result of a successful join, handed back to the connection.
#[derive(Debug, Clone)]
pub struct JoinedRoom {
    pub room_id: RoomId,
    pub room: RoomActorHandle,
    pub history: Vec<ChatEntry>,
    pub presenter_id: Option<ConnectionId>,
}

/// Summary of a live room.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub participant_count: usize,
    pub message_count: usize,
    pub presenter_id: Option<ConnectionId>,
    pub has_password: bool,
    pub created_at: i64,
}

/// Controller status.
#[derive(Debug, Clone)]
pub struct ControllerStatus {
    pub room_count: usize,
    /// Connections currently registered in a room.
    pub member_count: usize,
    pub is_draining: bool,
    pub mailbox_depth: usize,
}

// ============================================================================
// RoomActor Messages
// ============================================================================

/// Negotiation payload forwarded by the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(IceCandidateInit),
}

impl Signal {
    /// Outbound event as the target sees it.
    #[must_use]
    pub fn into_event(self, from: ConnectionId, kind: MediaKind) -> ServerEvent {
        match self {
            Signal::Offer(offer) => ServerEvent::Offer { from, offer, kind },
            Signal::Answer(answer) => ServerEvent::Answer { from, answer, kind },
            Signal::Candidate(candidate) => ServerEvent::IceCandidate {
                from,
                candidate,
                kind,
            },
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Signal::Offer(_) => "offer",
            Signal::Answer(_) => "answer",
            Signal::Candidate(_) => "ice-candidate",
        }
    }
}

/// A file that passed size and encoding checks.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub file_type: String,
    /// Data URL as sent by the uploader.
    pub file_data: String,
    pub decoded_len: usize,
}

/// Messages sent to a `RoomActor`.
#[derive(Debug)]
pub enum RoomMessage {
    /// Add a participant after the password check.
    Join {
        connection_id: ConnectionId,
        username: String,
        password: Option<SecretString>,
        connection: ConnectionActorHandle,
        respond_to: oneshot::Sender<Result<JoinOutcome, RoomError>>,
    },

    /// Remove a participant. Idempotent.
    Leave {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<LeaveOutcome>,
    },

    SetAttribute {
        connection_id: ConnectionId,
        attribute: Attribute,
        value: bool,
    },

    SetPresenter {
        connection_id: ConnectionId,
        active: bool,
    },

    Chat {
        connection_id: ConnectionId,
        text: String,
    },

    ShareFile {
        connection_id: ConnectionId,
        upload: FileUpload,
        respond_to: oneshot::Sender<Result<(), RoomError>>,
    },

    Typing {
        connection_id: ConnectionId,
        typing: bool,
    },

    Relay {
        from: ConnectionId,
        to: ConnectionId,
        kind: MediaKind,
        signal: Signal,
    },

    StopSharing {
        connection_id: ConnectionId,
    },

    GetState {
        respond_to: oneshot::Sender<RoomState>,
    },
}

/// What a joiner gets back from the room.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub history: Vec<ChatEntry>,
    pub presenter_id: Option<ConnectionId>,
}

/// Result of a leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// False when the connection was not a member.
    pub removed: bool,
    /// Members left in the room afterwards.
    pub remaining: usize,
}

/// Point-in-time copy of a room's state.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room_id: RoomId,
    pub participants: Vec<ParticipantSnapshot>,
    pub presenter_id: Option<ConnectionId>,
    pub messages: Vec<ChatEntry>,
    pub has_password: bool,
}

// ============================================================================
// ConnectionActor Messages
// ============================================================================

/// Messages sent to a `ConnectionActor`.
#[derive(Debug)]
pub enum ConnectionMessage {
    /// Write an event to the socket.
    Deliver { event: ServerEvent },

    /// Write a heartbeat ping frame.
    Heartbeat,

    /// Send a close frame and stop.
    Close { reason: String },

    /// Liveness check of the actor itself.
    Ping { respond_to: oneshot::Sender<()> },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_into_event_keeps_kind_and_sender() {
        let from = ConnectionId::new();

        let offer = Signal::Offer(SessionDescription::offer("v=0"));
        assert_eq!(offer.name(), "offer");
        assert_eq!(
            offer.into_event(from, MediaKind::Video),
            ServerEvent::Offer {
                from,
                offer: SessionDescription::offer("v=0"),
                kind: MediaKind::Video,
            }
        );

        let candidate = Signal::Candidate(IceCandidateInit::new("candidate:7"));
        let event = candidate.into_event(from, MediaKind::Audio);
        assert_eq!(event.name(), "ice-candidate");
    }

    #[test]
    fn test_signal_names_match_wire_events() {
        let from = ConnectionId::new();
        for signal in [
            Signal::Offer(SessionDescription::offer("")),
            Signal::Answer(SessionDescription::answer("")),
            Signal::Candidate(IceCandidateInit::new("")),
        ] {
            let name = signal.name();
            assert_eq!(signal.into_event(from, MediaKind::Audio).name(), name);
        }
    }
}
