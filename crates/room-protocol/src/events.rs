//! Client and server event unions.
//!
//! Event names are kebab-case and payload fields camelCase on the wire.
//! Unit variants carry no `data` field.

use crate::chat::{ChatEntry, FileShareAck};
use crate::participant::{Attribute, ParticipantSnapshot};
use crate::signal::{IceCandidateInit, SessionDescription};

use common::secret::{ExposeSecret, SecretString};
use common::types::{ConnectionId, MediaKind, RoomId};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Room password as typed by the joiner.
///
/// Redacted in `Debug`; serializes as a plain string.
#[derive(Clone)]
pub struct Password(SecretString);

impl Password {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    #[must_use]
    pub fn into_secret(self) -> SecretString {
        self.0
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

impl PartialEq for Password {
    fn eq(&self, other: &Self) -> bool {
        common::secret::secret_matches(&self.0, other.expose())
    }
}

impl Serialize for Password {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.expose())
    }
}

impl<'de> Deserialize<'de> for Password {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        SecretString::deserialize(deserializer).map(Self)
    }
}

/// Everything a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    JoinRoom {
        room_id: RoomId,
        username: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<Password>,
    },
    LeaveRoom,
    ChatMessage {
        /// Ignored by the server, which uses the name registered at join.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        text: String,
    },
    FileShare {
        file_name: String,
        file_type: String,
        file_data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<RoomId>,
    },
    MicMuted,
    MicUnmuted,
    SpeakerMuted,
    SpeakerUnmuted,
    SpeakingStart,
    SpeakingStop,
    PresenterStart,
    PresenterStop,
    TypingStart,
    TypingStop,
    Offer {
        to: ConnectionId,
        offer: SessionDescription,
        #[serde(rename = "type")]
        kind: MediaKind,
    },
    Answer {
        to: ConnectionId,
        answer: SessionDescription,
        #[serde(rename = "type")]
        kind: MediaKind,
    },
    IceCandidate {
        to: ConnectionId,
        candidate: IceCandidateInit,
        #[serde(rename = "type")]
        kind: MediaKind,
    },
    StopSharing {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<RoomId>,
    },
}

impl ClientEvent {
    /// Wire name of the event, also a bounded metric label.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom { .. } => "join-room",
            ClientEvent::LeaveRoom => "leave-room",
            ClientEvent::ChatMessage { .. } => "chat-message",
            ClientEvent::FileShare { .. } => "file-share",
            ClientEvent::MicMuted => "mic-muted",
            ClientEvent::MicUnmuted => "mic-unmuted",
            ClientEvent::SpeakerMuted => "speaker-muted",
            ClientEvent::SpeakerUnmuted => "speaker-unmuted",
            ClientEvent::SpeakingStart => "speaking-start",
            ClientEvent::SpeakingStop => "speaking-stop",
            ClientEvent::PresenterStart => "presenter-start",
            ClientEvent::PresenterStop => "presenter-stop",
            ClientEvent::TypingStart => "typing-start",
            ClientEvent::TypingStop => "typing-stop",
            ClientEvent::Offer { .. } => "offer",
            ClientEvent::Answer { .. } => "answer",
            ClientEvent::IceCandidate { .. } => "ice-candidate",
            ClientEvent::StopSharing { .. } => "stop-sharing",
        }
    }

    /// Attribute toggle carried by this event, if it is one.
    #[must_use]
    pub const fn attribute_change(&self) -> Option<(Attribute, bool)> {
        match self {
            ClientEvent::MicMuted => Some((Attribute::Muted, true)),
            ClientEvent::MicUnmuted => Some((Attribute::Muted, false)),
            ClientEvent::SpeakerMuted => Some((Attribute::Deafened, true)),
            ClientEvent::SpeakerUnmuted => Some((Attribute::Deafened, false)),
            ClientEvent::SpeakingStart => Some((Attribute::Speaking, true)),
            ClientEvent::SpeakingStop => Some((Attribute::Speaking, false)),
            _ => None,
        }
    }
}

/// Everything the server may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// First frame on every socket: the id this connection is addressed by.
    Connected {
        id: ConnectionId,
    },
    JoinSuccess {
        room_id: RoomId,
    },
    JoinError(String),
    ChatHistory(Vec<ChatEntry>),
    ChatMessage(ChatEntry),
    FileShare(ChatEntry),
    FileShareAck(FileShareAck),
    ParticipantsSync(Vec<ParticipantSnapshot>),
    UserJoined {
        id: ConnectionId,
        username: String,
    },
    UserLeft {
        id: ConnectionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },
    MicMuted {
        id: ConnectionId,
    },
    MicUnmuted {
        id: ConnectionId,
    },
    SpeakerMuted {
        id: ConnectionId,
    },
    SpeakerUnmuted {
        id: ConnectionId,
    },
    SpeakingStart {
        id: ConnectionId,
    },
    SpeakingStop {
        id: ConnectionId,
    },
    PresenterStart {
        id: ConnectionId,
    },
    PresenterStop {
        id: ConnectionId,
    },
    ExistingPresenter {
        presenter_id: ConnectionId,
    },
    UserTyping {
        user_id: ConnectionId,
    },
    UserStoppedTyping {
        user_id: ConnectionId,
    },
    Offer {
        from: ConnectionId,
        offer: SessionDescription,
        #[serde(rename = "type")]
        kind: MediaKind,
    },
    Answer {
        from: ConnectionId,
        answer: SessionDescription,
        #[serde(rename = "type")]
        kind: MediaKind,
    },
    IceCandidate {
        from: ConnectionId,
        candidate: IceCandidateInit,
        #[serde(rename = "type")]
        kind: MediaKind,
    },
    StopSharing {
        from: ConnectionId,
    },
    LeftRoom,
}

impl ServerEvent {
    /// Notice sent to the rest of the room after an attribute toggle.
    #[must_use]
    pub const fn attribute_notice(attribute: Attribute, value: bool, id: ConnectionId) -> Self {
        match (attribute, value) {
            (Attribute::Muted, true) => ServerEvent::MicMuted { id },
            (Attribute::Muted, false) => ServerEvent::MicUnmuted { id },
            (Attribute::Deafened, true) => ServerEvent::SpeakerMuted { id },
            (Attribute::Deafened, false) => ServerEvent::SpeakerUnmuted { id },
            (Attribute::Speaking, true) => ServerEvent::SpeakingStart { id },
            (Attribute::Speaking, false) => ServerEvent::SpeakingStop { id },
        }
    }

    /// Wire name of the event, also a bounded metric label.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::JoinSuccess { .. } => "join-success",
            ServerEvent::JoinError(_) => "join-error",
            ServerEvent::ChatHistory(_) => "chat-history",
            ServerEvent::ChatMessage(_) => "chat-message",
            ServerEvent::FileShare(_) => "file-share",
            ServerEvent::FileShareAck(_) => "file-share-ack",
            ServerEvent::ParticipantsSync(_) => "participants-sync",
            ServerEvent::UserJoined { .. } => "user-joined",
            ServerEvent::UserLeft { .. } => "user-left",
            ServerEvent::MicMuted { .. } => "mic-muted",
            ServerEvent::MicUnmuted { .. } => "mic-unmuted",
            ServerEvent::SpeakerMuted { .. } => "speaker-muted",
            ServerEvent::SpeakerUnmuted { .. } => "speaker-unmuted",
            ServerEvent::SpeakingStart { .. } => "speaking-start",
            ServerEvent::SpeakingStop { .. } => "speaking-stop",
            ServerEvent::PresenterStart { .. } => "presenter-start",
            ServerEvent::PresenterStop { .. } => "presenter-stop",
            ServerEvent::ExistingPresenter { .. } => "existing-presenter",
            ServerEvent::UserTyping { .. } => "user-typing",
            ServerEvent::UserStoppedTyping { .. } => "user-stopped-typing",
            ServerEvent::Offer { .. } => "offer",
            ServerEvent::Answer { .. } => "answer",
            ServerEvent::IceCandidate { .. } => "ice-candidate",
            ServerEvent::StopSharing { .. } => "stop-sharing",
            ServerEvent::LeftRoom => "left-room",
        }
    }
}
