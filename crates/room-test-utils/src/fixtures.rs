//! Pre-configured test data.

use chrono::Utc;
use common::types::{ConnectionId, RoomId};
use room_protocol::{ChatEntry, ClientEvent, IceCandidateInit, Password, ParticipantSnapshot, SessionDescription};

/// Snapshot with every flag cleared.
pub fn participant(id: ConnectionId, username: &str) -> ParticipantSnapshot {
    ParticipantSnapshot::new(id, username)
}

/// Snapshot marked as the presenter.
pub fn presenter(id: ConnectionId, username: &str) -> ParticipantSnapshot {
    let mut snapshot = ParticipantSnapshot::new(id, username);
    snapshot.is_presenter = true;
    snapshot
}

/// Two ids with a known order, `(lower, higher)`.
pub fn ordered_ids() -> (ConnectionId, ConnectionId) {
    let a = ConnectionId::new();
    let b = ConnectionId::new();
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

pub fn remote_offer(tag: &str) -> SessionDescription {
    SessionDescription::offer(format!("remote-offer-{}", tag))
}

pub fn remote_answer(tag: &str) -> SessionDescription {
    SessionDescription::answer(format!("remote-answer-{}", tag))
}

pub fn candidate(line: &str) -> IceCandidateInit {
    IceCandidateInit::new(format!("candidate:{}", line))
}

pub fn text_entry(username: &str, text: &str) -> ChatEntry {
    ChatEntry::Text {
        username: username.to_string(),
        text: text.to_string(),
        timestamp: Utc::now(),
    }
}

/// Builder for `join-room` events.
#[derive(Debug, Clone)]
pub struct JoinRequestBuilder {
    room_id: String,
    username: String,
    password: Option<String>,
}

impl JoinRequestBuilder {
    pub fn new(room_id: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            username: "tester".to_string(),
            password: None,
        }
    }

    pub fn username(mut self, username: &str) -> Self {
        self.username = username.to_string();
        self
    }

    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn build(self) -> ClientEvent {
        ClientEvent::JoinRoom {
            room_id: RoomId::from(self.room_id.as_str()),
            username: self.username,
            password: self.password.as_deref().map(Password::new),
        }
    }
}
