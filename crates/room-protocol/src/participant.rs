//! Presence snapshot entries.

use common::types::ConnectionId;
use serde::{Deserialize, Serialize};

/// One participant as seen in a `participants-sync` broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSnapshot {
    pub id: ConnectionId,
    pub username: String,
    pub is_muted: bool,
    pub is_deafened: bool,
    pub is_speaking: bool,
    pub is_presenter: bool,
}

impl ParticipantSnapshot {
    /// Fresh participant with every flag cleared.
    #[must_use]
    pub fn new(id: ConnectionId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            is_muted: false,
            is_deafened: false,
            is_speaking: false,
            is_presenter: false,
        }
    }

    /// Apply an attribute change in place.
    pub fn set(&mut self, attribute: Attribute, value: bool) {
        match attribute {
            Attribute::Muted => self.is_muted = value,
            Attribute::Deafened => self.is_deafened = value,
            Attribute::Speaking => self.is_speaking = value,
        }
    }

    #[must_use]
    pub fn get(&self, attribute: Attribute) -> bool {
        match attribute {
            Attribute::Muted => self.is_muted,
            Attribute::Deafened => self.is_deafened,
            Attribute::Speaking => self.is_speaking,
        }
    }
}

/// Participant flags a connection may toggle on itself.
///
/// `isPresenter` is not listed: it is governed by the presenter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Muted,
    Deafened,
    Speaking,
}

impl Attribute {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Attribute::Muted => "is_muted",
            Attribute::Deafened => "is_deafened",
            Attribute::Speaking => "is_speaking",
        }
    }
}
