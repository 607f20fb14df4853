//! Client-side projection of the room.
//!
//! Participants are replaced wholesale by every `participants-sync`; the
//! view never patches them from the individual notices, which only matter
//! for typing and presenter hints.

use common::types::{ConnectionId, RoomId};
use room_protocol::{ChatEntry, ParticipantSnapshot, ServerEvent};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct RoomView {
    local_id: Option<ConnectionId>,
    room_id: Option<RoomId>,
    participants: Vec<ParticipantSnapshot>,
    chat: Vec<ChatEntry>,
    typing: BTreeSet<ConnectionId>,
    presenter: Option<ConnectionId>,
    last_error: Option<String>,
}

impl RoomView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one server event into the view.
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::Connected { id } => self.local_id = Some(*id),
            ServerEvent::JoinSuccess { room_id } => {
                self.room_id = Some(room_id.clone());
                self.last_error = None;
            }
            ServerEvent::JoinError(reason) => {
                self.reset_room();
                self.last_error = Some(reason.clone());
            }
            ServerEvent::ChatHistory(entries) => self.chat.clone_from(entries),
            ServerEvent::ChatMessage(entry) | ServerEvent::FileShare(entry) => {
                self.chat.push(entry.clone());
            }
            ServerEvent::ParticipantsSync(participants) => {
                self.participants.clone_from(participants);
                self.presenter = participants.iter().find(|p| p.is_presenter).map(|p| p.id);
                self.typing
                    .retain(|id| participants.iter().any(|p| p.id == *id));
            }
            ServerEvent::UserLeft { id, .. } => {
                self.typing.remove(id);
                if self.presenter == Some(*id) {
                    self.presenter = None;
                }
            }
            ServerEvent::PresenterStart { id } => self.presenter = Some(*id),
            ServerEvent::ExistingPresenter { presenter_id } => self.presenter = Some(*presenter_id),
            ServerEvent::PresenterStop { id } => {
                if self.presenter == Some(*id) {
                    self.presenter = None;
                }
            }
            ServerEvent::UserTyping { user_id } => {
                self.typing.insert(*user_id);
            }
            ServerEvent::UserStoppedTyping { user_id } => {
                self.typing.remove(user_id);
            }
            ServerEvent::LeftRoom => self.reset_room(),
            _ => {}
        }
    }

    /// Show a locally sent entry before the server echoes anything.
    pub fn push_local(&mut self, entry: ChatEntry) {
        self.chat.push(entry);
    }

    #[must_use]
    pub fn local_id(&self) -> Option<ConnectionId> {
        self.local_id
    }

    #[must_use]
    pub fn room_id(&self) -> Option<&RoomId> {
        self.room_id.as_ref()
    }

    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.room_id.is_some()
    }

    #[must_use]
    pub fn participants(&self) -> &[ParticipantSnapshot] {
        &self.participants
    }

    #[must_use]
    pub fn participant(&self, id: ConnectionId) -> Option<&ParticipantSnapshot> {
        self.participants.iter().find(|p| p.id == id)
    }

    /// Our own entry in the latest snapshot.
    #[must_use]
    pub fn me(&self) -> Option<&ParticipantSnapshot> {
        self.local_id.and_then(|id| self.participant(id))
    }

    #[must_use]
    pub fn chat(&self) -> &[ChatEntry] {
        &self.chat
    }

    #[must_use]
    pub fn typing(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.typing.iter().copied()
    }

    #[must_use]
    pub fn is_typing(&self, id: ConnectionId) -> bool {
        self.typing.contains(&id)
    }

    #[must_use]
    pub fn presenter(&self) -> Option<ConnectionId> {
        self.presenter
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn reset_room(&mut self) {
        self.room_id = None;
        self.participants.clear();
        self.chat.clear();
        self.typing.clear();
        self.presenter = None;
    }
}
