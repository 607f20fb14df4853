//! `RoomActor` - per-room actor that owns presence and chat state.
//!
//! Each `RoomActor`:
//! - Owns the member map, the presenter slot, and the chat log for one room
//! - Fans events out to member `ConnectionActor`s with `try_send`
//! - Relays offers, answers, and ICE candidates between members
//!
//! Every mutation that changes a participant attribute ends up in exactly one
//! full `participants-sync`, so a client that only applies snapshots still
//! converges. Presenter changes send their notices before the sync;
//! mute/deafen/speaking toggles send the sync first.
//!
//! The room lives as long as it has members; the controller removes it when
//! the last one leaves.

use crate::errors::RoomError;
use crate::observability::metrics as prom;

use super::connection::ConnectionActorHandle;
use super::messages::{
    FileUpload, JoinOutcome, LeaveOutcome, RoomMessage, RoomState, Signal,
};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use chrono::Utc;
use common::secret::{secret_matches, ExposeSecret, SecretString};
use common::types::{ConnectionId, MediaKind, RoomId};
use room_protocol::{Attribute, ChatEntry, ParticipantSnapshot, ServerEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Default channel buffer size for the room mailbox.
const ROOM_CHANNEL_BUFFER: usize = 500;

/// Handle to a `RoomActor`.
#[derive(Clone, Debug)]
pub struct RoomActorHandle {
    sender: mpsc::Sender<RoomMessage>,
    cancel_token: CancellationToken,
    room_id: RoomId,
    mailbox: Arc<MailboxMonitor>,
}

impl RoomActorHandle {
    #[must_use]
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Add a connection to the room.
    ///
    /// Fails with `WrongPassword` if the room is protected and the supplied
    /// password does not match.
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        username: String,
        password: Option<SecretString>,
        connection: ConnectionActorHandle,
    ) -> Result<JoinOutcome, RoomError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(RoomMessage::Join {
            connection_id,
            username,
            password,
            connection,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| RoomError::Internal(format!("response receive failed: {e}")))?
    }

    /// Remove a connection from the room.
    pub async fn leave(&self, connection_id: ConnectionId) -> Result<LeaveOutcome, RoomError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(RoomMessage::Leave {
            connection_id,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| RoomError::Internal(format!("response receive failed: {e}")))
    }

    pub async fn set_attribute(
        &self,
        connection_id: ConnectionId,
        attribute: Attribute,
        value: bool,
    ) -> Result<(), RoomError> {
        self.send(RoomMessage::SetAttribute {
            connection_id,
            attribute,
            value,
        })
        .await
    }

    pub async fn set_presenter(
        &self,
        connection_id: ConnectionId,
        active: bool,
    ) -> Result<(), RoomError> {
        self.send(RoomMessage::SetPresenter {
            connection_id,
            active,
        })
        .await
    }

    pub async fn chat(&self, connection_id: ConnectionId, text: String) -> Result<(), RoomError> {
        self.send(RoomMessage::Chat {
            connection_id,
            text,
        })
        .await
    }

    /// Record a validated upload and broadcast it to the other members.
    pub async fn share_file(
        &self,
        connection_id: ConnectionId,
        upload: FileUpload,
    ) -> Result<(), RoomError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(RoomMessage::ShareFile {
            connection_id,
            upload,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| RoomError::Internal(format!("response receive failed: {e}")))?
    }

    pub async fn typing(&self, connection_id: ConnectionId, typing: bool) -> Result<(), RoomError> {
        self.send(RoomMessage::Typing {
            connection_id,
            typing,
        })
        .await
    }

    /// Forward a negotiation message to another member.
    pub async fn relay(
        &self,
        from: ConnectionId,
        to: ConnectionId,
        kind: MediaKind,
        signal: Signal,
    ) -> Result<(), RoomError> {
        self.send(RoomMessage::Relay {
            from,
            to,
            kind,
            signal,
        })
        .await
    }

    pub async fn stop_sharing(&self, connection_id: ConnectionId) -> Result<(), RoomError> {
        self.send(RoomMessage::StopSharing { connection_id }).await
    }

    /// Get a copy of the room state.
    pub async fn get_state(&self) -> Result<RoomState, RoomError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(RoomMessage::GetState { respond_to: tx }).await?;

        rx.await
            .map_err(|e| RoomError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn send(&self, message: RoomMessage) -> Result<(), RoomError> {
        self.sender
            .send(message)
            .await
            .map_err(|e| RoomError::Internal(format!("channel send failed: {e}")))?;
        self.mailbox.record_enqueue();
        Ok(())
    }
}

/// A member of the room.
struct Member {
    snapshot: ParticipantSnapshot,
    connection: ConnectionActorHandle,
    /// Join order, used to keep snapshots stable.
    joined_seq: u64,
}

/// The `RoomActor` implementation.
pub struct RoomActor {
    room_id: RoomId,
    receiver: mpsc::Receiver<RoomMessage>,
    /// Cancellation token (child of the controller's token).
    cancel_token: CancellationToken,
    /// Fixed by whoever created the room. `None` means open.
    password: Option<SecretString>,
    members: HashMap<ConnectionId, Member>,
    next_seq: u64,
    /// At most one presenter per room.
    presenter_id: Option<ConnectionId>,
    /// Append-only chat log, replayed to every joiner.
    messages: Vec<ChatEntry>,
    metrics: Arc<ActorMetrics>,
    mailbox: Arc<MailboxMonitor>,
}

impl RoomActor {
    /// Spawn a new room actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        room_id: RoomId,
        password: Option<SecretString>,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> (RoomActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ROOM_CHANNEL_BUFFER);
        let mailbox = MailboxMonitor::new(ActorType::Room, room_id.as_str());

        let actor = Self {
            room_id: room_id.clone(),
            receiver,
            cancel_token: cancel_token.clone(),
            password,
            members: HashMap::new(),
            next_seq: 0,
            presenter_id: None,
            messages: Vec::new(),
            metrics,
            mailbox: Arc::clone(&mailbox),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomActorHandle {
            sender,
            cancel_token,
            room_id,
            mailbox,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "rs.actor.room", fields(room_id = %self.room_id))]
    async fn run(mut self) {
        info!(
            target: "rs.actor.room",
            room_id = %self.room_id,
            protected = self.password.is_some(),
            "RoomActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "rs.actor.room",
                        room_id = %self.room_id,
                        "RoomActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    let Some(message) = msg else {
                        info!(
                            target: "rs.actor.room",
                            room_id = %self.room_id,
                            "RoomActor channel closed, exiting"
                        );
                        break;
                    };

                    self.handle_message(message);
                    self.mailbox.record_dequeue();
                    self.metrics.record_message_processed();
                }
            }
        }

        info!(
            target: "rs.actor.room",
            room_id = %self.room_id,
            members = self.members.len(),
            chat_entries = self.messages.len(),
            messages_processed = self.mailbox.messages_processed(),
            "RoomActor stopped"
        );
    }

    fn handle_message(&mut self, message: RoomMessage) {
        match message {
            RoomMessage::Join {
                connection_id,
                username,
                password,
                connection,
                respond_to,
            } => {
                let result = self.handle_join(connection_id, username, password.as_ref(), connection);
                let _ = respond_to.send(result);
            }

            RoomMessage::Leave {
                connection_id,
                respond_to,
            } => {
                let outcome = self.handle_leave(connection_id);
                let _ = respond_to.send(outcome);
            }

            RoomMessage::SetAttribute {
                connection_id,
                attribute,
                value,
            } => self.handle_set_attribute(connection_id, attribute, value),

            RoomMessage::SetPresenter {
                connection_id,
                active: true,
            } => {
                self.promote_presenter(connection_id);
            }

            RoomMessage::SetPresenter {
                connection_id,
                active: false,
            } => self.handle_presenter_stop(connection_id),

            RoomMessage::Chat {
                connection_id,
                text,
            } => self.handle_chat(connection_id, text),

            RoomMessage::ShareFile {
                connection_id,
                upload,
                respond_to,
            } => {
                let result = self.handle_share_file(connection_id, upload);
                let _ = respond_to.send(result);
            }

            RoomMessage::Typing {
                connection_id,
                typing,
            } => self.handle_typing(connection_id, typing),

            RoomMessage::Relay {
                from,
                to,
                kind,
                signal,
            } => self.handle_relay(from, to, kind, signal),

            RoomMessage::StopSharing { connection_id } => {
                if self.members.contains_key(&connection_id) {
                    self.broadcast_except(connection_id, &ServerEvent::StopSharing {
                        from: connection_id,
                    });
                }
            }

            RoomMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.get_state());
            }
        }
    }

    fn handle_join(
        &mut self,
        connection_id: ConnectionId,
        username: String,
        password: Option<&SecretString>,
        connection: ConnectionActorHandle,
    ) -> Result<JoinOutcome, RoomError> {
        if let Some(stored) = &self.password {
            let accepted =
                password.is_some_and(|candidate| secret_matches(stored, candidate.expose_secret()));
            if !accepted {
                info!(
                    target: "rs.actor.room",
                    room_id = %self.room_id,
                    connection_id = %connection_id,
                    "Join rejected: wrong password"
                );
                return Err(RoomError::WrongPassword);
            }
        }

        self.next_seq += 1;
        let snapshot = ParticipantSnapshot::new(connection_id, username.clone());
        self.members.insert(
            connection_id,
            Member {
                snapshot,
                connection,
                joined_seq: self.next_seq,
            },
        );

        self.send_to(connection_id, ServerEvent::ChatHistory(self.messages.clone()));
        self.send_to(
            connection_id,
            ServerEvent::JoinSuccess {
                room_id: self.room_id.clone(),
            },
        );
        self.broadcast_except(
            connection_id,
            &ServerEvent::UserJoined {
                id: connection_id,
                username: username.clone(),
            },
        );
        self.sync_participants();
        if let Some(presenter_id) = self.presenter_id.filter(|id| *id != connection_id) {
            self.send_to(connection_id, ServerEvent::ExistingPresenter { presenter_id });
        }

        info!(
            target: "rs.actor.room",
            room_id = %self.room_id,
            connection_id = %connection_id,
            username = %username,
            members = self.members.len(),
            "Participant joined"
        );

        Ok(JoinOutcome {
            history: self.messages.clone(),
            presenter_id: self.presenter_id,
        })
    }

    fn handle_leave(&mut self, connection_id: ConnectionId) -> LeaveOutcome {
        let Some(member) = self.members.remove(&connection_id) else {
            return LeaveOutcome {
                removed: false,
                remaining: self.members.len(),
            };
        };

        self.broadcast(&ServerEvent::UserLeft {
            id: connection_id,
            username: Some(member.snapshot.username),
        });
        self.broadcast(&ServerEvent::UserStoppedTyping {
            user_id: connection_id,
        });
        if self.presenter_id == Some(connection_id) {
            self.presenter_id = None;
            self.broadcast(&ServerEvent::PresenterStop { id: connection_id });
        }
        self.sync_participants();

        info!(
            target: "rs.actor.room",
            room_id = %self.room_id,
            connection_id = %connection_id,
            remaining = self.members.len(),
            "Participant left"
        );

        LeaveOutcome {
            removed: true,
            remaining: self.members.len(),
        }
    }

    fn handle_set_attribute(&mut self, connection_id: ConnectionId, attribute: Attribute, value: bool) {
        let Some(member) = self.members.get_mut(&connection_id) else {
            debug!(
                target: "rs.actor.room",
                room_id = %self.room_id,
                connection_id = %connection_id,
                attribute = attribute.as_str(),
                "Attribute change from non-member ignored"
            );
            return;
        };
        member.snapshot.set(attribute, value);

        self.sync_participants();
        self.broadcast_except(
            connection_id,
            &ServerEvent::attribute_notice(attribute, value, connection_id),
        );
    }

    /// Make `connection_id` the presenter, demoting any previous one.
    ///
    /// Returns false if nothing changed.
    fn promote_presenter(&mut self, connection_id: ConnectionId) -> bool {
        if !self.members.contains_key(&connection_id) || self.presenter_id == Some(connection_id) {
            return false;
        }

        if let Some(previous) = self.presenter_id.replace(connection_id) {
            if let Some(member) = self.members.get_mut(&previous) {
                member.snapshot.is_presenter = false;
            }
            self.broadcast(&ServerEvent::PresenterStop { id: previous });
            debug!(
                target: "rs.actor.room",
                room_id = %self.room_id,
                previous = %previous,
                presenter = %connection_id,
                "Previous presenter demoted"
            );
        }
        if let Some(member) = self.members.get_mut(&connection_id) {
            member.snapshot.is_presenter = true;
        }

        self.broadcast_except(connection_id, &ServerEvent::PresenterStart { id: connection_id });
        self.sync_participants();
        true
    }

    fn handle_presenter_stop(&mut self, connection_id: ConnectionId) {
        if self.presenter_id != Some(connection_id) {
            return;
        }

        self.presenter_id = None;
        if let Some(member) = self.members.get_mut(&connection_id) {
            member.snapshot.is_presenter = false;
        }

        self.broadcast_except(connection_id, &ServerEvent::PresenterStop { id: connection_id });
        self.sync_participants();
    }

    fn handle_chat(&mut self, connection_id: ConnectionId, text: String) {
        let Some(member) = self.members.get(&connection_id) else {
            return;
        };
        if text.trim().is_empty() {
            return;
        }

        let entry = ChatEntry::Text {
            username: member.snapshot.username.clone(),
            text,
            timestamp: Utc::now(),
        };
        self.messages.push(entry.clone());

        self.broadcast_except(
            connection_id,
            &ServerEvent::UserStoppedTyping {
                user_id: connection_id,
            },
        );
        self.broadcast(&ServerEvent::ChatMessage(entry));
    }

    fn handle_share_file(
        &mut self,
        connection_id: ConnectionId,
        upload: FileUpload,
    ) -> Result<(), RoomError> {
        let Some(member) = self.members.get(&connection_id) else {
            return Err(RoomError::NotInRoom(connection_id));
        };

        let entry = ChatEntry::File {
            id: Uuid::new_v4(),
            username: member.snapshot.username.clone(),
            file_name: upload.file_name,
            file_type: upload.file_type,
            file_data: upload.file_data,
            timestamp: Utc::now(),
        };
        self.messages.push(entry.clone());

        info!(
            target: "rs.actor.room",
            room_id = %self.room_id,
            connection_id = %connection_id,
            bytes = upload.decoded_len,
            "File shared"
        );

        self.broadcast_except(connection_id, &ServerEvent::FileShare(entry));
        Ok(())
    }

    fn handle_typing(&self, connection_id: ConnectionId, typing: bool) {
        if !self.members.contains_key(&connection_id) {
            return;
        }

        let event = if typing {
            ServerEvent::UserTyping {
                user_id: connection_id,
            }
        } else {
            ServerEvent::UserStoppedTyping {
                user_id: connection_id,
            }
        };
        self.broadcast_except(connection_id, &event);
    }

    fn handle_relay(&mut self, from: ConnectionId, to: ConnectionId, kind: MediaKind, signal: Signal) {
        let name = signal.name();
        if !self.members.contains_key(&from) {
            debug!(
                target: "rs.actor.room",
                room_id = %self.room_id,
                from = %from,
                event = name,
                "Relay from non-member ignored"
            );
            return;
        }

        // A video offer is how a client starts sharing.
        if kind == MediaKind::Video && matches!(signal, Signal::Offer(_)) {
            self.promote_presenter(from);
        }

        let Some(target) = self.members.get(&to) else {
            debug!(
                target: "rs.actor.room",
                room_id = %self.room_id,
                from = %from,
                to = %to,
                event = name,
                "Relay target not in room, dropped"
            );
            prom::record_relay_dropped(name);
            return;
        };

        if let Err(e) = target.connection.deliver(signal.into_event(from, kind)) {
            warn!(
                target: "rs.actor.room",
                room_id = %self.room_id,
                to = %to,
                event = name,
                error = %e,
                "Relay delivery failed"
            );
        }
    }

    fn get_state(&self) -> RoomState {
        RoomState {
            room_id: self.room_id.clone(),
            participants: self.snapshot(),
            presenter_id: self.presenter_id,
            messages: self.messages.clone(),
            has_password: self.password.is_some(),
        }
    }

    /// Participants in join order.
    fn snapshot(&self) -> Vec<ParticipantSnapshot> {
        let mut members: Vec<&Member> = self.members.values().collect();
        members.sort_by_key(|m| m.joined_seq);
        members.into_iter().map(|m| m.snapshot.clone()).collect()
    }

    fn sync_participants(&self) {
        self.broadcast(&ServerEvent::ParticipantsSync(self.snapshot()));
    }

    fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) {
        if let Some(member) = self.members.get(&connection_id) {
            self.deliver(member, event);
        }
    }

    fn broadcast(&self, event: &ServerEvent) {
        for member in self.members.values() {
            self.deliver(member, event.clone());
        }
    }

    fn broadcast_except(&self, except: ConnectionId, event: &ServerEvent) {
        for (id, member) in &self.members {
            if *id != except {
                self.deliver(member, event.clone());
            }
        }
    }

    fn deliver(&self, member: &Member, event: ServerEvent) {
        if let Err(e) = member.connection.deliver(event) {
            debug!(
                target: "rs.actor.room",
                room_id = %self.room_id,
                connection_id = %member.snapshot.id,
                error = %e,
                "Event not delivered"
            );
        }
    }
}
