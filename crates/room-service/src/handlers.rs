//! Per-connection event dispatch.
//!
//! The transport decodes frames into `ClientEvent`s and hands them here.
//! Everything except `join-room` and `leave-room` needs room membership;
//! those events from a connection outside any room are dropped.

use crate::actors::{ConnectionActorHandle, RoomActorHandle, RoomControllerHandle, Signal};
use crate::errors::RoomError;
use crate::observability::metrics as prom;
use crate::upload::validate_upload;

use common::types::{ConnectionId, RoomId};
use room_protocol::{ClientEvent, FileShareAck, ServerEvent};
use std::time::Instant;
use tracing::{debug, info, warn};

/// The room a connection is currently in.
#[derive(Debug, Clone)]
pub struct CurrentRoom {
    pub room_id: RoomId,
    pub username: String,
    pub room: RoomActorHandle,
}

/// Per-connection state owned by the read loop.
#[derive(Debug)]
pub struct ConnectionContext {
    connection_id: ConnectionId,
    connection: ConnectionActorHandle,
    joined: Option<CurrentRoom>,
}

impl ConnectionContext {
    #[must_use]
    pub fn new(connection: ConnectionActorHandle) -> Self {
        Self {
            connection_id: connection.connection_id(),
            connection,
            joined: None,
        }
    }

    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    #[must_use]
    pub fn joined(&self) -> Option<&CurrentRoom> {
        self.joined.as_ref()
    }

    fn reply(&self, event: ServerEvent) {
        if let Err(e) = self.connection.deliver(event) {
            debug!(
                target: "rs.transport.ws",
                connection_id = %self.connection_id,
                error = %e,
                "Reply not delivered"
            );
        }
    }
}

/// Routes client events to the controller or the connection's room.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    controller: RoomControllerHandle,
    max_upload_bytes: usize,
}

impl Dispatcher {
    #[must_use]
    pub fn new(controller: RoomControllerHandle, max_upload_bytes: usize) -> Self {
        Self {
            controller,
            max_upload_bytes,
        }
    }

    /// Handle one inbound event.
    pub async fn dispatch(&self, ctx: &mut ConnectionContext, event: ClientEvent) {
        let name = event.name();
        let started = Instant::now();
        prom::record_event(name);

        if let Err(e) = self.route(ctx, event).await {
            prom::record_error(e.error_type_label());
            warn!(
                target: "rs.transport.ws",
                connection_id = %ctx.connection_id,
                event = name,
                error = %e,
                "Event handling failed"
            );
        }

        prom::record_event_latency(name, started.elapsed());
    }

    /// Leave whatever room the connection is in. Called once the socket closes.
    pub async fn disconnect(&self, ctx: &mut ConnectionContext) {
        ctx.joined = None;
        match self.controller.leave_room(ctx.connection_id).await {
            Ok(Some(room_id)) => {
                info!(
                    target: "rs.transport.ws",
                    connection_id = %ctx.connection_id,
                    room_id = %room_id,
                    "Disconnected member removed from room"
                );
            }
            Ok(None) => {}
            Err(e) => {
                debug!(
                    target: "rs.transport.ws",
                    connection_id = %ctx.connection_id,
                    error = %e,
                    "Leave on disconnect failed"
                );
            }
        }
    }

    async fn route(&self, ctx: &mut ConnectionContext, event: ClientEvent) -> Result<(), RoomError> {
        match event {
            ClientEvent::JoinRoom {
                room_id,
                username,
                password,
            } => {
                self.join(ctx, room_id, username, password.map(room_protocol::Password::into_secret))
                    .await;
                Ok(())
            }

            ClientEvent::LeaveRoom => {
                ctx.joined = None;
                self.controller.leave_room(ctx.connection_id).await?;
                ctx.reply(ServerEvent::LeftRoom);
                Ok(())
            }

            ClientEvent::FileShare {
                file_name,
                file_type,
                file_data,
                room: _,
            } => {
                let ack = match self.share_file(ctx, file_name, file_type, &file_data).await {
                    Ok(()) => FileShareAck::ok(),
                    Err(e) => {
                        prom::record_error(e.error_type_label());
                        FileShareAck::error(e.client_message())
                    }
                };
                ctx.reply(ServerEvent::FileShareAck(ack));
                Ok(())
            }

            other => {
                let Some(joined) = ctx.joined.as_ref() else {
                    debug!(
                        target: "rs.transport.ws",
                        connection_id = %ctx.connection_id,
                        event = other.name(),
                        "Event from connection outside any room ignored"
                    );
                    return Ok(());
                };
                Self::route_in_room(ctx.connection_id, &joined.room, other).await
            }
        }
    }

    async fn route_in_room(
        id: ConnectionId,
        room: &RoomActorHandle,
        event: ClientEvent,
    ) -> Result<(), RoomError> {
        if let Some((attribute, value)) = event.attribute_change() {
            return room.set_attribute(id, attribute, value).await;
        }

        match event {
            ClientEvent::ChatMessage { text, .. } => room.chat(id, text).await,
            ClientEvent::PresenterStart => room.set_presenter(id, true).await,
            ClientEvent::PresenterStop => room.set_presenter(id, false).await,
            ClientEvent::TypingStart => room.typing(id, true).await,
            ClientEvent::TypingStop => room.typing(id, false).await,
            ClientEvent::Offer { to, offer, kind } => {
                room.relay(id, to, kind, Signal::Offer(offer)).await
            }
            ClientEvent::Answer { to, answer, kind } => {
                room.relay(id, to, kind, Signal::Answer(answer)).await
            }
            ClientEvent::IceCandidate {
                to,
                candidate,
                kind,
            } => room.relay(id, to, kind, Signal::Candidate(candidate)).await,
            ClientEvent::StopSharing { .. } => room.stop_sharing(id).await,
            // Attribute events are handled above; join, leave and file-share by `route`.
            _ => Ok(()),
        }
    }

    async fn join(
        &self,
        ctx: &mut ConnectionContext,
        room_id: RoomId,
        username: String,
        password: Option<common::secret::SecretString>,
    ) {
        let username = username.trim().to_string();
        if room_id.as_str().trim().is_empty() || username.is_empty() {
            let err = RoomError::Protocol("join-room needs a room id and a username".to_string());
            prom::record_join_rejected(err.error_type_label());
            ctx.reply(ServerEvent::JoinError(err.client_message()));
            return;
        }

        // The controller leaves the previous room itself.
        ctx.joined = None;

        match self
            .controller
            .join_room(
                ctx.connection_id,
                ctx.connection.clone(),
                room_id,
                username.clone(),
                password,
            )
            .await
        {
            Ok(joined) => {
                ctx.joined = Some(CurrentRoom {
                    room_id: joined.room_id,
                    username,
                    room: joined.room,
                });
            }
            Err(e) => {
                prom::record_join_rejected(e.error_type_label());
                info!(
                    target: "rs.transport.ws",
                    connection_id = %ctx.connection_id,
                    reason = e.error_type_label(),
                    "Join rejected"
                );
                ctx.reply(ServerEvent::JoinError(e.client_message()));
            }
        }
    }

    async fn share_file(
        &self,
        ctx: &ConnectionContext,
        file_name: String,
        file_type: String,
        file_data: &str,
    ) -> Result<(), RoomError> {
        let joined = ctx
            .joined
            .as_ref()
            .ok_or(RoomError::NotInRoom(ctx.connection_id))?;
        let upload = validate_upload(file_name, file_type, file_data, self.max_upload_bytes)?;
        joined.room.share_file(ctx.connection_id, upload).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::test_support::TestSocket;
    use crate::actors::ActorMetrics;
    use crate::errors::WRONG_PASSWORD_MESSAGE;
    use room_protocol::{ChatEntry, Password};

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(RoomControllerHandle::new(ActorMetrics::new()), 1024)
    }

    fn join_event(room: &str, name: &str, password: Option<&str>) -> ClientEvent {
        ClientEvent::JoinRoom {
            room_id: RoomId::from(room),
            username: name.to_string(),
            password: password.map(Password::new),
        }
    }

    #[tokio::test]
    async fn test_join_sets_context_membership() {
        let dispatcher = dispatcher();
        let socket = TestSocket::new();
        let mut ctx = ConnectionContext::new(socket.handle());

        dispatcher
            .dispatch(&mut ctx, join_event("R1", "alice", None))
            .await;

        let joined = ctx.joined().unwrap();
        assert_eq!(joined.room_id, RoomId::from("R1"));
        assert_eq!(joined.username, "alice");
        assert_eq!(socket.next_event().await, ServerEvent::ChatHistory(vec![]));
    }

    #[tokio::test]
    async fn test_wrong_password_replies_join_error() {
        let dispatcher = dispatcher();
        let owner = TestSocket::new();
        let guest = TestSocket::new();
        let mut owner_ctx = ConnectionContext::new(owner.handle());
        let mut guest_ctx = ConnectionContext::new(guest.handle());

        dispatcher
            .dispatch(&mut owner_ctx, join_event("R1", "alice", Some("pw")))
            .await;
        dispatcher
            .dispatch(&mut guest_ctx, join_event("R1", "bob", Some("nope")))
            .await;

        assert!(guest_ctx.joined().is_none());
        assert_eq!(
            guest.next_event().await,
            ServerEvent::JoinError(WRONG_PASSWORD_MESSAGE.to_string())
        );
    }

    #[tokio::test]
    async fn test_blank_username_rejected() {
        let dispatcher = dispatcher();
        let socket = TestSocket::new();
        let mut ctx = ConnectionContext::new(socket.handle());

        dispatcher
            .dispatch(&mut ctx, join_event("R1", "   ", None))
            .await;

        assert!(matches!(socket.next_event().await, ServerEvent::JoinError(_)));
        assert!(ctx.joined().is_none());
    }

    #[tokio::test]
    async fn test_events_outside_room_are_ignored() {
        let dispatcher = dispatcher();
        let socket = TestSocket::new();
        let mut ctx = ConnectionContext::new(socket.handle());

        dispatcher.dispatch(&mut ctx, ClientEvent::MicMuted).await;
        dispatcher
            .dispatch(
                &mut ctx,
                ClientEvent::ChatMessage {
                    username: None,
                    text: "hello?".to_string(),
                },
            )
            .await;

        socket.expect_silence().await;
    }

    #[tokio::test]
    async fn test_leave_room_always_answers() {
        let dispatcher = dispatcher();
        let socket = TestSocket::new();
        let mut ctx = ConnectionContext::new(socket.handle());

        dispatcher.dispatch(&mut ctx, ClientEvent::LeaveRoom).await;
        assert_eq!(socket.next_event().await, ServerEvent::LeftRoom);

        dispatcher
            .dispatch(&mut ctx, join_event("R1", "alice", None))
            .await;
        socket.drain().await;
        dispatcher.dispatch(&mut ctx, ClientEvent::LeaveRoom).await;

        let events = socket.collect(1).await;
        assert!(events.contains(&ServerEvent::LeftRoom));
        assert!(ctx.joined().is_none());
    }

    #[tokio::test]
    async fn test_file_share_acks_uploader() {
        let dispatcher = dispatcher();
        let alice = TestSocket::new();
        let bob = TestSocket::new();
        let mut alice_ctx = ConnectionContext::new(alice.handle());
        let mut bob_ctx = ConnectionContext::new(bob.handle());
        dispatcher
            .dispatch(&mut alice_ctx, join_event("R1", "alice", None))
            .await;
        dispatcher
            .dispatch(&mut bob_ctx, join_event("R1", "bob", None))
            .await;
        alice.drain().await;
        bob.drain().await;

        dispatcher
            .dispatch(
                &mut alice_ctx,
                ClientEvent::FileShare {
                    file_name: "hi.txt".to_string(),
                    file_type: "text/plain".to_string(),
                    file_data: "data:text/plain;base64,aGk=".to_string(),
                    room: Some(RoomId::from("R1")),
                },
            )
            .await;

        assert_eq!(
            alice.next_event().await,
            ServerEvent::FileShareAck(FileShareAck::ok())
        );
        assert!(matches!(
            bob.next_event().await,
            ServerEvent::FileShare(ChatEntry::File { .. })
        ));
    }

    #[tokio::test]
    async fn test_file_share_too_large_only_errors_uploader() {
        let dispatcher = dispatcher();
        let alice = TestSocket::new();
        let bob = TestSocket::new();
        let mut alice_ctx = ConnectionContext::new(alice.handle());
        let mut bob_ctx = ConnectionContext::new(bob.handle());
        dispatcher
            .dispatch(&mut alice_ctx, join_event("R1", "alice", None))
            .await;
        dispatcher
            .dispatch(&mut bob_ctx, join_event("R1", "bob", None))
            .await;
        alice.drain().await;
        bob.drain().await;

        let big = "A".repeat(4096);
        dispatcher
            .dispatch(
                &mut alice_ctx,
                ClientEvent::FileShare {
                    file_name: "big.bin".to_string(),
                    file_type: String::new(),
                    file_data: big,
                    room: None,
                },
            )
            .await;

        let ServerEvent::FileShareAck(ack) = alice.next_event().await else {
            unreachable!("expected file-share-ack");
        };
        assert!(!ack.is_ok());
        bob.expect_silence().await;
    }

    #[tokio::test]
    async fn test_file_share_outside_room_acks_error() {
        let dispatcher = dispatcher();
        let socket = TestSocket::new();
        let mut ctx = ConnectionContext::new(socket.handle());

        dispatcher
            .dispatch(
                &mut ctx,
                ClientEvent::FileShare {
                    file_name: "a".to_string(),
                    file_type: String::new(),
                    file_data: "aGk=".to_string(),
                    room: None,
                },
            )
            .await;

        let ServerEvent::FileShareAck(ack) = socket.next_event().await else {
            unreachable!("expected file-share-ack");
        };
        assert!(!ack.is_ok());
    }
}
