//! `RoomControllerActor` - singleton supervisor for room actors.
//!
//! - Owns the room registry and the connection-to-room membership map
//! - Creates a room lazily on first join, fixing its password
//! - Removes a room when its last member leaves
//! - Owns the root `CancellationToken` for graceful shutdown
//! - Monitors room actor health (panic detection via `JoinHandle`)
//!
//! Joins and leaves are serialized here, so a room is never removed while
//! a join for it is in flight.
//!
//! # Graceful Shutdown
//!
//! On SIGTERM, the controller:
//! 1. Sets `accepting_new = false` (joins fail with `Draining`)
//! 2. Cancels the root `CancellationToken` (propagates to all rooms)
//! 3. Waits for room tasks to finish

use crate::errors::RoomError;

use super::connection::ConnectionActorHandle;
use super::messages::{ControllerMessage, ControllerStatus, JoinedRoom, RoomInfo};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::room::{RoomActor, RoomActorHandle};

use common::secret::SecretString;
use common::types::{ConnectionId, RoomId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the controller mailbox.
const CONTROLLER_CHANNEL_BUFFER: usize = 1000;

/// How long a removed room gets to stop before we stop waiting.
const ROOM_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// How long shutdown waits for each room task.
const SHUTDOWN_ROOM_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle to the `RoomControllerActor`.
#[derive(Clone, Debug)]
pub struct RoomControllerHandle {
    sender: mpsc::Sender<ControllerMessage>,
    cancel_token: CancellationToken,
    mailbox: Arc<MailboxMonitor>,
}

impl RoomControllerHandle {
    /// Create a new `RoomControllerActor` and return a handle to it.
    ///
    /// This spawns the actor task and returns immediately.
    #[must_use]
    pub fn new(metrics: Arc<ActorMetrics>) -> Self {
        let (sender, receiver) = mpsc::channel(CONTROLLER_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();
        let mailbox = MailboxMonitor::new(ActorType::Controller, "controller");

        let actor = RoomControllerActor::new(
            receiver,
            cancel_token.clone(),
            metrics,
            Arc::clone(&mailbox),
        );

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
            mailbox,
        }
    }

    /// Join `room_id`, creating it if it does not exist.
    ///
    /// A connection already in another room leaves it first.
    pub async fn join_room(
        &self,
        connection_id: ConnectionId,
        connection: ConnectionActorHandle,
        room_id: RoomId,
        username: String,
        password: Option<SecretString>,
    ) -> Result<JoinedRoom, RoomError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(ControllerMessage::JoinRoom {
            connection_id,
            connection,
            room_id,
            username,
            password,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| RoomError::Internal(format!("response receive failed: {e}")))?
    }

    /// Leave the current room, if any. Returns the room that was left.
    pub async fn leave_room(&self, connection_id: ConnectionId) -> Result<Option<RoomId>, RoomError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(ControllerMessage::LeaveRoom {
            connection_id,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| RoomError::Internal(format!("response receive failed: {e}")))
    }

    /// Get information about a live room.
    pub async fn get_room(&self, room_id: RoomId) -> Result<RoomInfo, RoomError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(ControllerMessage::GetRoom {
            room_id,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| RoomError::Internal(format!("response receive failed: {e}")))?
    }

    /// Get the current controller status.
    pub async fn get_status(&self) -> Result<ControllerStatus, RoomError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(ControllerMessage::GetStatus { respond_to: tx })
            .await?;

        rx.await
            .map_err(|e| RoomError::Internal(format!("response receive failed: {e}")))
    }

    /// Initiate graceful shutdown.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(ControllerMessage::Shutdown { respond_to: tx })
            .await?;

        rx.await
            .map_err(|e| RoomError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for spawning child actors.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    async fn send(&self, message: ControllerMessage) -> Result<(), RoomError> {
        self.sender
            .send(message)
            .await
            .map_err(|e| RoomError::Internal(format!("channel send failed: {e}")))?;
        self.mailbox.record_enqueue();
        Ok(())
    }
}

/// Internal state for a managed room.
struct ManagedRoom {
    handle: RoomActorHandle,
    task_handle: JoinHandle<()>,
    has_password: bool,
    created_at: i64,
}

/// Which room a connection is in.
struct Membership {
    room_id: RoomId,
    username: String,
}

/// The `RoomControllerActor` implementation.
pub struct RoomControllerActor {
    receiver: mpsc::Receiver<ControllerMessage>,
    /// Root cancellation token.
    cancel_token: CancellationToken,
    rooms: HashMap<RoomId, ManagedRoom>,
    /// A connection is in at most one room.
    registry: HashMap<ConnectionId, Membership>,
    accepting_new: bool,
    metrics: Arc<ActorMetrics>,
    mailbox: Arc<MailboxMonitor>,
}

impl RoomControllerActor {
    fn new(
        receiver: mpsc::Receiver<ControllerMessage>,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
        mailbox: Arc<MailboxMonitor>,
    ) -> Self {
        Self {
            receiver,
            cancel_token,
            rooms: HashMap::new(),
            registry: HashMap::new(),
            accepting_new: true,
            metrics,
            mailbox,
        }
    }

    #[instrument(skip_all, name = "rs.actor.controller")]
    async fn run(mut self) {
        info!(target: "rs.actor.controller", "RoomControllerActor started");

        loop {
            self.check_room_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "rs.actor.controller",
                        "RoomControllerActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    let Some(message) = msg else {
                        info!(
                            target: "rs.actor.controller",
                            "RoomControllerActor channel closed, exiting"
                        );
                        break;
                    };

                    self.handle_message(message).await;
                    self.mailbox.record_dequeue();
                    self.metrics.record_message_processed();
                }
            }
        }

        info!(
            target: "rs.actor.controller",
            rooms_remaining = self.rooms.len(),
            messages_processed = self.mailbox.messages_processed(),
            "RoomControllerActor stopped"
        );
    }

    async fn handle_message(&mut self, message: ControllerMessage) {
        match message {
            ControllerMessage::JoinRoom {
                connection_id,
                connection,
                room_id,
                username,
                password,
                respond_to,
            } => {
                let result = self
                    .join_room(connection_id, connection, room_id, username, password)
                    .await;
                let _ = respond_to.send(result);
            }

            ControllerMessage::LeaveRoom {
                connection_id,
                respond_to,
            } => {
                let left = self.leave_room(connection_id).await;
                let _ = respond_to.send(left);
            }

            ControllerMessage::GetRoom {
                room_id,
                respond_to,
            } => {
                let result = self.get_room(&room_id).await;
                let _ = respond_to.send(result);
            }

            ControllerMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }

            ControllerMessage::Shutdown { respond_to } => {
                self.initiate_shutdown();
                let _ = respond_to.send(());
            }
        }
    }

    async fn join_room(
        &mut self,
        connection_id: ConnectionId,
        connection: ConnectionActorHandle,
        room_id: RoomId,
        username: String,
        password: Option<SecretString>,
    ) -> Result<JoinedRoom, RoomError> {
        if !self.accepting_new {
            return Err(RoomError::Draining);
        }

        if let Some(current) = self.registry.get(&connection_id) {
            debug!(
                target: "rs.actor.controller",
                connection_id = %connection_id,
                from = %current.room_id,
                to = %room_id,
                "Switching rooms, leaving current room first"
            );
            self.leave_room(connection_id).await;
        }

        let created = !self.rooms.contains_key(&room_id);
        if created {
            self.create_room(room_id.clone(), password.clone());
        }
        let room = self
            .rooms
            .get(&room_id)
            .map(|managed| managed.handle.clone())
            .ok_or_else(|| RoomError::Internal(format!("room {room_id} missing after create")))?;

        match room
            .join(connection_id, username.clone(), password, connection)
            .await
        {
            Ok(outcome) => {
                self.registry.insert(
                    connection_id,
                    Membership {
                        room_id: room_id.clone(),
                        username,
                    },
                );
                self.metrics.participant_joined();

                Ok(JoinedRoom {
                    room_id,
                    room,
                    history: outcome.history,
                    presenter_id: outcome.presenter_id,
                })
            }
            Err(e) => {
                // A freshly created room only fails to admit on an internal error.
                if created {
                    self.remove_room(&room_id);
                }
                Err(e)
            }
        }
    }

    fn create_room(&mut self, room_id: RoomId, password: Option<SecretString>) {
        let has_password = password.is_some();
        let (handle, task_handle) = RoomActor::spawn(
            room_id.clone(),
            password,
            self.cancel_token.child_token(),
            Arc::clone(&self.metrics),
        );

        self.rooms.insert(
            room_id.clone(),
            ManagedRoom {
                handle,
                task_handle,
                has_password,
                created_at: chrono::Utc::now().timestamp(),
            },
        );
        self.metrics.room_created();

        info!(
            target: "rs.actor.controller",
            room_id = %room_id,
            protected = has_password,
            total_rooms = self.rooms.len(),
            "Room created"
        );
    }

    /// Remove the connection from its room. Idempotent.
    async fn leave_room(&mut self, connection_id: ConnectionId) -> Option<RoomId> {
        let membership = self.registry.remove(&connection_id)?;
        self.metrics.participant_left();

        let Some(room) = self
            .rooms
            .get(&membership.room_id)
            .map(|managed| managed.handle.clone())
        else {
            return Some(membership.room_id);
        };

        match room.leave(connection_id).await {
            Ok(outcome) => {
                debug!(
                    target: "rs.actor.controller",
                    connection_id = %connection_id,
                    username = %membership.username,
                    room_id = %membership.room_id,
                    remaining = outcome.remaining,
                    "Connection left room"
                );
                if outcome.remaining == 0 {
                    self.remove_room(&membership.room_id);
                }
            }
            Err(e) => {
                warn!(
                    target: "rs.actor.controller",
                    connection_id = %connection_id,
                    room_id = %membership.room_id,
                    error = %e,
                    "Room did not acknowledge leave"
                );
            }
        }

        Some(membership.room_id)
    }

    /// Cancel a room actor and drop it from the registry.
    ///
    /// The wait for the task runs in the background so the message loop
    /// is not blocked.
    fn remove_room(&mut self, room_id: &RoomId) {
        let Some(managed) = self.rooms.remove(room_id) else {
            return;
        };

        managed.handle.cancel();

        let room_id_owned = room_id.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(ROOM_STOP_TIMEOUT, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "rs.actor.controller",
                        room_id = %room_id_owned,
                        "Room actor task completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "rs.actor.controller",
                        room_id = %room_id_owned,
                        error = ?e,
                        "Room actor task panicked during removal"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "rs.actor.controller",
                        room_id = %room_id_owned,
                        "Room actor task cleanup timed out"
                    );
                }
            }
        });

        self.metrics.room_removed();

        info!(
            target: "rs.actor.controller",
            room_id = %room_id,
            total_rooms = self.rooms.len(),
            "Room removed"
        );
    }

    async fn get_room(&self, room_id: &RoomId) -> Result<RoomInfo, RoomError> {
        let managed = self
            .rooms
            .get(room_id)
            .ok_or_else(|| RoomError::RoomNotFound(room_id.clone()))?;
        let state = managed.handle.get_state().await?;

        Ok(RoomInfo {
            room_id: room_id.clone(),
            participant_count: state.participants.len(),
            message_count: state.messages.len(),
            presenter_id: state.presenter_id,
            has_password: managed.has_password,
            created_at: managed.created_at,
        })
    }

    fn get_status(&self) -> ControllerStatus {
        ControllerStatus {
            room_count: self.rooms.len(),
            member_count: self.registry.len(),
            is_draining: !self.accepting_new,
            mailbox_depth: self.mailbox.current_depth(),
        }
    }

    fn initiate_shutdown(&mut self) {
        info!(
            target: "rs.actor.controller",
            room_count = self.rooms.len(),
            member_count = self.registry.len(),
            "Initiating graceful shutdown"
        );

        self.accepting_new = false;
        self.cancel_token.cancel();
    }

    async fn graceful_shutdown(&mut self) {
        info!(
            target: "rs.actor.controller",
            room_count = self.rooms.len(),
            "Performing graceful shutdown"
        );

        self.accepting_new = false;

        for managed in self.rooms.values() {
            managed.handle.cancel();
        }

        for (room_id, managed) in self.rooms.drain() {
            match tokio::time::timeout(SHUTDOWN_ROOM_TIMEOUT, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "rs.actor.controller",
                        room_id = %room_id,
                        "Room actor completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "rs.actor.controller",
                        room_id = %room_id,
                        error = ?e,
                        "Room actor task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "rs.actor.controller",
                        room_id = %room_id,
                        "Room actor shutdown timed out"
                    );
                }
            }
            self.metrics.room_removed();
        }

        for _ in self.registry.drain() {
            self.metrics.participant_left();
        }

        info!(target: "rs.actor.controller", "Graceful shutdown complete");
    }

    /// Drop rooms whose actor task has finished without being removed.
    async fn check_room_health(&mut self) {
        let failed: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(room_id, _)| room_id.clone())
            .collect();

        for room_id in failed {
            let Some(managed) = self.rooms.remove(&room_id) else {
                continue;
            };

            match managed.task_handle.await {
                Ok(()) => {
                    info!(
                        target: "rs.actor.controller",
                        room_id = %room_id,
                        "Room actor exited on its own"
                    );
                }
                Err(join_error) if join_error.is_panic() => {
                    error!(
                        target: "rs.actor.controller",
                        room_id = %room_id,
                        error = ?join_error,
                        "Room actor panicked"
                    );
                    self.metrics.record_panic(ActorType::Room);
                }
                Err(_) => {}
            }

            // Members of a dead room are no longer in any room.
            let before = self.registry.len();
            self.registry.retain(|_, m| m.room_id != room_id);
            for _ in self.registry.len()..before {
                self.metrics.participant_left();
            }
            self.metrics.room_removed();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::test_support::TestSocket;
    use room_protocol::ServerEvent;

    async fn join(
        controller: &RoomControllerHandle,
        socket: &TestSocket,
        room: &str,
        name: &str,
        password: Option<&str>,
    ) -> Result<JoinedRoom, RoomError> {
        controller
            .join_room(
                socket.id(),
                socket.handle(),
                RoomId::from(room),
                name.to_string(),
                password.map(|p| SecretString::from(p.to_string())),
            )
            .await
    }

    #[tokio::test]
    async fn test_first_join_creates_room() {
        let metrics = ActorMetrics::new();
        let controller = RoomControllerHandle::new(Arc::clone(&metrics));
        let alice = TestSocket::new();

        let joined = join(&controller, &alice, "R1", "alice", None).await.unwrap();
        assert_eq!(joined.room_id, RoomId::from("R1"));
        assert!(joined.history.is_empty());

        let info = controller.get_room(RoomId::from("R1")).await.unwrap();
        assert_eq!(info.participant_count, 1);
        assert!(!info.has_password);
        assert_eq!(metrics.room_count(), 1);
        assert_eq!(metrics.participant_count(), 1);

        controller.cancel();
    }

    #[tokio::test]
    async fn test_creator_password_is_fixed() {
        let controller = RoomControllerHandle::new(ActorMetrics::new());
        let alice = TestSocket::new();
        let bob = TestSocket::new();
        let carol = TestSocket::new();

        join(&controller, &alice, "R1", "alice", Some("pw")).await.unwrap();

        let wrong = join(&controller, &bob, "R1", "bob", Some("other")).await;
        assert!(matches!(wrong, Err(RoomError::WrongPassword)));

        let none = join(&controller, &bob, "R1", "bob", None).await;
        assert!(matches!(none, Err(RoomError::WrongPassword)));

        join(&controller, &carol, "R1", "carol", Some("pw")).await.unwrap();

        let info = controller.get_room(RoomId::from("R1")).await.unwrap();
        assert!(info.has_password);
        assert_eq!(info.participant_count, 2);

        let status = controller.get_status().await.unwrap();
        assert_eq!(status.member_count, 2);

        controller.cancel();
    }

    #[tokio::test]
    async fn test_last_leave_removes_room() {
        let metrics = ActorMetrics::new();
        let controller = RoomControllerHandle::new(Arc::clone(&metrics));
        let alice = TestSocket::new();

        join(&controller, &alice, "R1", "alice", Some("pw")).await.unwrap();
        let left = controller.leave_room(alice.id()).await.unwrap();
        assert_eq!(left, Some(RoomId::from("R1")));

        let result = controller.get_room(RoomId::from("R1")).await;
        assert!(matches!(result, Err(RoomError::RoomNotFound(_))));
        assert_eq!(metrics.room_count(), 0);
        assert_eq!(metrics.participant_count(), 0);

        // Recreated rooms start fresh, including the password.
        let bob = TestSocket::new();
        join(&controller, &bob, "R1", "bob", None).await.unwrap();
        let info = controller.get_room(RoomId::from("R1")).await.unwrap();
        assert!(!info.has_password);
        assert_eq!(info.message_count, 0);

        controller.cancel();
    }

    #[tokio::test]
    async fn test_leave_without_room_is_noop() {
        let controller = RoomControllerHandle::new(ActorMetrics::new());

        let left = controller.leave_room(ConnectionId::new()).await.unwrap();
        assert!(left.is_none());

        controller.cancel();
    }

    #[tokio::test]
    async fn test_switching_rooms_leaves_previous() {
        let controller = RoomControllerHandle::new(ActorMetrics::new());
        let alice = TestSocket::new();
        let bob = TestSocket::new();

        join(&controller, &alice, "R1", "alice", None).await.unwrap();
        join(&controller, &bob, "R1", "bob", None).await.unwrap();
        bob.drain().await;

        join(&controller, &alice, "R2", "alice", None).await.unwrap();

        assert_eq!(
            bob.next_event().await,
            ServerEvent::UserLeft {
                id: alice.id(),
                username: Some("alice".to_string())
            }
        );
        let r1 = controller.get_room(RoomId::from("R1")).await.unwrap();
        assert_eq!(r1.participant_count, 1);
        let r2 = controller.get_room(RoomId::from("R2")).await.unwrap();
        assert_eq!(r2.participant_count, 1);

        let status = controller.get_status().await.unwrap();
        assert_eq!(status.room_count, 2);
        assert_eq!(status.member_count, 2);

        controller.cancel();
    }

    #[tokio::test]
    async fn test_rejoining_same_room_is_leave_then_join() {
        let controller = RoomControllerHandle::new(ActorMetrics::new());
        let alice = TestSocket::new();
        let bob = TestSocket::new();

        join(&controller, &alice, "R1", "alice", None).await.unwrap();
        join(&controller, &bob, "R1", "bob", None).await.unwrap();
        bob.drain().await;

        join(&controller, &alice, "R1", "alice2", None).await.unwrap();

        let events = bob.collect(5).await;
        assert!(matches!(
            events.as_slice(),
            [
                ServerEvent::UserLeft { id: left, .. },
                ServerEvent::UserStoppedTyping { .. },
                ServerEvent::ParticipantsSync(_),
                ServerEvent::UserJoined { id: joined, username },
                ServerEvent::ParticipantsSync(list),
            ] if *left == alice.id()
                && *joined == alice.id()
                && username == "alice2"
                && list.len() == 2
        ));

        let r1 = controller.get_room(RoomId::from("R1")).await.unwrap();
        assert_eq!(r1.participant_count, 2);

        controller.cancel();
    }

    #[tokio::test]
    async fn test_rejected_join_keeps_room_for_members() {
        let controller = RoomControllerHandle::new(ActorMetrics::new());
        let alice = TestSocket::new();
        let mallory = TestSocket::new();

        join(&controller, &alice, "R1", "alice", Some("pw")).await.unwrap();
        let _ = join(&controller, &mallory, "R1", "mallory", Some("guess")).await;

        assert!(controller.get_room(RoomId::from("R1")).await.is_ok());
        assert!(controller.leave_room(mallory.id()).await.unwrap().is_none());

        controller.cancel();
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_joins() {
        let controller = RoomControllerHandle::new(ActorMetrics::new());
        let alice = TestSocket::new();

        controller.shutdown().await.unwrap();
        assert!(controller.is_cancelled());

        // The actor may already have stopped; either way the join is refused.
        let result = join(&controller, &alice, "R1", "alice", None).await;
        assert!(matches!(
            result,
            Err(RoomError::Draining | RoomError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_controller_cancellation_token() {
        let controller = RoomControllerHandle::new(ActorMetrics::new());
        let child = controller.child_token();

        assert!(!controller.is_cancelled());
        assert!(!child.is_cancelled());

        controller.cancel();

        assert!(controller.is_cancelled());
        assert!(child.is_cancelled());
    }
}
