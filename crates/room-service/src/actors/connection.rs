//! `ConnectionActor` - owns the write half of one signaling socket.
//!
//! Each `ConnectionActor`:
//! - Serializes `ServerEvent`s and writes them as text frames
//! - Writes heartbeat pings on request from the transport loop
//! - Is the only writer for its socket, so frames never interleave
//!
//! Room actors deliver with `try_send`: a client that stops reading loses
//! events instead of stalling the whole room.
//!
//! # Lifecycle
//!
//! 1. Spawned by the transport when a socket is upgraded
//! 2. Runs until `Close`, a write failure, or cancellation
//! 3. Cancels its own token on exit so the read loop notices

use crate::errors::RoomError;

use super::messages::ConnectionMessage;
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use axum::extract::ws::{close_code, CloseFrame, Message};
use common::types::ConnectionId;
use futures_util::{Sink, SinkExt};
use room_protocol::{codec, ServerEvent};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the connection mailbox.
const CONNECTION_CHANNEL_BUFFER: usize = 256;

/// Handle to a `ConnectionActor`.
#[derive(Clone, Debug)]
pub struct ConnectionActorHandle {
    sender: mpsc::Sender<ConnectionMessage>,
    cancel_token: CancellationToken,
    connection_id: ConnectionId,
    mailbox: Arc<MailboxMonitor>,
}

impl ConnectionActorHandle {
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Queue an event without waiting.
    ///
    /// A full mailbox drops the event and counts the drop.
    pub fn deliver(&self, event: ServerEvent) -> Result<(), RoomError> {
        match self.sender.try_send(ConnectionMessage::Deliver { event }) {
            Ok(()) => {
                self.mailbox.record_enqueue();
                Ok(())
            }
            Err(TrySendError::Full(ConnectionMessage::Deliver { event })) => {
                self.mailbox.record_drop();
                Err(RoomError::Transport(format!(
                    "mailbox full, dropped {}",
                    event.name()
                )))
            }
            Err(e) => Err(RoomError::Transport(format!("channel send failed: {e}"))),
        }
    }

    /// Ask the actor to write a ping frame.
    pub async fn heartbeat(&self) -> Result<(), RoomError> {
        self.send(ConnectionMessage::Heartbeat).await
    }

    /// Send a close frame and stop the actor.
    pub async fn close(&self, reason: impl Into<String>) -> Result<(), RoomError> {
        self.send(ConnectionMessage::Close {
            reason: reason.into(),
        })
        .await
    }

    /// Ping the actor to check liveness.
    pub async fn ping(&self) -> Result<(), RoomError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(ConnectionMessage::Ping { respond_to: tx }).await?;

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

    /// Token cancelled when the actor stops.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    async fn send(&self, message: ConnectionMessage) -> Result<(), RoomError> {
        self.sender
            .send(message)
            .await
            .map_err(|e| RoomError::Internal(format!("channel send failed: {e}")))?;
        self.mailbox.record_enqueue();
        Ok(())
    }
}

/// The `ConnectionActor` implementation.
pub struct ConnectionActor<S> {
    connection_id: ConnectionId,
    /// Write half of the socket.
    sink: S,
    receiver: mpsc::Receiver<ConnectionMessage>,
    /// Cancelled by the transport, the shutdown path, or the actor itself.
    cancel_token: CancellationToken,
    metrics: Arc<ActorMetrics>,
    mailbox: Arc<MailboxMonitor>,
    is_closing: bool,
}

impl<S> ConnectionActor<S>
where
    S: Sink<Message> + Send + Unpin + 'static,
    S::Error: Display,
{
    /// Spawn a new connection actor writing to `sink`.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        connection_id: ConnectionId,
        sink: S,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> (ConnectionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(CONNECTION_CHANNEL_BUFFER);
        let mailbox = MailboxMonitor::new(ActorType::Connection, connection_id.to_string());

        let actor = Self {
            connection_id,
            sink,
            receiver,
            cancel_token: cancel_token.clone(),
            metrics,
            mailbox: Arc::clone(&mailbox),
            is_closing: false,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = ConnectionActorHandle {
            sender,
            cancel_token,
            connection_id,
            mailbox,
        };

        (handle, task_handle)
    }

    #[instrument(
        skip_all,
        name = "rs.actor.connection",
        fields(connection_id = %self.connection_id)
    )]
    async fn run(mut self) {
        debug!(
            target: "rs.actor.connection",
            connection_id = %self.connection_id,
            "ConnectionActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "rs.actor.connection",
                        connection_id = %self.connection_id,
                        "ConnectionActor received cancellation signal"
                    );
                    self.graceful_close(close_code::AWAY, "server shutting down").await;
                    break;
                }

                msg = self.receiver.recv() => {
                    let Some(message) = msg else {
                        debug!(
                            target: "rs.actor.connection",
                            connection_id = %self.connection_id,
                            "ConnectionActor channel closed, exiting"
                        );
                        break;
                    };

                    let should_exit = self.handle_message(message).await;
                    self.mailbox.record_dequeue();
                    self.metrics.record_message_processed();

                    if should_exit {
                        break;
                    }
                }
            }
        }

        // Wake the read loop if it is still waiting on the socket.
        self.cancel_token.cancel();

        info!(
            target: "rs.actor.connection",
            connection_id = %self.connection_id,
            messages_processed = self.mailbox.messages_processed(),
            messages_dropped = self.mailbox.messages_dropped(),
            "ConnectionActor stopped"
        );
    }

    /// Handle a single message. Returns true if the actor should exit.
    async fn handle_message(&mut self, message: ConnectionMessage) -> bool {
        match message {
            ConnectionMessage::Deliver { event } => !self.write_event(&event).await,

            ConnectionMessage::Heartbeat => !self.write(Message::Ping(Vec::new())).await,

            ConnectionMessage::Close { reason } => {
                self.graceful_close(close_code::NORMAL, &reason).await;
                true
            }

            ConnectionMessage::Ping { respond_to } => {
                let _ = respond_to.send(());
                false
            }
        }
    }

    /// Encode and write one event. Returns false if the socket is gone.
    async fn write_event(&mut self, event: &ServerEvent) -> bool {
        let text = match codec::encode_server(event) {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    target: "rs.actor.connection",
                    connection_id = %self.connection_id,
                    event = event.name(),
                    error = %e,
                    "Failed to encode event, skipping"
                );
                return true;
            }
        };

        self.write(Message::Text(text)).await
    }

    async fn write(&mut self, frame: Message) -> bool {
        if self.is_closing {
            return false;
        }

        match self.sink.send(frame).await {
            Ok(()) => true,
            Err(e) => {
                debug!(
                    target: "rs.actor.connection",
                    connection_id = %self.connection_id,
                    error = %e,
                    "Socket write failed"
                );
                self.is_closing = true;
                false
            }
        }
    }

    async fn graceful_close(&mut self, code: u16, reason: &str) {
        if self.is_closing {
            return;
        }

        debug!(
            target: "rs.actor.connection",
            connection_id = %self.connection_id,
            reason = %reason,
            "Closing connection"
        );

        let frame = Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        }));
        let _ = self.write(frame).await;
        self.is_closing = true;
    }
}
