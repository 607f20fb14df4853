//! In-memory socket for actor unit tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::connection::{ConnectionActor, ConnectionActorHandle};
use super::metrics::ActorMetrics;

use axum::extract::ws::Message;
use common::types::ConnectionId;
use room_protocol::{codec, ServerEvent};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::{CancellationToken, PollSender};

const RECV_TIMEOUT: Duration = Duration::from_secs(1);
const QUIET_PERIOD: Duration = Duration::from_millis(50);

/// A `ConnectionActor` whose frames land in a channel instead of a socket.
pub(crate) struct TestSocket {
    handle: ConnectionActorHandle,
    frames: Mutex<mpsc::Receiver<Message>>,
}

impl TestSocket {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::channel(256);
        let (handle, _task) = ConnectionActor::spawn(
            ConnectionId::new(),
            PollSender::new(tx),
            CancellationToken::new(),
            ActorMetrics::new(),
        );
        Self {
            handle,
            frames: Mutex::new(rx),
        }
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.handle.connection_id()
    }

    pub(crate) fn handle(&self) -> ConnectionActorHandle {
        self.handle.clone()
    }

    async fn recv_within(&self, wait: Duration) -> Option<ServerEvent> {
        let mut frames = self.frames.lock().await;
        loop {
            match tokio::time::timeout(wait, frames.recv()).await {
                Ok(Some(Message::Text(text))) => return Some(codec::decode_server(&text).unwrap()),
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => return None,
            }
        }
    }

    /// Next event, failing the test after a second of silence.
    pub(crate) async fn next_event(&self) -> ServerEvent {
        self.recv_within(RECV_TIMEOUT)
            .await
            .expect("timed out waiting for event")
    }

    pub(crate) async fn collect(&self, count: usize) -> Vec<ServerEvent> {
        let mut events = Vec::with_capacity(count);
        for _ in 0..count {
            events.push(self.next_event().await);
        }
        events
    }

    /// Discard everything received so far.
    pub(crate) async fn drain(&self) {
        while self.recv_within(QUIET_PERIOD).await.is_some() {}
    }

    pub(crate) async fn expect_silence(&self) {
        if let Some(event) = self.recv_within(QUIET_PERIOD).await {
            unreachable!("expected no event, got {}", event.name());
        }
    }
}
