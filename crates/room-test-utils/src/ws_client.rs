//! Raw WebSocket client speaking the room protocol.
//!
//! Used by service E2E tests to play several participants by hand, without
//! the client crate's negotiation logic in the way.

use common::types::{ConnectionId, MediaKind, RoomId};
use futures_util::{SinkExt, StreamExt};
use room_protocol::{codec, ClientEvent, Password, ServerEvent};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// How long `next_event` waits before failing the test.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// One participant's socket.
pub struct WsTestClient {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    id: Option<ConnectionId>,
}

impl WsTestClient {
    /// Connect and read the `connected` handshake.
    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        let mut client = Self::connect_raw(url).await?;
        match client.next_event().await? {
            ServerEvent::Connected { id } => client.id = Some(id),
            other => anyhow::bail!("Expected connected first, got {:?}", other),
        }
        Ok(client)
    }

    /// Connect without reading anything.
    pub async fn connect_raw(url: &str) -> Result<Self, anyhow::Error> {
        let (socket, _) = connect_async(url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to {}: {}", url, e))?;
        Ok(Self { socket, id: None })
    }

    /// Id assigned by the server in the handshake.
    pub fn id(&self) -> Option<ConnectionId> {
        self.id
    }

    /// Id assigned by the server; fails the test if the handshake was skipped.
    pub fn connection_id(&self) -> ConnectionId {
        self.id.expect("client connected without handshake")
    }

    pub async fn send(&mut self, event: &ClientEvent) -> Result<(), anyhow::Error> {
        let frame = codec::encode_client(event)?;
        self.send_text(frame).await
    }

    /// Send an arbitrary text frame.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), anyhow::Error> {
        self.socket.send(Message::Text(text.into())).await?;
        Ok(())
    }

    pub async fn join(
        &mut self,
        room_id: &str,
        username: &str,
        password: Option<&str>,
    ) -> Result<(), anyhow::Error> {
        self.send(&ClientEvent::JoinRoom {
            room_id: RoomId::from(room_id),
            username: username.to_string(),
            password: password.map(Password::new),
        })
        .await
    }

    pub async fn chat(&mut self, text: &str) -> Result<(), anyhow::Error> {
        self.send(&ClientEvent::ChatMessage {
            username: None,
            text: text.to_string(),
        })
        .await
    }

    pub async fn offer(
        &mut self,
        to: ConnectionId,
        sdp: &str,
        kind: MediaKind,
    ) -> Result<(), anyhow::Error> {
        self.send(&ClientEvent::Offer {
            to,
            offer: room_protocol::SessionDescription::offer(sdp),
            kind,
        })
        .await
    }

    /// Next decoded server event, skipping control frames.
    pub async fn next_event(&mut self) -> Result<ServerEvent, anyhow::Error> {
        self.next_event_within(EVENT_TIMEOUT).await
    }

    pub async fn next_event_within(&mut self, limit: Duration) -> Result<ServerEvent, anyhow::Error> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let frame = tokio::time::timeout_at(deadline, self.socket.next())
                .await
                .map_err(|_| anyhow::anyhow!("Timed out waiting for server event"))?;
            match frame {
                Some(Ok(Message::Text(text))) => return Ok(codec::decode_server(&text)?),
                Some(Ok(Message::Close(frame))) => {
                    anyhow::bail!("Server closed the socket: {:?}", frame)
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => anyhow::bail!("Socket error: {}", e),
                None => anyhow::bail!("Socket ended"),
            }
        }
    }

    /// Skip events until one matches `predicate`, returning it.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Result<ServerEvent, anyhow::Error>
    where
        F: FnMut(&ServerEvent) -> bool,
    {
        loop {
            let event = self.next_event().await?;
            if predicate(&event) {
                return Ok(event);
            }
        }
    }

    /// Skip to `join-success` and return the room id.
    pub async fn expect_join_success(&mut self) -> Result<RoomId, anyhow::Error> {
        match self
            .wait_for(|e| matches!(e, ServerEvent::JoinSuccess { .. } | ServerEvent::JoinError(_)))
            .await?
        {
            ServerEvent::JoinSuccess { room_id } => Ok(room_id),
            other => anyhow::bail!("Expected join-success, got {:?}", other),
        }
    }

    /// Skip to the next `participants-sync`.
    pub async fn next_sync(
        &mut self,
    ) -> Result<Vec<room_protocol::ParticipantSnapshot>, anyhow::Error> {
        match self
            .wait_for(|e| matches!(e, ServerEvent::ParticipantsSync(_)))
            .await?
        {
            ServerEvent::ParticipantsSync(participants) => Ok(participants),
            other => anyhow::bail!("Expected participants-sync, got {:?}", other),
        }
    }

    /// Skip syncs until one lists exactly `count` participants.
    pub async fn sync_with(
        &mut self,
        count: usize,
    ) -> Result<Vec<room_protocol::ParticipantSnapshot>, anyhow::Error> {
        loop {
            let participants = self.next_sync().await?;
            if participants.len() == count {
                return Ok(participants);
            }
        }
    }

    /// Assert that no text frame arrives within `limit`.
    pub async fn expect_silence(&mut self, limit: Duration) -> Result<(), anyhow::Error> {
        match self.next_event_within(limit).await {
            Ok(event) => anyhow::bail!("Expected silence, got {:?}", event),
            Err(_) => Ok(()),
        }
    }

    /// Read until the server closes the socket.
    pub async fn expect_closed(&mut self, limit: Duration) -> Result<(), anyhow::Error> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let frame = tokio::time::timeout_at(deadline, self.socket.next())
                .await
                .map_err(|_| anyhow::anyhow!("Socket still open"))?;
            match frame {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return Ok(()),
                Some(Ok(_)) => continue,
            }
        }
    }

    pub async fn close(mut self) -> Result<(), anyhow::Error> {
        self.socket.close(None).await?;
        Ok(())
    }
}
