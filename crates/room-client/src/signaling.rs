//! WebSocket connection to the room service.
//!
//! The socket is split into a writer task fed by a [`SignalingHandle`] and a
//! reader task that decodes frames into [`ServerEvent`]s. Frames that do not
//! decode are logged and skipped. Either task ending cancels the other.

use crate::errors::ClientError;

use futures_util::{SinkExt, StreamExt};
use room_protocol::{codec, ClientEvent, ServerEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outbound queue depth.
const OUTBOUND_BUFFER: usize = 256;

/// Inbound queue depth.
const INBOUND_BUFFER: usize = 256;

/// Cloneable sender for client events.
#[derive(Debug, Clone)]
pub struct SignalingHandle {
    sender: mpsc::Sender<ClientEvent>,
}

impl SignalingHandle {
    /// Handle plus the receiving end it feeds.
    #[must_use]
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<ClientEvent>) {
        let (sender, receiver) = mpsc::channel(buffer);
        (Self { sender }, receiver)
    }

    /// Queue an event for the server.
    pub async fn send(&self, event: ClientEvent) -> Result<(), ClientError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| ClientError::Closed)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// A live signaling socket.
pub struct SignalingConnection {
    handle: SignalingHandle,
    events: mpsc::Receiver<ServerEvent>,
    cancel_token: CancellationToken,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl SignalingConnection {
    /// Open the socket and start the reader and writer tasks.
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (socket, _response) = connect_async(url)
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        let (mut sink, mut stream) = socket.split();

        info!(target: "rc.signaling", url = %url, "Signaling connected");

        let cancel_token = CancellationToken::new();
        let (handle, mut outbound) = SignalingHandle::channel(OUTBOUND_BUFFER);
        let (inbound, events) = mpsc::channel(INBOUND_BUFFER);

        let writer_token = cancel_token.clone();
        let writer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = writer_token.cancelled() => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    event = outbound.recv() => {
                        let Some(event) = event else { break };
                        let frame = match codec::encode_client(&event) {
                            Ok(frame) => frame,
                            Err(e) => {
                                warn!(target: "rc.signaling", event = event.name(), error = %e, "Dropping unencodable event");
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(frame)).await {
                            debug!(target: "rc.signaling", error = %e, "Socket write failed");
                            break;
                        }
                    }
                }
            }
            writer_token.cancel();
        });

        let reader_token = cancel_token.clone();
        let reader = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = reader_token.cancelled() => break,
                    frame = stream.next() => match frame {
                        Some(Ok(Message::Text(text))) => match codec::decode_server(&text) {
                            Ok(event) => {
                                if inbound.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                debug!(target: "rc.signaling", error = %e, "Ignoring undecodable frame");
                            }
                        },
                        Some(Ok(Message::Close(frame))) => {
                            info!(target: "rc.signaling", frame = ?frame, "Server closed the connection");
                            break;
                        }
                        // Pings are answered by the socket itself.
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            debug!(target: "rc.signaling", error = %e, "Socket read failed");
                            break;
                        }
                        None => break,
                    },
                }
            }
            reader_token.cancel();
        });

        Ok(Self {
            handle,
            events,
            cancel_token,
            reader,
            writer,
        })
    }

    #[must_use]
    pub fn handle(&self) -> SignalingHandle {
        self.handle.clone()
    }

    /// Next server event, or `None` once the socket is gone.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.events.recv().await
    }

    pub fn events_mut(&mut self) -> &mut mpsc::Receiver<ServerEvent> {
        &mut self.events
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Send a close frame and wait for both tasks.
    pub async fn close(self) {
        self.cancel_token.cancel();
        if let Err(e) = self.writer.await {
            warn!(target: "rc.signaling", error = ?e, "Signaling writer panicked");
        }
        if let Err(e) = self.reader.await {
            warn!(target: "rc.signaling", error = ?e, "Signaling reader panicked");
        }
        info!(target: "rc.signaling", "Signaling closed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_feeds_channel() {
        let (handle, mut rx) = SignalingHandle::channel(4);
        handle.send(ClientEvent::TypingStart).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), ClientEvent::TypingStart);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (handle, rx) = SignalingHandle::channel(4);
        drop(rx);
        assert!(handle.is_closed());
        assert!(matches!(
            handle.send(ClientEvent::LeaveRoom).await,
            Err(ClientError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let result = SignalingConnection::connect("ws://127.0.0.1:1/ws").await;
        assert!(matches!(result, Err(ClientError::Connect(_))));
    }
}
