//! Client core: routes server events and engine callbacks to the room view
//! and the media sessions, and turns user actions into client events.

use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::file_share::{ack_result, encode_upload, PendingUploads};
use crate::peer::{MediaSource, PeerConnectionFactory, PeerEvent};
use crate::room_view::RoomView;
use crate::session::{ScreenSession, VoiceSession};
use crate::signaling::SignalingHandle;
use crate::typing::TypingHandle;

use common::types::{MediaKind, RoomId};
use room_protocol::{ClientEvent, FileShareAck, Password, ServerEvent};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Message for uploads cut short by leaving or disconnecting.
const UPLOAD_ABORTED: &str = "Left the room before the upload was acknowledged";

pub struct RoomClient {
    config: ClientConfig,
    outbox: SignalingHandle,
    view: RoomView,
    voice: VoiceSession,
    screen: ScreenSession,
    typing: TypingHandle,
    typing_task: JoinHandle<()>,
    uploads: PendingUploads,
    username: Option<String>,
}

impl RoomClient {
    /// Build a client sending through `outbox`.
    ///
    /// The returned receiver carries engine callbacks; feed them back
    /// through [`RoomClient::handle_peer_event`].
    #[must_use]
    pub fn new(
        config: ClientConfig,
        outbox: SignalingHandle,
        factory: Arc<dyn PeerConnectionFactory>,
        media: Arc<dyn MediaSource>,
    ) -> (Self, mpsc::UnboundedReceiver<PeerEvent>) {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let (typing, typing_task) = TypingHandle::spawn(outbox.clone(), config.typing_idle());
        let client = Self {
            voice: VoiceSession::new(
                Arc::clone(&factory),
                Arc::clone(&media),
                outbox.clone(),
                peer_tx.clone(),
            ),
            screen: ScreenSession::new(factory, media, outbox.clone(), peer_tx),
            config,
            outbox,
            view: RoomView::new(),
            typing,
            typing_task,
            uploads: PendingUploads::new(),
            username: None,
        };
        (client, peer_rx)
    }

    #[must_use]
    pub fn view(&self) -> &RoomView {
        &self.view
    }

    #[must_use]
    pub fn voice(&self) -> &VoiceSession {
        &self.voice
    }

    #[must_use]
    pub fn screen(&self) -> &ScreenSession {
        &self.screen
    }

    pub async fn join(
        &mut self,
        room_id: impl Into<RoomId>,
        username: impl Into<String>,
        password: Option<&str>,
    ) -> Result<(), ClientError> {
        let username = username.into();
        self.username = Some(username.clone());
        self.outbox
            .send(ClientEvent::JoinRoom {
                room_id: room_id.into(),
                username,
                password: password.map(Password::new),
            })
            .await
    }

    pub async fn leave(&mut self) -> Result<(), ClientError> {
        self.screen.stop_sharing(self.view.room_id().cloned()).await;
        self.outbox.send(ClientEvent::LeaveRoom).await
    }

    /// Send a chat message, ending any typing burst first.
    pub async fn send_chat(&mut self, text: &str) -> Result<(), ClientError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        self.typing.stop_now().await;
        self.outbox
            .send(ClientEvent::ChatMessage {
                username: self.username.clone(),
                text: text.to_string(),
            })
            .await
    }

    pub fn keystroke(&self) {
        if self.view.is_joined() {
            self.typing.keystroke();
        }
    }

    /// Share a file; the receiver resolves when the server acknowledges it.
    pub async fn share_file(
        &mut self,
        file_name: &str,
        file_type: &str,
        bytes: &[u8],
    ) -> Result<oneshot::Receiver<FileShareAck>, ClientError> {
        let room = self.view.room_id().cloned().ok_or(ClientError::NotInRoom)?;
        let upload = encode_upload(
            file_name,
            file_type,
            bytes,
            self.username.as_deref().unwrap_or_default(),
            Some(room),
            self.config.max_upload_bytes,
        )?;

        self.outbox.send(upload.event).await?;
        self.view.push_local(upload.local_entry);
        Ok(self.uploads.push())
    }

    /// [`RoomClient::share_file`] and wait for the acknowledgement.
    pub async fn share_file_and_wait(
        &mut self,
        file_name: &str,
        file_type: &str,
        bytes: &[u8],
        inbound: &mut mpsc::Receiver<ServerEvent>,
    ) -> Result<(), ClientError> {
        let mut ack = self.share_file(file_name, file_type, bytes).await?;
        loop {
            tokio::select! {
                result = &mut ack => {
                    return result
                        .map_err(|_| ClientError::UploadFailed(UPLOAD_ABORTED.to_string()))
                        .and_then(ack_result);
                }
                event = inbound.recv() => match event {
                    Some(event) => self.handle_server_event(event).await,
                    None => {
                        self.uploads.fail_all(UPLOAD_ABORTED);
                        return Err(ClientError::Closed);
                    }
                },
            }
        }
    }

    pub async fn set_muted(&self, muted: bool) -> Result<(), ClientError> {
        let event = if muted {
            ClientEvent::MicMuted
        } else {
            ClientEvent::MicUnmuted
        };
        self.outbox.send(event).await
    }

    pub async fn set_deafened(&self, deafened: bool) -> Result<(), ClientError> {
        let event = if deafened {
            ClientEvent::SpeakerMuted
        } else {
            ClientEvent::SpeakerUnmuted
        };
        self.outbox.send(event).await
    }

    /// Report the local voice-activity state (detection happens elsewhere).
    pub async fn set_speaking(&self, speaking: bool) -> Result<(), ClientError> {
        let event = if speaking {
            ClientEvent::SpeakingStart
        } else {
            ClientEvent::SpeakingStop
        };
        self.outbox.send(event).await
    }

    /// Capture the microphone and offer audio to everyone in the room.
    pub async fn start_voice(&mut self) -> Result<(), ClientError> {
        self.voice.start_microphone().await?;
        let participants = self.view.participants().to_vec();
        self.voice.on_participants(&participants).await;
        Ok(())
    }

    pub async fn stop_voice(&mut self) {
        self.voice.stop_microphone().await;
    }

    pub async fn start_screen_share(&mut self) -> Result<(), ClientError> {
        if !self.view.is_joined() {
            return Err(ClientError::NotInRoom);
        }
        let participants = self.view.participants().to_vec();
        self.screen.start_sharing(&participants).await
    }

    pub async fn stop_screen_share(&mut self) {
        self.screen.stop_sharing(self.view.room_id().cloned()).await;
    }

    /// Apply one server event.
    pub async fn handle_server_event(&mut self, event: ServerEvent) {
        self.view.apply(&event);

        match event {
            ServerEvent::Connected { id } => {
                info!(target: "rc.session", connection_id = %id, "Connected to room service");
                self.voice.set_local_id(id);
                self.screen.set_local_id(id);
            }
            ServerEvent::ParticipantsSync(participants) => {
                self.voice.on_participants(&participants).await;
                self.screen.on_participants(&participants).await;
            }
            ServerEvent::Offer { from, offer, kind } => match kind {
                MediaKind::Audio => self.voice.on_offer(from, offer).await,
                MediaKind::Video => self.screen.on_offer(from, offer).await,
            },
            ServerEvent::Answer { from, answer, kind } => match kind {
                MediaKind::Audio => self.voice.on_answer(from, answer).await,
                MediaKind::Video => self.screen.on_answer(from, answer).await,
            },
            ServerEvent::IceCandidate {
                from,
                candidate,
                kind,
            } => match kind {
                MediaKind::Audio => self.voice.on_candidate(from, candidate).await,
                MediaKind::Video => self.screen.on_candidate(from, candidate).await,
            },
            ServerEvent::PresenterStop { id } => {
                let room = self.view.room_id().cloned();
                self.screen.on_presenter_stop(id, room).await;
            }
            ServerEvent::StopSharing { from } => self.screen.on_stop_sharing(from).await,
            ServerEvent::UserLeft { id, .. } => {
                self.voice.remove_peer(id).await;
                self.screen.remove_peer(id).await;
            }
            ServerEvent::FileShareAck(ack) => {
                if !self.uploads.resolve(ack) {
                    debug!(target: "rc.session", "Unexpected file-share-ack");
                }
            }
            ServerEvent::LeftRoom | ServerEvent::JoinError(_) => {
                self.uploads.fail_all(UPLOAD_ABORTED);
                self.voice.close_all().await;
                self.screen.close_all().await;
            }
            _ => {}
        }
    }

    pub async fn handle_peer_event(&mut self, event: PeerEvent) {
        match event.kind {
            MediaKind::Audio => self.voice.on_peer_event(event).await,
            MediaKind::Video => self.screen.on_peer_event(event).await,
        }
    }

    /// Process the next server event or engine callback.
    ///
    /// Returns false once the signaling connection is gone.
    pub async fn process_next(
        &mut self,
        inbound: &mut mpsc::Receiver<ServerEvent>,
        peer_events: &mut mpsc::UnboundedReceiver<PeerEvent>,
    ) -> bool {
        tokio::select! {
            event = inbound.recv() => match event {
                Some(event) => {
                    self.handle_server_event(event).await;
                    true
                }
                None => {
                    self.uploads.fail_all(UPLOAD_ABORTED);
                    false
                }
            },
            Some(event) = peer_events.recv() => {
                self.handle_peer_event(event).await;
                true
            }
        }
    }

    /// Stop background work and close every link.
    pub async fn shutdown(mut self) {
        self.typing.cancel();
        self.voice.stop_microphone().await;
        self.screen.close_all().await;
        let _ = self.typing_task.await;
    }
}
