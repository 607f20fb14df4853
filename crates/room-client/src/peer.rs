//! Media engine seam.
//!
//! The client core never touches media. It drives a [`PeerConnection`] per
//! peer link and asks a [`MediaSource`] for local tracks; whatever engine
//! sits behind these traits does the capture, encoding and transport.
//!
//! Engine callbacks (gathered candidates, remote tracks, failures) come back
//! as [`PeerEvent`]s on the channel handed to the factory.

use crate::errors::{ClientError, NegotiationError};

use async_trait::async_trait;
use common::types::{ConnectionId, MediaKind};
use room_protocol::{IceCandidateInit, SessionDescription};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Opaque reference to a local or remote media track.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaTrack {
    pub id: String,
    pub kind: MediaKind,
}

impl MediaTrack {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// One underlying peer connection object.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError>;

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), NegotiationError>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), NegotiationError>;

    /// Only valid once a remote description has been applied.
    async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<(), NegotiationError>;

    async fn add_track(&self, track: MediaTrack) -> Result<(), NegotiationError>;

    /// Release the connection. Must be safe to call more than once.
    async fn close(&self);
}

/// Creates connection objects for new peer links.
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(
        &self,
        peer: ConnectionId,
        kind: MediaKind,
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>, NegotiationError>;
}

/// Local capture ("given a capture request, returns tracks or fails").
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Microphone for `Audio`, screen for `Video`.
    async fn capture(&self, kind: MediaKind) -> Result<Vec<MediaTrack>, ClientError>;

    /// Stop tracks previously returned by [`MediaSource::capture`].
    async fn release(&self, tracks: &[MediaTrack]);
}

/// Engine callback for one peer link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEvent {
    pub peer: ConnectionId,
    pub kind: MediaKind,
    pub event: PeerEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEventKind {
    /// Gathered a local candidate; trickle it to the peer.
    LocalCandidate(IceCandidateInit),
    /// Peer started sending a track.
    RemoteTrack(MediaTrack),
    /// Connection failed (ICE, DTLS); the link is finished.
    Failed(String),
}

/// Sending half of the engine callback channel, bound to one link.
#[derive(Debug, Clone)]
pub struct PeerEventSender {
    peer: ConnectionId,
    kind: MediaKind,
    sender: mpsc::UnboundedSender<PeerEvent>,
}

impl PeerEventSender {
    #[must_use]
    pub fn new(peer: ConnectionId, kind: MediaKind, sender: mpsc::UnboundedSender<PeerEvent>) -> Self {
        Self { peer, kind, sender }
    }

    #[must_use]
    pub fn peer(&self) -> ConnectionId {
        self.peer
    }

    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Report an engine event. Returns false once the client has gone away.
    pub fn emit(&self, event: PeerEventKind) -> bool {
        self.sender
            .send(PeerEvent {
                peer: self.peer,
                kind: self.kind,
                event,
            })
            .is_ok()
    }
}
