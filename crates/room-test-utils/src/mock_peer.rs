//! Scriptable media engine for client tests.
//!
//! `MockPeerConnection` records every call, enforces the one rule real
//! engines enforce (no candidates before a remote description) and can be
//! told to fail a given operation.
//!
//! # Example
//!
//! ```rust,ignore
//! use room_test_utils::*;
//!
//! let factory = MockPeerConnectionFactory::new();
//! let media = MockMediaSource::new();
//!
//! // ... drive a session ...
//!
//! let link = factory.connection(peer, MediaKind::Video).unwrap();
//! assert_eq!(link.calls().first(), Some(&PeerCall::AddTrack("screen-0".into())));
//! ```

use async_trait::async_trait;
use common::types::{ConnectionId, MediaKind};
use room_client::errors::{ClientError, NegotiationError};
use room_client::peer::{
    MediaSource, MediaTrack, PeerConnection, PeerConnectionFactory, PeerEventKind,
    PeerEventSender,
};
use room_protocol::{IceCandidateInit, SdpType, SessionDescription};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One call made on a `MockPeerConnection`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerCall {
    CreateOffer,
    CreateAnswer,
    SetLocal(SdpType, String),
    SetRemote(SdpType, String),
    AddCandidate(String),
    AddTrack(String),
    Close,
}

/// Operations that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerOp {
    CreateOffer,
    CreateAnswer,
    SetLocal,
    SetRemote,
    AddCandidate,
    AddTrack,
}

#[derive(Debug)]
pub struct MockPeerConnection {
    peer: ConnectionId,
    kind: MediaKind,
    events: PeerEventSender,
    calls: Mutex<Vec<PeerCall>>,
    failing: Mutex<HashSet<PeerOp>>,
    has_remote: AtomicBool,
    descriptions: AtomicUsize,
}

impl MockPeerConnection {
    pub fn new(events: PeerEventSender) -> Self {
        Self {
            peer: events.peer(),
            kind: events.kind(),
            events,
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            has_remote: AtomicBool::new(false),
            descriptions: AtomicUsize::new(0),
        }
    }

    pub fn peer(&self) -> ConnectionId {
        self.peer
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Make `op` fail from now on.
    pub fn fail_on(&self, op: PeerOp) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn calls(&self) -> Vec<PeerCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Candidates applied, in order.
    pub fn applied_candidates(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PeerCall::AddCandidate(candidate) => Some(candidate),
                _ => None,
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.calls().contains(&PeerCall::Close)
    }

    /// Fire an engine callback as if the engine produced it.
    pub fn emit(&self, event: PeerEventKind) -> bool {
        self.events.emit(event)
    }

    /// Report a gathered local candidate.
    pub fn gather(&self, candidate: &str) -> bool {
        self.emit(PeerEventKind::LocalCandidate(IceCandidateInit::new(candidate)))
    }

    /// Report a connection failure.
    pub fn break_connection(&self, reason: &str) -> bool {
        self.emit(PeerEventKind::Failed(reason.to_string()))
    }

    fn record(&self, call: PeerCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, op: PeerOp) -> Result<(), NegotiationError> {
        if self.failing.lock().unwrap().contains(&op) {
            let reason = format!("scripted {:?} failure", op);
            return Err(match op {
                PeerOp::SetLocal | PeerOp::SetRemote => NegotiationError::Description(reason),
                PeerOp::AddCandidate => NegotiationError::Candidate(reason),
                _ => NegotiationError::Engine(reason),
            });
        }
        Ok(())
    }

    fn next_sdp(&self, role: &str) -> String {
        let n = self.descriptions.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}-{}", role, self.kind, n)
    }
}

#[async_trait]
impl PeerConnection for MockPeerConnection {
    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError> {
        self.record(PeerCall::CreateOffer);
        self.check(PeerOp::CreateOffer)?;
        Ok(SessionDescription::offer(self.next_sdp("offer")))
    }

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
        self.record(PeerCall::CreateAnswer);
        self.check(PeerOp::CreateAnswer)?;
        Ok(SessionDescription::answer(self.next_sdp("answer")))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), NegotiationError> {
        self.record(PeerCall::SetLocal(desc.sdp_type, desc.sdp));
        self.check(PeerOp::SetLocal)
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), NegotiationError> {
        self.record(PeerCall::SetRemote(desc.sdp_type, desc.sdp));
        self.check(PeerOp::SetRemote)?;
        self.has_remote.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<(), NegotiationError> {
        if !self.has_remote.load(Ordering::SeqCst) {
            return Err(NegotiationError::Candidate(
                "candidate before remote description".to_string(),
            ));
        }
        self.record(PeerCall::AddCandidate(candidate.candidate));
        self.check(PeerOp::AddCandidate)
    }

    async fn add_track(&self, track: MediaTrack) -> Result<(), NegotiationError> {
        self.record(PeerCall::AddTrack(track.id));
        self.check(PeerOp::AddTrack)
    }

    async fn close(&self) {
        self.record(PeerCall::Close);
    }
}

/// Factory handing out `MockPeerConnection`s and keeping them for inspection.
#[derive(Debug, Default)]
pub struct MockPeerConnectionFactory {
    created: Mutex<Vec<Arc<MockPeerConnection>>>,
    fail_create: AtomicBool,
    /// Applied to every connection created from now on.
    fail_ops: Mutex<HashMap<ConnectionId, HashSet<PeerOp>>>,
}

impl MockPeerConnectionFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every `create` call fail.
    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    /// Connections to `peer` created from now on fail `op`.
    pub fn fail_for(&self, peer: ConnectionId, op: PeerOp) {
        self.fail_ops
            .lock()
            .unwrap()
            .entry(peer)
            .or_default()
            .insert(op);
    }

    /// Every connection created so far, oldest first.
    pub fn created(&self) -> Vec<Arc<MockPeerConnection>> {
        self.created.lock().unwrap().clone()
    }

    /// Most recent connection for `peer` and `kind`.
    pub fn connection(&self, peer: ConnectionId, kind: MediaKind) -> Option<Arc<MockPeerConnection>> {
        self.created()
            .into_iter()
            .rev()
            .find(|c| c.peer() == peer && c.kind() == kind)
    }

    /// How many connections were created for `peer` and `kind`.
    pub fn created_for(&self, peer: ConnectionId, kind: MediaKind) -> usize {
        self.created()
            .iter()
            .filter(|c| c.peer() == peer && c.kind() == kind)
            .count()
    }
}

#[async_trait]
impl PeerConnectionFactory for MockPeerConnectionFactory {
    async fn create(
        &self,
        peer: ConnectionId,
        _kind: MediaKind,
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>, NegotiationError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(NegotiationError::Engine("scripted create failure".to_string()));
        }
        let connection = Arc::new(MockPeerConnection::new(events));
        if let Some(ops) = self.fail_ops.lock().unwrap().get(&peer) {
            for op in ops {
                connection.fail_on(*op);
            }
        }
        self.created.lock().unwrap().push(Arc::clone(&connection));
        Ok(connection)
    }
}

/// Capture source returning fixed tracks, or failing.
#[derive(Debug, Default)]
pub struct MockMediaSource {
    denied: Mutex<HashSet<MediaKind>>,
    captures: AtomicUsize,
    released: Mutex<Vec<MediaTrack>>,
}

impl MockMediaSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make captures of `kind` fail, as when the user refuses permission.
    pub fn deny(&self, kind: MediaKind) {
        self.denied.lock().unwrap().insert(kind);
    }

    pub fn allow(&self, kind: MediaKind) {
        self.denied.lock().unwrap().remove(&kind);
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> Vec<MediaTrack> {
        self.released.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaSource for MockMediaSource {
    async fn capture(&self, kind: MediaKind) -> Result<Vec<MediaTrack>, ClientError> {
        if self.denied.lock().unwrap().contains(&kind) {
            return Err(ClientError::Media {
                kind,
                reason: "permission denied".to_string(),
            });
        }
        let n = self.captures.fetch_add(1, Ordering::SeqCst);
        let prefix = match kind {
            MediaKind::Audio => "mic",
            MediaKind::Video => "screen",
        };
        Ok(vec![MediaTrack::new(format!("{}-{}", prefix, n), kind)])
    }

    async fn release(&self, tracks: &[MediaTrack]) {
        self.released.lock().unwrap().extend_from_slice(tracks);
    }
}
