//! Offer/answer state machine for one remote peer and one media kind.
//!
//! ```text
//! Idle ──create_offer──▶ OfferSent ──accept_answer──▶ Stable
//!   │                                                   │
//!   └──accept_offer──▶ OfferReceived ──(answer sent)──▶ Stable
//!
//! any ──close──▶ Closed
//! ```
//!
//! Remote ICE candidates that arrive before a remote description exists are
//! queued and applied exactly once, in arrival order, right after the remote
//! description lands; one the engine rejects is logged and skipped without
//! holding up the rest. Candidates for a peer that has no link yet wait in
//! [`PeerLinks`] and move into the link when it is created.

use crate::errors::NegotiationError;
use crate::peer::{MediaTrack, PeerConnection};

use common::types::{ConnectionId, MediaKind};
use room_protocol::{IceCandidateInit, SessionDescription};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    OfferSent,
    OfferReceived,
    Stable,
    Closed,
}

/// What happened to an inbound answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    Applied,
    /// No offer outstanding (duplicate or late answer).
    Ignored,
}

/// What happened to an inbound ICE candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOutcome {
    Applied,
    Queued,
}

pub struct PeerLink {
    peer: ConnectionId,
    kind: MediaKind,
    state: LinkState,
    connection: Arc<dyn PeerConnection>,
    tracks: Vec<MediaTrack>,
    pending_candidates: VecDeque<IceCandidateInit>,
    has_remote_description: bool,
}

impl std::fmt::Debug for PeerLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerLink")
            .field("peer", &self.peer)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("tracks", &self.tracks.len())
            .field("pending_candidates", &self.pending_candidates.len())
            .finish_non_exhaustive()
    }
}

impl PeerLink {
    #[must_use]
    pub fn new(peer: ConnectionId, kind: MediaKind, connection: Arc<dyn PeerConnection>) -> Self {
        Self {
            peer,
            kind,
            state: LinkState::Idle,
            connection,
            tracks: Vec::new(),
            pending_candidates: VecDeque::new(),
            has_remote_description: false,
        }
    }

    #[must_use]
    pub fn peer(&self) -> ConnectionId {
        self.peer
    }

    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    #[must_use]
    pub fn state(&self) -> LinkState {
        self.state
    }

    #[must_use]
    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    #[must_use]
    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    #[must_use]
    pub fn has_remote_description(&self) -> bool {
        self.has_remote_description
    }

    /// Add any tracks the link does not carry yet.
    ///
    /// Returns true when something was added, i.e. the link needs a fresh
    /// offer to carry it.
    pub async fn attach_tracks(&mut self, tracks: &[MediaTrack]) -> Result<bool, NegotiationError> {
        self.ensure_open()?;
        let mut added = false;
        for track in tracks {
            if self.tracks.contains(track) {
                continue;
            }
            self.connection.add_track(track.clone()).await?;
            self.tracks.push(track.clone());
            added = true;
        }
        Ok(added)
    }

    /// Generate and apply a local offer. Allowed from `Idle` and, for
    /// renegotiation, from `Stable`.
    pub async fn create_offer(&mut self) -> Result<SessionDescription, NegotiationError> {
        self.ensure_state(&[LinkState::Idle, LinkState::Stable], "create offer")?;

        let offer = self.connection.create_offer().await?;
        self.connection.set_local_description(offer.clone()).await?;
        self.state = LinkState::OfferSent;

        debug!(
            target: "rc.negotiation",
            peer = %self.peer,
            kind = %self.kind,
            "Offer created"
        );
        Ok(offer)
    }

    /// Apply a remote offer and produce the answer to send back.
    pub async fn accept_offer(
        &mut self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, NegotiationError> {
        self.ensure_state(&[LinkState::Idle, LinkState::Stable], "accept offer")?;
        self.state = LinkState::OfferReceived;

        self.apply_remote_description(offer).await?;

        let answer = self.connection.create_answer().await?;
        self.connection.set_local_description(answer.clone()).await?;
        self.state = LinkState::Stable;

        debug!(
            target: "rc.negotiation",
            peer = %self.peer,
            kind = %self.kind,
            "Answer created"
        );
        Ok(answer)
    }

    /// Apply the answer to our outstanding offer.
    pub async fn accept_answer(
        &mut self,
        answer: SessionDescription,
    ) -> Result<AnswerOutcome, NegotiationError> {
        self.ensure_open()?;
        if self.state != LinkState::OfferSent {
            debug!(
                target: "rc.negotiation",
                peer = %self.peer,
                kind = %self.kind,
                state = ?self.state,
                "Ignoring answer without outstanding offer"
            );
            return Ok(AnswerOutcome::Ignored);
        }

        self.apply_remote_description(answer).await?;
        self.state = LinkState::Stable;
        Ok(AnswerOutcome::Applied)
    }

    /// Apply a remote candidate now, or queue it until a remote description
    /// exists.
    pub async fn add_remote_candidate(
        &mut self,
        candidate: IceCandidateInit,
    ) -> Result<CandidateOutcome, NegotiationError> {
        self.ensure_open()?;
        if self.has_remote_description {
            self.connection.add_ice_candidate(candidate).await?;
            Ok(CandidateOutcome::Applied)
        } else {
            self.pending_candidates.push_back(candidate);
            Ok(CandidateOutcome::Queued)
        }
    }

    /// Close the connection and drop tracks and queued candidates.
    pub async fn close(&mut self) {
        if self.state == LinkState::Closed {
            return;
        }
        self.state = LinkState::Closed;
        self.pending_candidates.clear();
        self.tracks.clear();
        self.connection.close().await;
    }

    fn queue_candidates(&mut self, candidates: VecDeque<IceCandidateInit>) {
        self.pending_candidates.extend(candidates);
    }

    async fn apply_remote_description(
        &mut self,
        desc: SessionDescription,
    ) -> Result<(), NegotiationError> {
        self.connection.set_remote_description(desc).await?;
        self.has_remote_description = true;

        let queued = self.pending_candidates.len();
        let mut rejected = 0usize;
        while let Some(candidate) = self.pending_candidates.pop_front() {
            // One bad candidate must not cost the ones behind it.
            if let Err(e) = self.connection.add_ice_candidate(candidate).await {
                rejected += 1;
                warn!(
                    target: "rc.negotiation",
                    peer = %self.peer,
                    kind = %self.kind,
                    error = %e,
                    "Error adding queued ICE candidate"
                );
            }
        }
        if queued > 0 {
            debug!(
                target: "rc.negotiation",
                peer = %self.peer,
                kind = %self.kind,
                queued,
                rejected,
                "Applied queued ICE candidates"
            );
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), NegotiationError> {
        if self.state == LinkState::Closed {
            return Err(NegotiationError::Closed);
        }
        Ok(())
    }

    fn ensure_state(
        &self,
        allowed: &[LinkState],
        operation: &'static str,
    ) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(NegotiationError::InvalidState {
                state: self.state,
                operation,
            })
        }
    }
}

/// Every link of one media kind, keyed by remote peer.
#[derive(Debug)]
pub struct PeerLinks {
    kind: MediaKind,
    links: HashMap<ConnectionId, PeerLink>,
    /// Candidates from peers we have no link with yet.
    early_candidates: HashMap<ConnectionId, VecDeque<IceCandidateInit>>,
}

impl PeerLinks {
    #[must_use]
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            links: HashMap::new(),
            early_candidates: HashMap::new(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    #[must_use]
    pub fn contains(&self, peer: ConnectionId) -> bool {
        self.links.contains_key(&peer)
    }

    #[must_use]
    pub fn get(&self, peer: ConnectionId) -> Option<&PeerLink> {
        self.links.get(&peer)
    }

    pub fn get_mut(&mut self, peer: ConnectionId) -> Option<&mut PeerLink> {
        self.links.get_mut(&peer)
    }

    #[must_use]
    pub fn state(&self, peer: ConnectionId) -> Option<LinkState> {
        self.links.get(&peer).map(PeerLink::state)
    }

    #[must_use]
    pub fn peers(&self) -> Vec<ConnectionId> {
        let mut peers: Vec<_> = self.links.keys().copied().collect();
        peers.sort();
        peers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Candidates waiting for a link with `peer`.
    #[must_use]
    pub fn early_candidates(&self, peer: ConnectionId) -> usize {
        self.early_candidates.get(&peer).map_or(0, VecDeque::len)
    }

    /// Drop held candidates for peers not in `present`.
    pub fn retain_early_candidates(&mut self, present: &HashSet<ConnectionId>) {
        self.early_candidates.retain(|peer, _| present.contains(peer));
    }

    /// Register a new link, handing it any candidates that arrived first.
    ///
    /// A previous link with the same peer is replaced without being closed.
    pub fn insert(&mut self, mut link: PeerLink) -> &mut PeerLink {
        let peer = link.peer();
        if let Some(early) = self.early_candidates.remove(&peer) {
            link.queue_candidates(early);
        }
        match self.links.entry(peer) {
            Entry::Occupied(mut entry) => {
                entry.insert(link);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(link),
        }
    }

    /// Route a remote candidate to its link, or hold it until one exists.
    pub async fn add_remote_candidate(
        &mut self,
        peer: ConnectionId,
        candidate: IceCandidateInit,
    ) -> Result<CandidateOutcome, NegotiationError> {
        match self.links.get_mut(&peer) {
            Some(link) => link.add_remote_candidate(candidate).await,
            None => {
                self.early_candidates
                    .entry(peer)
                    .or_default()
                    .push_back(candidate);
                Ok(CandidateOutcome::Queued)
            }
        }
    }

    /// Close and forget the link with `peer`, including held candidates.
    pub async fn close(&mut self, peer: ConnectionId) -> bool {
        self.early_candidates.remove(&peer);
        match self.links.remove(&peer) {
            Some(mut link) => {
                link.close().await;
                true
            }
            None => false,
        }
    }

    pub async fn close_all(&mut self) {
        self.early_candidates.clear();
        for (_, mut link) in self.links.drain() {
            link.close().await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records candidate order and remote-description timing.
    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<String>>,
        /// Candidate line the engine rejects.
        reject_candidate: Option<&'static str>,
    }

    impl Recorder {
        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn push(&self, entry: impl Into<String>) {
            self.log.lock().unwrap().push(entry.into());
        }
    }

    #[async_trait]
    impl PeerConnection for Recorder {
        async fn create_offer(&self) -> Result<SessionDescription, NegotiationError> {
            self.push("create_offer");
            Ok(SessionDescription::offer("local-offer"))
        }

        async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
            self.push("create_answer");
            Ok(SessionDescription::answer("local-answer"))
        }

        async fn set_local_description(&self, desc: SessionDescription) -> Result<(), NegotiationError> {
            self.push(format!("local:{}", desc.sdp));
            Ok(())
        }

        async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), NegotiationError> {
            self.push(format!("remote:{}", desc.sdp));
            Ok(())
        }

        async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<(), NegotiationError> {
            if self.reject_candidate == Some(candidate.candidate.as_str()) {
                return Err(NegotiationError::Candidate(candidate.candidate));
            }
            self.push(format!("ice:{}", candidate.candidate));
            Ok(())
        }

        async fn add_track(&self, track: MediaTrack) -> Result<(), NegotiationError> {
            self.push(format!("track:{}", track.id));
            Ok(())
        }

        async fn close(&self) {
            self.push("close");
        }
    }

    fn link_with(recorder: &Arc<Recorder>) -> PeerLink {
        PeerLink::new(
            ConnectionId::new(),
            MediaKind::Video,
            Arc::clone(recorder) as Arc<dyn PeerConnection>,
        )
    }

    #[tokio::test]
    async fn test_initiator_flow() {
        let recorder = Arc::new(Recorder::default());
        let mut link = link_with(&recorder);
        assert_eq!(link.state(), LinkState::Idle);

        let offer = link.create_offer().await.unwrap();
        assert_eq!(offer.sdp, "local-offer");
        assert_eq!(link.state(), LinkState::OfferSent);

        let outcome = link
            .accept_answer(SessionDescription::answer("remote-answer"))
            .await
            .unwrap();
        assert_eq!(outcome, AnswerOutcome::Applied);
        assert_eq!(link.state(), LinkState::Stable);
        assert_eq!(
            recorder.log(),
            vec!["create_offer", "local:local-offer", "remote:remote-answer"]
        );
    }

    #[tokio::test]
    async fn test_responder_drains_queue_before_answering() {
        let recorder = Arc::new(Recorder::default());
        let mut link = link_with(&recorder);

        for n in 1..=3 {
            let outcome = link
                .add_remote_candidate(IceCandidateInit::new(format!("c{n}")))
                .await
                .unwrap();
            assert_eq!(outcome, CandidateOutcome::Queued);
        }
        assert_eq!(link.pending_candidates(), 3);

        link.accept_offer(SessionDescription::offer("remote-offer"))
            .await
            .unwrap();

        assert_eq!(link.state(), LinkState::Stable);
        assert_eq!(link.pending_candidates(), 0);
        assert_eq!(
            recorder.log(),
            vec![
                "remote:remote-offer",
                "ice:c1",
                "ice:c2",
                "ice:c3",
                "create_answer",
                "local:local-answer",
            ]
        );
    }

    #[tokio::test]
    async fn test_candidate_applied_immediately_after_remote_description() {
        let recorder = Arc::new(Recorder::default());
        let mut link = link_with(&recorder);
        link.accept_offer(SessionDescription::offer("o")).await.unwrap();

        let outcome = link
            .add_remote_candidate(IceCandidateInit::new("late"))
            .await
            .unwrap();
        assert_eq!(outcome, CandidateOutcome::Applied);
        assert_eq!(recorder.log().last().unwrap(), "ice:late");
    }

    #[tokio::test]
    async fn test_answer_without_offer_ignored() {
        let recorder = Arc::new(Recorder::default());
        let mut link = link_with(&recorder);
        link.create_offer().await.unwrap();
        link.accept_answer(SessionDescription::answer("a1")).await.unwrap();

        let second = link
            .accept_answer(SessionDescription::answer("a2"))
            .await
            .unwrap();
        assert_eq!(second, AnswerOutcome::Ignored);
        assert!(!recorder.log().contains(&"remote:a2".to_string()));
    }

    #[tokio::test]
    async fn test_offer_while_offer_outstanding_rejected() {
        let recorder = Arc::new(Recorder::default());
        let mut link = link_with(&recorder);
        link.create_offer().await.unwrap();

        let err = link
            .accept_offer(SessionDescription::offer("glare"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            NegotiationError::InvalidState {
                state: LinkState::OfferSent,
                operation: "accept offer",
            }
        );
    }

    #[tokio::test]
    async fn test_renegotiation_from_stable() {
        let recorder = Arc::new(Recorder::default());
        let mut link = link_with(&recorder);
        link.accept_offer(SessionDescription::offer("o")).await.unwrap();

        assert!(link
            .attach_tracks(&[MediaTrack::new("screen", MediaKind::Video)])
            .await
            .unwrap());
        link.create_offer().await.unwrap();
        assert_eq!(link.state(), LinkState::OfferSent);
    }

    #[tokio::test]
    async fn test_attach_tracks_skips_known() {
        let recorder = Arc::new(Recorder::default());
        let mut link = link_with(&recorder);
        let track = MediaTrack::new("mic", MediaKind::Audio);

        assert!(link.attach_tracks(&[track.clone()]).await.unwrap());
        assert!(!link.attach_tracks(&[track]).await.unwrap());
        assert_eq!(link.tracks().len(), 1);
        assert_eq!(recorder.log(), vec!["track:mic"]);
    }

    #[tokio::test]
    async fn test_close_clears_and_rejects_further_use() {
        let recorder = Arc::new(Recorder::default());
        let mut link = link_with(&recorder);
        link.attach_tracks(&[MediaTrack::new("t", MediaKind::Video)])
            .await
            .unwrap();
        link.add_remote_candidate(IceCandidateInit::new("c"))
            .await
            .unwrap();

        link.close().await;
        link.close().await;

        assert_eq!(link.state(), LinkState::Closed);
        assert!(link.tracks().is_empty());
        assert_eq!(link.pending_candidates(), 0);
        assert_eq!(recorder.log().iter().filter(|e| *e == "close").count(), 1);
        assert_eq!(link.create_offer().await.unwrap_err(), NegotiationError::Closed);
    }

    #[tokio::test]
    async fn test_rejected_queued_candidate_does_not_stop_drain() {
        let recorder = Arc::new(Recorder {
            reject_candidate: Some("bad"),
            ..Recorder::default()
        });
        let mut link = link_with(&recorder);
        for line in ["first", "bad", "last"] {
            link.add_remote_candidate(IceCandidateInit::new(line))
                .await
                .unwrap();
        }

        let answer = link.accept_offer(SessionDescription::offer("o")).await.unwrap();
        assert_eq!(answer.sdp, "local-answer");
        assert_eq!(link.state(), LinkState::Stable);
        assert_eq!(link.pending_candidates(), 0);
        assert_eq!(
            recorder.log(),
            vec![
                "remote:o",
                "ice:first",
                "ice:last",
                "create_answer",
                "local:local-answer"
            ]
        );

        // Applied directly once a remote description exists; the caller sees it.
        let err = link
            .add_remote_candidate(IceCandidateInit::new("bad"))
            .await
            .unwrap_err();
        assert_eq!(err, NegotiationError::Candidate("bad".to_string()));
        assert_eq!(link.state(), LinkState::Stable);
    }

    #[tokio::test]
    async fn test_early_candidates_move_into_new_link() {
        let recorder = Arc::new(Recorder::default());
        let mut links = PeerLinks::new(MediaKind::Video);
        let peer = ConnectionId::new();

        links
            .add_remote_candidate(peer, IceCandidateInit::new("early1"))
            .await
            .unwrap();
        links
            .add_remote_candidate(peer, IceCandidateInit::new("early2"))
            .await
            .unwrap();
        assert_eq!(links.early_candidates(peer), 2);

        let link = links.insert(PeerLink::new(
            peer,
            MediaKind::Video,
            Arc::clone(&recorder) as Arc<dyn PeerConnection>,
        ));
        assert_eq!(link.pending_candidates(), 2);
        link.accept_offer(SessionDescription::offer("o")).await.unwrap();

        assert_eq!(links.early_candidates(peer), 0);
        let log = recorder.log();
        assert_eq!(
            log.get(1..3),
            Some(&["ice:early1".to_string(), "ice:early2".to_string()][..])
        );
    }

    #[tokio::test]
    async fn test_close_forgets_link_and_early_candidates() {
        let recorder = Arc::new(Recorder::default());
        let mut links = PeerLinks::new(MediaKind::Audio);
        let peer = ConnectionId::new();
        let stranger = ConnectionId::new();

        links.insert(PeerLink::new(
            peer,
            MediaKind::Audio,
            Arc::clone(&recorder) as Arc<dyn PeerConnection>,
        ));
        links
            .add_remote_candidate(stranger, IceCandidateInit::new("c"))
            .await
            .unwrap();

        assert!(links.close(peer).await);
        assert!(!links.close(peer).await);
        assert!(links.is_empty());

        links.close_all().await;
        assert_eq!(links.early_candidates(stranger), 0);
        assert_eq!(recorder.log(), vec!["close"]);
    }
}
