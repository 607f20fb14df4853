//! Media sessions: voice (audio links to everyone) and screen share (video
//! links from the sharer to everyone).
//!
//! Both sessions own a [`PeerLinks`] table and turn server events into link
//! operations. A description or engine failure is logged and the link is
//! torn down; nothing is retried. A rejected remote candidate only costs
//! that candidate.
//!
//! Only the side holding local tracks of a kind ever offers on its own. The
//! one collision left, two sides offering to each other at once, is broken
//! by connection id: the lower id keeps its offer, the higher id drops its
//! own link and answers.

use crate::errors::{ClientError, NegotiationError};
use crate::negotiation::{AnswerOutcome, LinkState, PeerLink, PeerLinks};
use crate::peer::{
    MediaSource, MediaTrack, PeerConnectionFactory, PeerEvent, PeerEventKind, PeerEventSender,
};
use crate::signaling::SignalingHandle;

use common::types::{ConnectionId, MediaKind, RoomId};
use room_protocol::{ClientEvent, IceCandidateInit, ParticipantSnapshot, SessionDescription};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Link table plus the plumbing every session needs.
struct LinkDriver {
    kind: MediaKind,
    local_id: Option<ConnectionId>,
    links: PeerLinks,
    factory: Arc<dyn PeerConnectionFactory>,
    outbox: SignalingHandle,
    peer_events: mpsc::UnboundedSender<PeerEvent>,
    remote_tracks: HashMap<ConnectionId, Vec<MediaTrack>>,
    /// Peers whose link failed; not offered to again until reset.
    failed: HashSet<ConnectionId>,
}

impl LinkDriver {
    fn new(
        kind: MediaKind,
        factory: Arc<dyn PeerConnectionFactory>,
        outbox: SignalingHandle,
        peer_events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Self {
        Self {
            kind,
            local_id: None,
            links: PeerLinks::new(kind),
            factory,
            outbox,
            peer_events,
            remote_tracks: HashMap::new(),
            failed: HashSet::new(),
        }
    }

    /// Other participants in a snapshot.
    fn remote_ids(&self, participants: &[ParticipantSnapshot]) -> Vec<ConnectionId> {
        participants
            .iter()
            .map(|p| p.id)
            .filter(|id| Some(*id) != self.local_id)
            .collect()
    }

    async fn open(&mut self, peer: ConnectionId) -> Result<&mut PeerLink, NegotiationError> {
        if !self.links.contains(peer) {
            let events = PeerEventSender::new(peer, self.kind, self.peer_events.clone());
            let connection = self.factory.create(peer, self.kind, events).await?;
            debug!(target: "rc.session", peer = %peer, kind = %self.kind, "Peer link created");
            return Ok(self.links.insert(PeerLink::new(peer, self.kind, connection)));
        }
        self.links
            .get_mut(peer)
            .ok_or(NegotiationError::Closed)
    }

    /// Attach `tracks` and, if anything was added or the link is fresh,
    /// send an offer.
    async fn offer_with(&mut self, peer: ConnectionId, tracks: &[MediaTrack]) {
        if self.failed.contains(&peer) {
            return;
        }
        match self.try_offer(peer, tracks).await {
            Ok(Some(offer)) => {
                let kind = self.kind;
                self.send(ClientEvent::Offer { to: peer, offer, kind }).await;
            }
            Ok(None) => {}
            Err(e) => self.fail(peer, &e).await,
        }
    }

    async fn try_offer(
        &mut self,
        peer: ConnectionId,
        tracks: &[MediaTrack],
    ) -> Result<Option<SessionDescription>, NegotiationError> {
        let link = self.open(peer).await?;
        let fresh = link.state() == LinkState::Idle;
        let added = link.attach_tracks(tracks).await?;
        if !(fresh || added) || link.state() == LinkState::OfferSent {
            return Ok(None);
        }
        link.create_offer().await.map(Some)
    }

    async fn answer(&mut self, from: ConnectionId, offer: SessionDescription, tracks: &[MediaTrack]) {
        if self.links.state(from) == Some(LinkState::OfferSent) {
            if self.keeps_own_offer(from) {
                debug!(target: "rc.session", peer = %from, kind = %self.kind, "Offer collision, keeping ours");
                return;
            }
            debug!(target: "rc.session", peer = %from, kind = %self.kind, "Offer collision, answering theirs");
            self.links.close(from).await;
        }

        // The remote side started over, so it may be offered to again.
        self.failed.remove(&from);
        match self.try_answer(from, offer, tracks).await {
            Ok(answer) => {
                let kind = self.kind;
                self.send(ClientEvent::Answer { to: from, answer, kind }).await;
            }
            Err(e) => self.fail(from, &e).await,
        }
    }

    async fn try_answer(
        &mut self,
        from: ConnectionId,
        offer: SessionDescription,
        tracks: &[MediaTrack],
    ) -> Result<SessionDescription, NegotiationError> {
        let link = self.open(from).await?;
        link.attach_tracks(tracks).await?;
        link.accept_offer(offer).await
    }

    async fn apply_answer(&mut self, from: ConnectionId, answer: SessionDescription) {
        let Some(link) = self.links.get_mut(from) else {
            debug!(target: "rc.session", peer = %from, kind = %self.kind, "Answer for unknown link");
            return;
        };
        match link.accept_answer(answer).await {
            Ok(AnswerOutcome::Applied) => {
                debug!(target: "rc.session", peer = %from, kind = %self.kind, "Link stable");
            }
            Ok(AnswerOutcome::Ignored) => {}
            Err(e) => self.fail(from, &e).await,
        }
    }

    async fn apply_candidate(&mut self, from: ConnectionId, candidate: IceCandidateInit) {
        if let Err(e) = self.links.add_remote_candidate(from, candidate).await {
            warn!(
                target: "rc.session",
                peer = %from,
                kind = %self.kind,
                error = %e,
                "Error adding ICE candidate"
            );
        }
    }

    async fn on_peer_event(&mut self, event: PeerEvent) {
        if !self.links.contains(event.peer) {
            // Late callback from a link already torn down.
            return;
        }
        match event.event {
            PeerEventKind::LocalCandidate(candidate) => {
                self.send(ClientEvent::IceCandidate {
                    to: event.peer,
                    candidate,
                    kind: self.kind,
                })
                .await;
            }
            PeerEventKind::RemoteTrack(track) => {
                self.remote_tracks.entry(event.peer).or_default().push(track);
            }
            PeerEventKind::Failed(reason) => {
                self.fail(event.peer, &NegotiationError::Engine(reason)).await;
            }
        }
    }

    async fn teardown(&mut self, peer: ConnectionId) {
        self.remote_tracks.remove(&peer);
        if self.links.close(peer).await {
            debug!(target: "rc.session", peer = %peer, kind = %self.kind, "Peer link closed");
        }
    }

    async fn teardown_all(&mut self) {
        self.remote_tracks.clear();
        self.links.close_all().await;
    }

    /// Close links to peers missing from `present`.
    async fn prune(&mut self, present: &HashSet<ConnectionId>) {
        self.failed.retain(|peer| present.contains(peer));
        self.links.retain_early_candidates(present);
        for peer in self.links.peers() {
            if !present.contains(&peer) {
                self.teardown(peer).await;
            }
        }
    }

    async fn fail(&mut self, peer: ConnectionId, error: &NegotiationError) {
        warn!(
            target: "rc.session",
            peer = %peer,
            kind = %self.kind,
            error = %error,
            "Negotiation failed, closing peer link"
        );
        self.failed.insert(peer);
        self.teardown(peer).await;
    }

    async fn send(&self, event: ClientEvent) {
        let name = event.name();
        if self.outbox.send(event).await.is_err() {
            debug!(target: "rc.session", event = name, "Signaling closed, dropping event");
        }
    }

    fn keeps_own_offer(&self, remote: ConnectionId) -> bool {
        self.local_id.is_some_and(|local| local < remote)
    }
}

/// Audio links with every other participant.
pub struct VoiceSession {
    driver: LinkDriver,
    media: Arc<dyn MediaSource>,
    microphone: Option<Vec<MediaTrack>>,
}

impl VoiceSession {
    #[must_use]
    pub fn new(
        factory: Arc<dyn PeerConnectionFactory>,
        media: Arc<dyn MediaSource>,
        outbox: SignalingHandle,
        peer_events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Self {
        Self {
            driver: LinkDriver::new(MediaKind::Audio, factory, outbox, peer_events),
            media,
            microphone: None,
        }
    }

    pub fn set_local_id(&mut self, id: ConnectionId) {
        self.driver.local_id = Some(id);
    }

    #[must_use]
    pub fn has_microphone(&self) -> bool {
        self.microphone.is_some()
    }

    /// Capture the microphone. Links are offered on the next snapshot,
    /// including links that were answered without it.
    pub async fn start_microphone(&mut self) -> Result<(), ClientError> {
        if self.microphone.is_some() {
            return Ok(());
        }
        let tracks = self.media.capture(MediaKind::Audio).await?;
        info!(target: "rc.session", tracks = tracks.len(), "Microphone started");
        self.driver.failed.clear();
        self.microphone = Some(tracks);
        Ok(())
    }

    /// Release the microphone and close every audio link.
    pub async fn stop_microphone(&mut self) {
        if let Some(tracks) = self.microphone.take() {
            self.media.release(&tracks).await;
        }
        self.driver.teardown_all().await;
    }

    /// Make sure every participant carries our microphone: new peers get a
    /// link and an offer, links answered before the microphone existed get
    /// the tracks and a fresh offer. Links to those who are gone are closed.
    pub async fn on_participants(&mut self, participants: &[ParticipantSnapshot]) {
        let remote = self.driver.remote_ids(participants);
        let present: HashSet<_> = remote.iter().copied().collect();
        self.driver.prune(&present).await;

        let Some(tracks) = self.microphone.clone() else {
            return;
        };
        for peer in remote {
            self.driver.offer_with(peer, &tracks).await;
        }
    }

    /// Answer an audio offer, sending our microphone if we have one.
    pub async fn on_offer(&mut self, from: ConnectionId, offer: SessionDescription) {
        let tracks = self.microphone.clone().unwrap_or_default();
        self.driver.answer(from, offer, &tracks).await;
    }

    pub async fn on_answer(&mut self, from: ConnectionId, answer: SessionDescription) {
        self.driver.apply_answer(from, answer).await;
    }

    pub async fn on_candidate(&mut self, from: ConnectionId, candidate: IceCandidateInit) {
        self.driver.apply_candidate(from, candidate).await;
    }

    pub async fn on_peer_event(&mut self, event: PeerEvent) {
        self.driver.on_peer_event(event).await;
    }

    pub async fn remove_peer(&mut self, peer: ConnectionId) {
        self.driver.teardown(peer).await;
    }

    pub async fn close_all(&mut self) {
        self.driver.teardown_all().await;
    }

    #[must_use]
    pub fn link_state(&self, peer: ConnectionId) -> Option<LinkState> {
        self.driver.links.state(peer)
    }

    #[must_use]
    pub fn peers(&self) -> Vec<ConnectionId> {
        self.driver.links.peers()
    }

    /// Candidates from `peer` waiting for a link to exist.
    #[must_use]
    pub fn held_candidates(&self, peer: ConnectionId) -> usize {
        self.driver.links.early_candidates(peer)
    }

    #[must_use]
    pub fn remote_tracks(&self, peer: ConnectionId) -> &[MediaTrack] {
        self.driver
            .remote_tracks
            .get(&peer)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Video links for the single shared screen.
pub struct ScreenSession {
    driver: LinkDriver,
    media: Arc<dyn MediaSource>,
    screen: Option<Vec<MediaTrack>>,
}

impl ScreenSession {
    #[must_use]
    pub fn new(
        factory: Arc<dyn PeerConnectionFactory>,
        media: Arc<dyn MediaSource>,
        outbox: SignalingHandle,
        peer_events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Self {
        Self {
            driver: LinkDriver::new(MediaKind::Video, factory, outbox, peer_events),
            media,
            screen: None,
        }
    }

    pub fn set_local_id(&mut self, id: ConnectionId) {
        self.driver.local_id = Some(id);
    }

    #[must_use]
    pub fn is_sharing(&self) -> bool {
        self.screen.is_some()
    }

    /// Capture the screen and offer it to everyone in `participants`.
    ///
    /// The first video offer is what makes the server mark us presenter.
    pub async fn start_sharing(&mut self, participants: &[ParticipantSnapshot]) -> Result<(), ClientError> {
        if self.screen.is_some() {
            return Ok(());
        }
        let tracks = self.media.capture(MediaKind::Video).await?;
        info!(target: "rc.session", tracks = tracks.len(), "Screen share started");
        self.driver.failed.clear();
        self.screen = Some(tracks);
        self.ensure_links(participants).await;
        Ok(())
    }

    /// Tell the room we stopped and close every video link.
    pub async fn stop_sharing(&mut self, room: Option<RoomId>) {
        let Some(tracks) = self.screen.take() else {
            return;
        };
        self.media.release(&tracks).await;
        self.driver.send(ClientEvent::PresenterStop).await;
        self.driver.send(ClientEvent::StopSharing { room }).await;
        self.driver.teardown_all().await;
        info!(target: "rc.session", "Screen share stopped");
    }

    pub async fn on_participants(&mut self, participants: &[ParticipantSnapshot]) {
        let remote: HashSet<_> = self.driver.remote_ids(participants).into_iter().collect();
        self.driver.prune(&remote).await;
        self.ensure_links(participants).await;
    }

    /// Viewers only ever answer; a sharer answers too when another sharer
    /// reaches it first.
    pub async fn on_offer(&mut self, from: ConnectionId, offer: SessionDescription) {
        self.driver.answer(from, offer, &[]).await;
    }

    pub async fn on_answer(&mut self, from: ConnectionId, answer: SessionDescription) {
        self.driver.apply_answer(from, answer).await;
    }

    pub async fn on_candidate(&mut self, from: ConnectionId, candidate: IceCandidateInit) {
        self.driver.apply_candidate(from, candidate).await;
    }

    pub async fn on_peer_event(&mut self, event: PeerEvent) {
        self.driver.on_peer_event(event).await;
    }

    /// `presenter-stop` for `id`.
    ///
    /// Our own id means the server handed the slot to someone else, so we
    /// stop too. For a remote presenter the viewer side closes its link;
    /// a sharer waits for the `stop-sharing` that follows.
    pub async fn on_presenter_stop(&mut self, id: ConnectionId, room: Option<RoomId>) {
        if Some(id) == self.driver.local_id {
            if self.is_sharing() {
                info!(target: "rc.session", "Presenter slot taken over, stopping share");
                self.stop_sharing(room).await;
            }
            return;
        }
        if !self.is_sharing() {
            self.driver.teardown(id).await;
        }
    }

    /// `stop-sharing` from `from`: its side of the link is gone.
    ///
    /// While sharing we rebuild the link so `from` keeps receiving us.
    pub async fn on_stop_sharing(&mut self, from: ConnectionId) {
        self.driver.teardown(from).await;
        if let Some(tracks) = self.screen.clone() {
            self.driver.offer_with(from, &tracks).await;
        }
    }

    pub async fn remove_peer(&mut self, peer: ConnectionId) {
        self.driver.teardown(peer).await;
    }

    /// Drop every link without telling the room (used after leaving).
    pub async fn close_all(&mut self) {
        if let Some(tracks) = self.screen.take() {
            self.media.release(&tracks).await;
        }
        self.driver.teardown_all().await;
    }

    #[must_use]
    pub fn link_state(&self, peer: ConnectionId) -> Option<LinkState> {
        self.driver.links.state(peer)
    }

    #[must_use]
    pub fn peers(&self) -> Vec<ConnectionId> {
        self.driver.links.peers()
    }

    #[must_use]
    pub fn remote_tracks(&self, peer: ConnectionId) -> &[MediaTrack] {
        self.driver
            .remote_tracks
            .get(&peer)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    async fn ensure_links(&mut self, participants: &[ParticipantSnapshot]) {
        let Some(tracks) = self.screen.clone() else {
            return;
        };
        for peer in self.driver.remote_ids(participants) {
            self.driver.offer_with(peer, &tracks).await;
        }
    }
}
