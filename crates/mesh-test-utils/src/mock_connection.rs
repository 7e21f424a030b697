//! Scripted connection primitive.
//!
//! [`MockPeerConnectionFactory`] hands out connections that follow the
//! offer/answer signaling-state rules (an offer from `Stable` or
//! `HaveLocalOffer`, an answer only against an outstanding offer, rollback
//! back to `Stable`) and record
//! everything done to them. Each connection has a [`MockConnectionHandle`]
//! that tests use to inspect it and to inject connection events.

use async_trait::async_trait;
use common::types::ParticipantId;
use mesh_session::media::MediaTrack;
use mesh_session::negotiation::{
    ConnectionEvent, ConnectionParts, IceCandidate, IceConnectionState, IceServer,
    NegotiationError, OfferOptions, PeerConnection, PeerConnectionFactory, RemoteTrack, SdpType,
    SenderId, SessionDescription, SignalingState,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

const EVENT_BUFFER: usize = 64;

struct ConnectionState {
    signaling_state: SignalingState,
    remote_description: Option<SessionDescription>,
    offers: Vec<OfferOptions>,
    answers: usize,
    rollbacks: usize,
    candidates: Vec<IceCandidate>,
    senders: Vec<(SenderId, MediaTrack)>,
    next_sender: u64,
    fail_next_offer: bool,
    closed: bool,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            signaling_state: SignalingState::Stable,
            remote_description: None,
            offers: Vec::new(),
            answers: 0,
            rollbacks: 0,
            candidates: Vec::new(),
            senders: Vec::new(),
            next_sender: 0,
            fail_next_offer: false,
            closed: false,
        }
    }
}

type SharedState = Arc<Mutex<ConnectionState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, ConnectionState> {
    state.lock().expect("mock connection lock poisoned")
}

struct MockPeerConnection {
    state: SharedState,
}

#[async_trait]
impl PeerConnection for MockPeerConnection {
    async fn create_offer(
        &self,
        options: OfferOptions,
    ) -> Result<SessionDescription, NegotiationError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(NegotiationError::Closed);
        }
        if std::mem::take(&mut state.fail_next_offer) {
            return Err(NegotiationError::Failed("scripted offer failure".to_string()));
        }
        state.offers.push(options);
        Ok(SessionDescription::offer(format!(
            "offer-{}-restart-{}",
            state.offers.len(),
            options.ice_restart
        )))
    }

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(NegotiationError::Closed);
        }
        if state.signaling_state != SignalingState::HaveRemoteOffer {
            return Err(NegotiationError::InvalidState(format!(
                "create_answer in {:?}",
                state.signaling_state
            )));
        }
        state.answers += 1;
        Ok(SessionDescription::answer(format!("answer-{}", state.answers)))
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(NegotiationError::Closed);
        }
        state.signaling_state = match (description.sdp_type, state.signaling_state) {
            (SdpType::Offer, SignalingState::Stable | SignalingState::HaveLocalOffer) => {
                SignalingState::HaveLocalOffer
            }
            (SdpType::Answer, SignalingState::HaveRemoteOffer) => SignalingState::Stable,
            (sdp_type, current) => {
                return Err(NegotiationError::InvalidState(format!(
                    "local {sdp_type:?} in {current:?}"
                )))
            }
        };
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(NegotiationError::Closed);
        }
        state.signaling_state = match (description.sdp_type, state.signaling_state) {
            (SdpType::Offer, SignalingState::Stable) => SignalingState::HaveRemoteOffer,
            (SdpType::Answer, SignalingState::HaveLocalOffer) => SignalingState::Stable,
            (sdp_type, current) => {
                return Err(NegotiationError::InvalidState(format!(
                    "remote {sdp_type:?} in {current:?}"
                )))
            }
        };
        state.remote_description = Some(description);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), NegotiationError> {
        let mut state = lock(&self.state);
        if state.remote_description.is_none() {
            return Err(NegotiationError::InvalidState(
                "candidate before remote description".to_string(),
            ));
        }
        state.candidates.push(candidate);
        Ok(())
    }

    async fn rollback(&self) -> Result<(), NegotiationError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(NegotiationError::Closed);
        }
        if state.signaling_state != SignalingState::Stable {
            state.rollbacks += 1;
            state.signaling_state = SignalingState::Stable;
        }
        Ok(())
    }

    async fn add_track(&self, track: MediaTrack) -> Result<SenderId, NegotiationError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(NegotiationError::Closed);
        }
        state.next_sender += 1;
        let sender = SenderId(format!("sender-{}", state.next_sender));
        state.senders.push((sender.clone(), track));
        Ok(sender)
    }

    async fn remove_track(&self, sender: &SenderId) -> Result<(), NegotiationError> {
        let mut state = lock(&self.state);
        let before = state.senders.len();
        state.senders.retain(|(id, _)| id != sender);
        if state.senders.len() == before {
            return Err(NegotiationError::Failed(format!("unknown sender {}", sender.0)));
        }
        Ok(())
    }

    fn signaling_state(&self) -> SignalingState {
        lock(&self.state).signaling_state
    }

    fn has_remote_description(&self) -> bool {
        lock(&self.state).remote_description.is_some()
    }

    async fn close(&self) {
        let mut state = lock(&self.state);
        state.closed = true;
        state.signaling_state = SignalingState::Closed;
    }
}

/// Test-side view of one mock connection.
#[derive(Clone)]
pub struct MockConnectionHandle {
    remote: ParticipantId,
    state: SharedState,
    events: mpsc::Sender<ConnectionEvent>,
}

impl MockConnectionHandle {
    #[must_use]
    pub fn remote(&self) -> ParticipantId {
        self.remote
    }

    #[must_use]
    pub fn signaling_state(&self) -> SignalingState {
        lock(&self.state).signaling_state
    }

    #[must_use]
    pub fn offers_created(&self) -> usize {
        lock(&self.state).offers.len()
    }

    /// Offers created with the ICE-restart option.
    #[must_use]
    pub fn ice_restart_offers(&self) -> usize {
        lock(&self.state)
            .offers
            .iter()
            .filter(|o| o.ice_restart)
            .count()
    }

    #[must_use]
    pub fn answers_created(&self) -> usize {
        lock(&self.state).answers
    }

    /// Pending offers abandoned through `rollback`.
    #[must_use]
    pub fn rollbacks(&self) -> usize {
        lock(&self.state).rollbacks
    }

    /// Remote candidates applied to this connection.
    #[must_use]
    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        lock(&self.state).candidates.clone()
    }

    /// Tracks currently attached as senders.
    #[must_use]
    pub fn outbound_tracks(&self) -> Vec<MediaTrack> {
        lock(&self.state)
            .senders
            .iter()
            .map(|(_, track)| track.clone())
            .collect()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Make the next `create_offer` fail.
    pub fn fail_next_offer(&self) {
        lock(&self.state).fail_next_offer = true;
    }

    /// Report a connectivity change. Returns `false` once the owner has
    /// detached.
    pub async fn set_ice_state(&self, state: IceConnectionState) -> bool {
        self.emit(ConnectionEvent::IceConnectionStateChanged(state))
            .await
    }

    pub async fn emit_remote_track(&self, track: RemoteTrack) -> bool {
        self.emit(ConnectionEvent::Track(track)).await
    }

    pub async fn emit_local_candidate(&self, candidate: IceCandidate) -> bool {
        self.emit(ConnectionEvent::LocalCandidate(candidate)).await
    }

    async fn emit(&self, event: ConnectionEvent) -> bool {
        self.events.send(event).await.is_ok()
    }
}

#[derive(Default)]
struct FactoryState {
    connections: Vec<MockConnectionHandle>,
    fail_for: HashSet<ParticipantId>,
    ice_server_urls: Vec<String>,
}

/// Factory producing [`MockConnectionHandle`]-backed connections.
#[derive(Clone, Default)]
pub struct MockPeerConnectionFactory {
    inner: Arc<Mutex<FactoryState>>,
}

impl MockPeerConnectionFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent connection created for `remote`.
    #[must_use]
    pub fn connection(&self, remote: ParticipantId) -> Option<MockConnectionHandle> {
        self.lock()
            .connections
            .iter()
            .rev()
            .find(|c| c.remote == remote)
            .cloned()
    }

    /// Every connection created for `remote`, oldest first.
    #[must_use]
    pub fn connections_for(&self, remote: ParticipantId) -> Vec<MockConnectionHandle> {
        self.lock()
            .connections
            .iter()
            .filter(|c| c.remote == remote)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn created_count(&self) -> usize {
        self.lock().connections.len()
    }

    /// Refuse to create connections for `remote`.
    pub fn fail_for(&self, remote: ParticipantId) {
        self.lock().fail_for.insert(remote);
    }

    /// ICE server URLs passed to the most recent `create`.
    #[must_use]
    pub fn last_ice_server_urls(&self) -> Vec<String> {
        self.lock().ice_server_urls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, FactoryState> {
        self.inner.lock().expect("mock factory lock poisoned")
    }
}

#[async_trait]
impl PeerConnectionFactory for MockPeerConnectionFactory {
    async fn create(
        &self,
        remote: ParticipantId,
        ice_servers: &[IceServer],
    ) -> Result<ConnectionParts, NegotiationError> {
        let mut factory = self.lock();
        if factory.fail_for.contains(&remote) {
            return Err(NegotiationError::Failed(format!(
                "scripted factory failure for {remote}"
            )));
        }
        factory.ice_server_urls = ice_servers
            .iter()
            .flat_map(|server| server.urls.iter().cloned())
            .collect();

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let state: SharedState = Arc::new(Mutex::new(ConnectionState::default()));
        factory.connections.push(MockConnectionHandle {
            remote,
            state: Arc::clone(&state),
            events: tx,
        });

        Ok(ConnectionParts {
            connection: Box::new(MockPeerConnection { state }),
            events: rx,
        })
    }
}
