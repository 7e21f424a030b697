//! `PeerSessionActor` - one negotiated connection to one remote participant.
//!
//! Each `PeerSessionActor`:
//! - Exclusively owns its `PeerConnection` and the connection's event stream
//! - Runs the offer/answer state machine for that participant
//! - Sends offers, answers and candidates through the signaling transport
//! - Reports state and remote-stream changes to the manager, tagged with its
//!   generation
//!
//! # States
//!
//! ```text
//! New ──(initiator)──> Offering ──answer──> Connected
//!  │                      ^                    │
//!  └──(inbound offer)─────┼──────> Connected   │ ice lost / tracks changed
//!                         └──── Renegotiating <┘
//! any ──primitive error──> Failed ──watchdog / inbound offer──> ...
//! any ──cancel──> Closed
//! ```
//!
//! At most one offer round is outstanding at a time. A connectivity drop
//! while a round is in flight queues an ICE restart for when the round
//! completes; a track change while a round is in flight queues exactly one
//! follow-up round. An unanswered offer is rolled back and re-offered after
//! a random backoff, leaving the connection stable so that a crossing offer
//! from the remote side can be answered in the meantime.

use super::messages::{
    PeerMessage, PeerRole, PeerSnapshot, PeerState, PeerUpdate, PeerUpdateKind,
};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use crate::config::Config;
use crate::errors::MeshError;
use crate::media::MediaTrack;
use crate::negotiation::{
    ConnectionEvent, ConnectionParts, IceCandidate, IceConnectionState, NegotiationError,
    OfferOptions, PeerConnection, RemoteStream, SenderId, SessionDescription, SignalingState,
};
use crate::observability::metrics;
use crate::signaling::{SignalPayload, SignalingMessage, SignalingTransport};
use common::types::{MeetingId, ParticipantId};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the peer session mailbox.
const PEER_CHANNEL_BUFFER: usize = 200;

/// Timers shared by every session of a manager.
#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    pub watchdog_interval: Duration,
    pub offer_timeout: Duration,
    pub offer_retry_jitter: Duration,
}

impl From<&Config> for SessionTiming {
    fn from(config: &Config) -> Self {
        Self {
            watchdog_interval: config.watchdog_interval,
            offer_timeout: config.offer_timeout,
            offer_retry_jitter: config.offer_retry_jitter,
        }
    }
}

/// Identity and timing of a session to spawn.
#[derive(Debug, Clone)]
pub struct PeerSessionConfig {
    pub meeting_id: MeetingId,
    pub local_participant_id: ParticipantId,
    pub participant_id: ParticipantId,
    pub role: PeerRole,
    /// Assigned by the manager; distinguishes this session from earlier and
    /// later sessions for the same participant.
    pub generation: u64,
    pub timing: SessionTiming,
}

/// Handle to a `PeerSessionActor`.
#[derive(Clone, Debug)]
pub struct PeerSessionHandle {
    sender: mpsc::Sender<PeerMessage>,
    cancel_token: CancellationToken,
    participant_id: ParticipantId,
    role: PeerRole,
    generation: u64,
}

impl PeerSessionHandle {
    #[must_use]
    pub fn participant_id(&self) -> ParticipantId {
        self.participant_id
    }

    #[must_use]
    pub fn role(&self) -> PeerRole {
        self.role
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver an inbound offer, answer or candidate.
    pub async fn signal(&self, payload: SignalPayload) -> Result<(), MeshError> {
        self.sender
            .send(PeerMessage::Signal { payload })
            .await
            .map_err(|e| MeshError::Internal(format!("channel send failed: {e}")))
    }

    /// Replace the outbound track set.
    pub async fn replace_tracks(&self, tracks: Vec<MediaTrack>) -> Result<(), MeshError> {
        self.sender
            .send(PeerMessage::ReplaceTracks { tracks })
            .await
            .map_err(|e| MeshError::Internal(format!("channel send failed: {e}")))
    }

    pub async fn get_state(&self) -> Result<PeerSnapshot, MeshError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PeerMessage::GetState { respond_to: tx })
            .await
            .map_err(|e| MeshError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| MeshError::Internal(format!("response receive failed: {e}")))
    }

    /// Close the session. The connection is released and the actor exits.
    pub fn close(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OfferReason {
    Initial,
    IceRestart,
    TrackChange,
    Retry,
}

impl OfferReason {
    const fn as_str(self) -> &'static str {
        match self {
            OfferReason::Initial => "initial",
            OfferReason::IceRestart => metrics::RENEGOTIATE_ICE_RESTART,
            OfferReason::TrackChange => metrics::RENEGOTIATE_TRACK_CHANGE,
            OfferReason::Retry => metrics::RENEGOTIATE_RETRY,
        }
    }
}

/// The `PeerSessionActor` implementation.
pub struct PeerSessionActor {
    participant_id: ParticipantId,
    local_participant_id: ParticipantId,
    meeting_id: MeetingId,
    role: PeerRole,
    generation: u64,
    timing: SessionTiming,
    /// Owned exclusively; never shared outside this actor.
    connection: Box<dyn PeerConnection>,
    events: mpsc::Receiver<ConnectionEvent>,
    events_open: bool,
    receiver: mpsc::Receiver<PeerMessage>,
    cancel_token: CancellationToken,
    transport: Arc<dyn SignalingTransport>,
    updates: mpsc::UnboundedSender<PeerUpdate>,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
    state: PeerState,
    ice_state: IceConnectionState,
    remote_stream: Option<RemoteStream>,
    /// Set while a non-initial offer round is outstanding.
    renegotiation_in_flight: bool,
    /// A track change arrived during an outstanding round.
    follow_up_pending: bool,
    senders: Vec<(MediaTrack, SenderId)>,
    offer_sent_at: Option<Instant>,
    last_offer_ice_restart: bool,
    last_ice_restart_at: Option<Instant>,
    round_started_at: Option<Instant>,
    /// Why the outstanding round was started; retries keep the original.
    round_reason: Option<OfferReason>,
    /// Set after an unanswered offer was rolled back; the round is re-offered
    /// once it passes.
    retry_at: Option<Instant>,
    /// Connectivity dropped during an outstanding round.
    ice_restart_pending: bool,
}

impl PeerSessionActor {
    /// Spawn a new peer session actor.
    ///
    /// `tracks` are attached as outbound senders before the first offer.
    /// Returns a handle and the task join handle.
    pub fn spawn(
        config: PeerSessionConfig,
        parts: ConnectionParts,
        tracks: Vec<MediaTrack>,
        transport: Arc<dyn SignalingTransport>,
        updates: mpsc::UnboundedSender<PeerUpdate>,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> (PeerSessionHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(PEER_CHANNEL_BUFFER);

        let actor = Self {
            participant_id: config.participant_id,
            local_participant_id: config.local_participant_id,
            meeting_id: config.meeting_id,
            role: config.role,
            generation: config.generation,
            timing: config.timing,
            connection: parts.connection,
            events: parts.events,
            events_open: true,
            receiver,
            cancel_token: cancel_token.clone(),
            transport,
            updates,
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Peer, config.participant_id.to_string()),
            state: PeerState::New,
            ice_state: IceConnectionState::New,
            remote_stream: None,
            renegotiation_in_flight: false,
            follow_up_pending: false,
            senders: Vec::new(),
            offer_sent_at: None,
            last_offer_ice_restart: false,
            last_ice_restart_at: None,
            round_started_at: None,
            round_reason: None,
            retry_at: None,
            ice_restart_pending: false,
        };

        let task_handle = tokio::spawn(actor.run(tracks));

        let handle = PeerSessionHandle {
            sender,
            cancel_token,
            participant_id: config.participant_id,
            role: config.role,
            generation: config.generation,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(
        skip_all,
        name = "mesh.actor.peer",
        fields(
            meeting_id = %self.meeting_id,
            participant_id = %self.participant_id,
            role = self.role.as_str(),
            generation = self.generation
        )
    )]
    async fn run(mut self, tracks: Vec<MediaTrack>) {
        debug!(
            target: "mesh.actor.peer",
            participant_id = %self.participant_id,
            role = self.role.as_str(),
            generation = self.generation,
            "PeerSessionActor started"
        );

        for track in tracks {
            self.attach(track).await;
        }

        if self.role == PeerRole::Initiator && !self.cancel_token.is_cancelled() {
            self.start_offer(OfferReason::Initial).await;
        }

        let mut watchdog = tokio::time::interval_at(
            Instant::now() + self.timing.watchdog_interval,
            self.timing.watchdog_interval,
        );
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "mesh.actor.peer",
                        participant_id = %self.participant_id,
                        "PeerSessionActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            debug!(
                                target: "mesh.actor.peer",
                                participant_id = %self.participant_id,
                                "PeerSessionActor channel closed"
                            );
                            break;
                        }
                    }
                }

                event = self.events.recv(), if self.events_open => {
                    match event {
                        Some(event) => self.handle_connection_event(event).await,
                        None => {
                            debug!(
                                target: "mesh.actor.peer",
                                participant_id = %self.participant_id,
                                "Connection event stream ended"
                            );
                            self.events_open = false;
                        }
                    }
                }

                _ = watchdog.tick() => {
                    self.check_watchdog().await;
                }
            }
        }

        self.shutdown().await;
    }

    async fn handle_message(&mut self, message: PeerMessage) {
        match message {
            PeerMessage::Signal { payload } => match payload {
                SignalPayload::Offer(offer) => self.handle_offer(offer).await,
                SignalPayload::Answer(answer) => self.handle_answer(answer).await,
                SignalPayload::Candidate(candidate) => self.handle_candidate(candidate).await,
            },

            PeerMessage::ReplaceTracks { tracks } => {
                self.handle_replace_tracks(tracks).await;
            }

            PeerMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
        }
    }

    /// Accept an offer only from a stable signaling state; anything else is
    /// glare and the offer is dropped, not queued.
    ///
    /// An offer arriving while a rolled-back round waits out its backoff is
    /// accepted and replaces that round. An abandoned track change is
    /// re-queued as a follow-up.
    async fn handle_offer(&mut self, offer: SessionDescription) {
        let signaling_state = self.connection.signaling_state();
        if signaling_state != SignalingState::Stable {
            let err = MeshError::NegotiationGlare(self.participant_id);
            warn!(
                target: "mesh.actor.peer",
                participant_id = %self.participant_id,
                signaling_state = ?signaling_state,
                error = %err,
                error_type = err.metric_label(),
                transient = err.is_transient(),
                "Dropping inbound offer"
            );
            metrics::record_signaling_dropped(metrics::DROP_GLARE);
            return;
        }

        let started = Instant::now();
        if let Err(e) = self.answer_offer(offer).await {
            self.fail(e);
            return;
        }

        if self.retry_at.take().is_some() {
            debug!(
                target: "mesh.actor.peer",
                participant_id = %self.participant_id,
                "Remote offer answered during retry backoff"
            );
            if self.round_reason == Some(OfferReason::TrackChange) {
                self.follow_up_pending = true;
            }
        }
        self.offer_sent_at = None;
        self.renegotiation_in_flight = false;
        self.complete_round(started).await;
    }

    async fn answer_offer(&mut self, offer: SessionDescription) -> Result<(), NegotiationError> {
        self.connection.set_remote_description(offer).await?;
        let answer = self.connection.create_answer().await?;
        self.connection
            .set_local_description(answer.clone())
            .await?;
        self.send_signal(SignalPayload::Answer(answer)).await;
        Ok(())
    }

    async fn handle_answer(&mut self, answer: SessionDescription) {
        if self.state != PeerState::Offering {
            debug!(
                target: "mesh.actor.peer",
                participant_id = %self.participant_id,
                state = self.state.as_str(),
                "Dropping answer with no outstanding offer"
            );
            metrics::record_signaling_dropped(metrics::DROP_UNEXPECTED_ANSWER);
            return;
        }

        if let Err(e) = self.connection.set_remote_description(answer).await {
            self.fail(e);
            return;
        }

        self.offer_sent_at = None;
        self.renegotiation_in_flight = false;
        let started = self.round_started_at.take().unwrap_or_else(Instant::now);
        self.complete_round(started).await;
    }

    async fn handle_candidate(&mut self, candidate: IceCandidate) {
        if !self.connection.has_remote_description() {
            debug!(
                target: "mesh.actor.peer",
                participant_id = %self.participant_id,
                "Dropping candidate received before remote description"
            );
            metrics::record_signaling_dropped(metrics::DROP_EARLY_CANDIDATE);
            return;
        }

        if self.ice_state.is_connected() {
            debug!(
                target: "mesh.actor.peer",
                participant_id = %self.participant_id,
                "Dropping candidate, already connected"
            );
            metrics::record_signaling_dropped(metrics::DROP_CONNECTED_CANDIDATE);
            return;
        }

        if let Err(e) = self.connection.add_ice_candidate(candidate).await {
            warn!(
                target: "mesh.actor.peer",
                participant_id = %self.participant_id,
                error = %e,
                "Failed to apply remote candidate"
            );
        }
    }

    async fn handle_replace_tracks(&mut self, tracks: Vec<MediaTrack>) {
        if !self.sync_senders(&tracks).await {
            return;
        }

        match self.state {
            PeerState::New => {
                // The first round will carry the new senders
                debug!(
                    target: "mesh.actor.peer",
                    participant_id = %self.participant_id,
                    "Outbound tracks swapped before first negotiation"
                );
            }
            PeerState::Closed => {}
            _ if self.negotiation_in_flight() => {
                debug!(
                    target: "mesh.actor.peer",
                    participant_id = %self.participant_id,
                    "Round in flight, follow-up renegotiation queued"
                );
                self.follow_up_pending = true;
            }
            _ => self.start_offer(OfferReason::TrackChange).await,
        }
    }

    async fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::LocalCandidate(candidate) => {
                if self.ice_state.is_connected() {
                    debug!(
                        target: "mesh.actor.peer",
                        participant_id = %self.participant_id,
                        "Suppressing local candidate, already connected"
                    );
                    return;
                }
                self.send_signal(SignalPayload::Candidate(candidate)).await;
            }

            ConnectionEvent::Track(track) => {
                debug!(
                    target: "mesh.actor.peer",
                    participant_id = %self.participant_id,
                    kind = track.kind.as_str(),
                    "Remote track received"
                );
                let stream = match self.remote_stream.take() {
                    Some(mut stream) => {
                        stream.add_track(track);
                        stream
                    }
                    None => RemoteStream::from_track(track),
                };
                self.publish(PeerUpdateKind::RemoteStream(stream.clone()));
                self.remote_stream = Some(stream);
            }

            ConnectionEvent::IceConnectionStateChanged(next) => {
                self.handle_ice_state(next).await;
            }
        }
    }

    /// Connectivity watchdog: a transition into a lost state triggers one
    /// guarded ICE-restart round. Further lost states (disconnected then
    /// failed) do not start another. A loss during some other outstanding
    /// round is remembered and restarted when that round completes.
    async fn handle_ice_state(&mut self, next: IceConnectionState) {
        let previous = std::mem::replace(&mut self.ice_state, next);
        debug!(
            target: "mesh.actor.peer",
            participant_id = %self.participant_id,
            from = previous.as_str(),
            to = next.as_str(),
            "ICE connection state changed"
        );

        if next.is_connected() {
            self.ice_restart_pending = false;
        }
        if !next.is_lost() || previous.is_lost() {
            return;
        }

        let err = MeshError::ConnectionLost(self.participant_id);
        if self.state == PeerState::New || self.state == PeerState::Closed {
            return;
        }
        if self.negotiation_in_flight() {
            if self.last_offer_ice_restart {
                debug!(
                    target: "mesh.actor.peer",
                    participant_id = %self.participant_id,
                    error = %err,
                    "ICE restart already in flight"
                );
            } else {
                debug!(
                    target: "mesh.actor.peer",
                    participant_id = %self.participant_id,
                    error = %err,
                    "Round in flight, ICE restart queued"
                );
                self.ice_restart_pending = true;
            }
            return;
        }

        warn!(
            target: "mesh.actor.peer",
            participant_id = %self.participant_id,
            ice_state = next.as_str(),
            error = %err,
            error_type = err.metric_label(),
            "Renegotiating with ICE restart"
        );
        self.start_offer(OfferReason::IceRestart).await;
    }

    async fn check_watchdog(&mut self) {
        match self.state {
            PeerState::Offering => {
                let Some(sent_at) = self.offer_sent_at else {
                    return;
                };
                if sent_at.elapsed() < self.timing.offer_timeout {
                    return;
                }
                self.back_off(sent_at).await;
            }
            PeerState::Renegotiating => {
                let Some(retry_at) = self.retry_at else {
                    return;
                };
                if Instant::now() < retry_at {
                    return;
                }
                self.retry_at = None;
                self.start_offer(OfferReason::Retry).await;
            }
            PeerState::Connected => {
                if !self.ice_state.is_lost() {
                    return;
                }
                let due = match self.last_ice_restart_at {
                    Some(at) => at.elapsed() >= self.timing.offer_timeout,
                    None => true,
                };
                if !due {
                    return;
                }
                warn!(
                    target: "mesh.actor.peer",
                    participant_id = %self.participant_id,
                    ice_state = self.ice_state.as_str(),
                    "Connectivity still lost, renegotiating with ICE restart"
                );
                self.start_offer(OfferReason::IceRestart).await;
            }
            PeerState::Failed => {
                info!(
                    target: "mesh.actor.peer",
                    participant_id = %self.participant_id,
                    "Attempting recovery of failed session"
                );
                if self.connection.signaling_state() != SignalingState::Stable {
                    if let Err(e) = self.connection.rollback().await {
                        warn!(
                            target: "mesh.actor.peer",
                            participant_id = %self.participant_id,
                            error = %e,
                            "Rollback before recovery failed"
                        );
                        return;
                    }
                }
                self.start_offer(OfferReason::IceRestart).await;
            }
            PeerState::New | PeerState::Closed => {}
        }
    }

    /// Abandon an unanswered offer. The connection returns to stable and the
    /// round is re-offered after a random backoff, unless a remote offer is
    /// answered first.
    async fn back_off(&mut self, sent_at: Instant) {
        let backoff = self.retry_backoff();
        warn!(
            target: "mesh.actor.peer",
            participant_id = %self.participant_id,
            waited_ms = u64::try_from(sent_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
            "Offer unanswered, rolling back"
        );

        if let Err(e) = self.connection.rollback().await {
            self.fail(e);
            return;
        }

        self.offer_sent_at = None;
        self.renegotiation_in_flight = true;
        self.retry_at = Some(Instant::now() + backoff);
        self.transition(PeerState::Renegotiating);
    }

    /// A fresh draw in `[0, offer_retry_jitter]`. The side with the greater
    /// participant id also waits two extra watchdog ticks, so two sessions
    /// that timed out together do not re-offer on the same tick.
    fn retry_backoff(&self) -> Duration {
        let jitter = draw_jitter(self.timing.offer_retry_jitter);
        if self.local_participant_id > self.participant_id {
            jitter + self.timing.watchdog_interval * 2
        } else {
            jitter
        }
    }

    /// Build, apply and send an offer.
    async fn start_offer(&mut self, reason: OfferReason) {
        let ice_restart = match reason {
            OfferReason::IceRestart => true,
            OfferReason::Retry => self.last_offer_ice_restart,
            OfferReason::Initial | OfferReason::TrackChange => false,
        };

        if reason != OfferReason::Retry {
            self.round_reason = Some(reason);
        }
        self.retry_at = None;
        if reason != OfferReason::Initial {
            self.transition(PeerState::Renegotiating);
            self.renegotiation_in_flight = true;
            metrics::record_renegotiation(reason.as_str());
        }

        let offer = match self
            .connection
            .create_offer(OfferOptions { ice_restart })
            .await
        {
            Ok(offer) => offer,
            Err(e) => {
                self.fail(e);
                return;
            }
        };

        if let Err(e) = self.connection.set_local_description(offer.clone()).await {
            self.fail(e);
            return;
        }

        let now = Instant::now();
        self.offer_sent_at = Some(now);
        if reason != OfferReason::Retry || self.round_started_at.is_none() {
            self.round_started_at = Some(now);
        }
        self.last_offer_ice_restart = ice_restart;
        if ice_restart {
            self.last_ice_restart_at = Some(now);
        }
        self.transition(PeerState::Offering);

        info!(
            target: "mesh.actor.peer",
            participant_id = %self.participant_id,
            reason = reason.as_str(),
            ice_restart,
            "Sending offer"
        );
        self.send_signal(SignalPayload::Offer(offer)).await;
    }

    async fn complete_round(&mut self, started: Instant) {
        metrics::record_negotiation_duration(started.elapsed());
        self.round_reason = None;
        self.transition(PeerState::Connected);

        // The restart offer carries the current senders, covering any
        // queued track change as well
        if std::mem::take(&mut self.ice_restart_pending) {
            self.follow_up_pending = false;
            info!(
                target: "mesh.actor.peer",
                participant_id = %self.participant_id,
                ice_state = self.ice_state.as_str(),
                "Starting queued ICE restart"
            );
            self.start_offer(OfferReason::IceRestart).await;
        } else if std::mem::take(&mut self.follow_up_pending) {
            self.start_offer(OfferReason::TrackChange).await;
        }
    }

    /// Bring outbound senders in line with `tracks`. Returns whether any
    /// sender was added or removed.
    async fn sync_senders(&mut self, tracks: &[MediaTrack]) -> bool {
        let mut changed = false;

        let mut kept = Vec::with_capacity(self.senders.len());
        for (track, sender) in std::mem::take(&mut self.senders) {
            if tracks.contains(&track) {
                kept.push((track, sender));
                continue;
            }
            changed = true;
            if let Err(e) = self.connection.remove_track(&sender).await {
                warn!(
                    target: "mesh.actor.peer",
                    participant_id = %self.participant_id,
                    error = %e,
                    "Failed to remove outbound track"
                );
            }
        }
        self.senders = kept;

        for track in tracks {
            if self.senders.iter().any(|(t, _)| t == track) {
                continue;
            }
            changed = true;
            self.attach(track.clone()).await;
        }

        changed
    }

    async fn attach(&mut self, track: MediaTrack) {
        let kind = track.kind();
        match self.connection.add_track(track.clone()).await {
            Ok(sender) => self.senders.push((track, sender)),
            Err(e) => {
                warn!(
                    target: "mesh.actor.peer",
                    participant_id = %self.participant_id,
                    kind = kind.as_str(),
                    error = %e,
                    "Failed to attach outbound track, continuing without it"
                );
            }
        }
    }

    fn negotiation_in_flight(&self) -> bool {
        self.renegotiation_in_flight || self.state == PeerState::Offering
    }

    fn fail(&mut self, err: NegotiationError) {
        let err = MeshError::from(err);
        warn!(
            target: "mesh.actor.peer",
            participant_id = %self.participant_id,
            error = %err,
            error_type = err.metric_label(),
            "Negotiation failed"
        );
        self.renegotiation_in_flight = false;
        self.follow_up_pending = false;
        self.ice_restart_pending = false;
        self.offer_sent_at = None;
        self.round_started_at = None;
        self.round_reason = None;
        self.retry_at = None;
        self.transition(PeerState::Failed);
    }

    /// Send failures are counted and logged; the watchdog covers lost offers.
    async fn send_signal(&self, payload: SignalPayload) {
        let kind = payload.kind();
        let message = SignalingMessage {
            sender_id: self.local_participant_id,
            receiver_id: self.participant_id,
            payload,
        };

        match self.transport.send(&self.meeting_id, message).await {
            Ok(()) => metrics::record_signaling_sent(kind),
            Err(e) => {
                let err = MeshError::from(e);
                warn!(
                    target: "mesh.actor.peer",
                    participant_id = %self.participant_id,
                    kind = kind.as_str(),
                    error = %err,
                    error_type = err.metric_label(),
                    transient = err.is_transient(),
                    "Signaling send failed"
                );
                metrics::record_signaling_send_failure(kind);
            }
        }
    }

    fn transition(&mut self, next: PeerState) {
        if self.state == next {
            return;
        }
        debug!(
            target: "mesh.actor.peer",
            participant_id = %self.participant_id,
            from = self.state.as_str(),
            to = next.as_str(),
            "Peer state transition"
        );
        self.state = next;
        self.publish(PeerUpdateKind::StateChanged(next));
    }

    fn publish(&self, kind: PeerUpdateKind) {
        // The manager may already be gone during teardown
        let _ = self.updates.send(PeerUpdate {
            participant_id: self.participant_id,
            generation: self.generation,
            kind,
        });
    }

    fn snapshot(&self) -> PeerSnapshot {
        PeerSnapshot {
            participant_id: self.participant_id,
            role: self.role,
            generation: self.generation,
            state: self.state,
            signaling_state: self.connection.signaling_state(),
            ice_state: self.ice_state,
            renegotiation_in_flight: self.renegotiation_in_flight,
            remote_stream: self.remote_stream.clone(),
            outbound_track_ids: self
                .senders
                .iter()
                .map(|(track, _)| track.id().to_string())
                .collect(),
        }
    }

    /// Release the connection and detach its callbacks.
    async fn shutdown(&mut self) {
        self.renegotiation_in_flight = false;
        self.follow_up_pending = false;
        self.ice_restart_pending = false;
        self.retry_at = None;
        self.remote_stream = None;
        self.events.close();
        self.events_open = false;
        self.connection.close().await;
        self.senders.clear();
        self.transition(PeerState::Closed);

        info!(
            target: "mesh.actor.peer",
            participant_id = %self.participant_id,
            generation = self.generation,
            messages_processed = self.mailbox.messages_processed(),
            peak_mailbox_depth = self.mailbox.peak_depth(),
            "Peer session closed"
        );
    }
}

fn draw_jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}
