//! `SessionManagerActor` - one local participant's mesh in one meeting.
//!
//! The manager:
//! - Owns the roster and the map of live `PeerSessionActor`s
//! - Owns the local `MediaCaptureController` and propagates track changes
//! - Consumes presence and whispers from the signaling transport
//! - Routes each whisper to the session for its sender
//!
//! Every roster and session-map mutation happens on this actor's task, so
//! two concurrent events for one participant can never create two sessions.
//!
//! # Roles
//!
//! Participants in the roster snapshot were here first; the local side
//! initiates to each of them. Participants that join later initiate to us,
//! so they get a responder session.

use super::messages::{
    ManagerMessage, MeshState, PeerInfo, PeerRole, PeerState, PeerUpdate, PeerUpdateKind,
};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::peer::{PeerSessionActor, PeerSessionConfig, PeerSessionHandle, SessionTiming};
use crate::config::Config;
use crate::errors::MeshError;
use crate::media::{LocalMediaState, MediaCaptureController, MediaDevices, TrackChange};
use crate::negotiation::{PeerConnectionFactory, RemoteStream};
use crate::observability::metrics;
use crate::signaling::{
    PresenceEvent, SignalPayload, SignalingMessage, SignalingTransport, TransportEvent,
};
use chrono::{DateTime, Utc};
use common::types::{MeetingId, ParticipantId};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the manager mailbox.
const MANAGER_CHANNEL_BUFFER: usize = 500;

/// Collaborators injected into a manager.
#[derive(Clone)]
pub struct SessionManagerDeps {
    pub transport: Arc<dyn SignalingTransport>,
    pub connections: Arc<dyn PeerConnectionFactory>,
    pub devices: Arc<dyn MediaDevices>,
}

/// Handle to a `SessionManagerActor`.
#[derive(Clone, Debug)]
pub struct SessionManagerHandle {
    sender: mpsc::Sender<ManagerMessage>,
    cancel_token: CancellationToken,
    meeting_id: MeetingId,
    local_participant_id: ParticipantId,
}

impl SessionManagerHandle {
    #[must_use]
    pub fn meeting_id(&self) -> &MeetingId {
        &self.meeting_id
    }

    #[must_use]
    pub fn local_participant_id(&self) -> ParticipantId {
        self.local_participant_id
    }

    /// Apply a roster snapshot as if it came from the transport.
    pub async fn roster_snapshot(&self, participants: Vec<ParticipantId>) -> Result<(), MeshError> {
        self.send(ManagerMessage::RosterSnapshot { participants }).await
    }

    pub async fn participant_joined(&self, participant_id: ParticipantId) -> Result<(), MeshError> {
        self.send(ManagerMessage::ParticipantJoined { participant_id })
            .await
    }

    pub async fn participant_left(&self, participant_id: ParticipantId) -> Result<(), MeshError> {
        self.send(ManagerMessage::ParticipantLeft { participant_id })
            .await
    }

    /// Route an inbound whisper.
    pub async fn signaling_message(&self, message: SignalingMessage) -> Result<(), MeshError> {
        self.send(ManagerMessage::Signaling { message }).await
    }

    /// Mute or unmute the microphone.
    pub async fn set_local_muted(&self, muted: bool) -> Result<LocalMediaState, MeshError> {
        let (tx, rx) = oneshot::channel();
        self.send(ManagerMessage::SetLocalMuted {
            muted,
            respond_to: tx,
        })
        .await?;
        Self::receive(rx).await?
    }

    /// Turn the camera off or on.
    pub async fn set_local_video_off(&self, off: bool) -> Result<LocalMediaState, MeshError> {
        let (tx, rx) = oneshot::channel();
        self.send(ManagerMessage::SetLocalVideoOff {
            off,
            respond_to: tx,
        })
        .await?;
        Self::receive(rx).await?
    }

    /// Start or stop sharing the screen in place of the camera.
    pub async fn set_screen_sharing(&self, enabled: bool) -> Result<LocalMediaState, MeshError> {
        let (tx, rx) = oneshot::channel();
        self.send(ManagerMessage::SetScreenSharing {
            enabled,
            respond_to: tx,
        })
        .await?;
        Self::receive(rx).await?
    }

    /// Stop capture and close every session. Idempotent.
    pub async fn teardown_all(&self) -> Result<(), MeshError> {
        let (tx, rx) = oneshot::channel();
        self.send(ManagerMessage::TeardownAll { respond_to: tx })
            .await?;
        Self::receive(rx).await
    }

    pub async fn get_state(&self) -> Result<MeshState, MeshError> {
        let (tx, rx) = oneshot::channel();
        self.send(ManagerMessage::GetState { respond_to: tx })
            .await?;
        Self::receive(rx).await
    }

    /// Handle of the live session for `participant_id`.
    pub async fn peer(
        &self,
        participant_id: ParticipantId,
    ) -> Result<Option<PeerSessionHandle>, MeshError> {
        let (tx, rx) = oneshot::channel();
        self.send(ManagerMessage::GetPeer {
            participant_id,
            respond_to: tx,
        })
        .await?;
        Self::receive(rx).await
    }

    /// Cancel the manager. Sessions are closed and capture is released.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn send(&self, message: ManagerMessage) -> Result<(), MeshError> {
        self.sender
            .send(message)
            .await
            .map_err(|e| MeshError::Internal(format!("channel send failed: {e}")))
    }

    async fn receive<T>(rx: oneshot::Receiver<T>) -> Result<T, MeshError> {
        rx.await
            .map_err(|e| MeshError::Internal(format!("response receive failed: {e}")))
    }
}

/// Manager-side record of a live session.
struct ManagedSession {
    handle: PeerSessionHandle,
    task_handle: JoinHandle<()>,
    state: PeerState,
    remote_stream: Option<RemoteStream>,
    created_at: DateTime<Utc>,
}

/// The `SessionManagerActor` implementation.
pub struct SessionManagerActor {
    meeting_id: MeetingId,
    local_participant_id: ParticipantId,
    config: Config,
    receiver: mpsc::Receiver<ManagerMessage>,
    cancel_token: CancellationToken,
    transport: Arc<dyn SignalingTransport>,
    connections: Arc<dyn PeerConnectionFactory>,
    capture: MediaCaptureController,
    /// `None` until subscribed, and again after teardown.
    transport_events: Option<mpsc::Receiver<TransportEvent>>,
    /// Self included.
    roster: BTreeSet<ParticipantId>,
    sessions: HashMap<ParticipantId, ManagedSession>,
    next_generation: u64,
    updates_tx: mpsc::UnboundedSender<PeerUpdate>,
    updates_rx: mpsc::UnboundedReceiver<PeerUpdate>,
    track_ended_tx: mpsc::UnboundedSender<String>,
    track_ended_rx: mpsc::UnboundedReceiver<String>,
    watched_tracks: HashSet<String>,
    torn_down: bool,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl SessionManagerActor {
    /// Spawn a new session manager actor.
    ///
    /// Local capture is acquired and the transport subscribed once the task
    /// starts. Returns a handle and the task join handle.
    pub fn spawn(
        meeting_id: MeetingId,
        local_participant_id: ParticipantId,
        config: Config,
        deps: SessionManagerDeps,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> (SessionManagerHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(MANAGER_CHANNEL_BUFFER);
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (track_ended_tx, track_ended_rx) = mpsc::unbounded_channel();

        let capture = MediaCaptureController::new(deps.devices, config.release_idle_devices);

        let actor = Self {
            meeting_id: meeting_id.clone(),
            local_participant_id,
            config,
            receiver,
            cancel_token: cancel_token.clone(),
            transport: deps.transport,
            connections: deps.connections,
            capture,
            transport_events: None,
            roster: BTreeSet::new(),
            sessions: HashMap::new(),
            next_generation: 1,
            updates_tx,
            updates_rx,
            track_ended_tx,
            track_ended_rx,
            watched_tracks: HashSet::new(),
            torn_down: false,
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Manager, meeting_id.as_str()),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionManagerHandle {
            sender,
            cancel_token,
            meeting_id,
            local_participant_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(
        skip_all,
        name = "mesh.actor.manager",
        fields(meeting_id = %self.meeting_id, participant_id = %self.local_participant_id)
    )]
    async fn run(mut self) {
        info!(
            target: "mesh.actor.manager",
            meeting_id = %self.meeting_id,
            participant_id = %self.local_participant_id,
            "SessionManagerActor started"
        );

        self.capture
            .acquire(self.config.initial_video, self.config.initial_audio)
            .await;
        self.watch_tracks();
        self.roster.insert(self.local_participant_id);
        self.subscribe().await;

        loop {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "mesh.actor.manager",
                        meeting_id = %self.meeting_id,
                        "SessionManagerActor received cancellation signal"
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
                                target: "mesh.actor.manager",
                                meeting_id = %self.meeting_id,
                                "SessionManagerActor channel closed"
                            );
                            break;
                        }
                    }
                }

                Some(update) = self.updates_rx.recv() => {
                    self.handle_peer_update(update);
                }

                Some(track_id) = self.track_ended_rx.recv() => {
                    self.handle_track_ended(track_id).await;
                }

                event = next_transport_event(&mut self.transport_events) => {
                    match event {
                        Some(event) => self.handle_transport_event(event).await,
                        None => {
                            warn!(
                                target: "mesh.actor.manager",
                                meeting_id = %self.meeting_id,
                                "Signaling subscription closed"
                            );
                            self.transport_events = None;
                        }
                    }
                }
            }
        }

        self.teardown().await;

        info!(
            target: "mesh.actor.manager",
            meeting_id = %self.meeting_id,
            messages_processed = self.mailbox.messages_processed(),
            peak_mailbox_depth = self.mailbox.peak_depth(),
            "SessionManagerActor stopped"
        );
    }

    async fn subscribe(&mut self) {
        match self.transport.subscribe(&self.meeting_id).await {
            Ok(events) => self.transport_events = Some(events),
            Err(e) => {
                let err = MeshError::from(e);
                warn!(
                    target: "mesh.actor.manager",
                    meeting_id = %self.meeting_id,
                    error = %err,
                    error_type = err.metric_label(),
                    "Signaling subscription failed, presence must come through the handle"
                );
            }
        }
    }

    async fn handle_message(&mut self, message: ManagerMessage) {
        match message {
            ManagerMessage::RosterSnapshot { participants } => {
                self.handle_roster_snapshot(participants).await;
            }

            ManagerMessage::ParticipantJoined { participant_id } => {
                self.handle_participant_joined(participant_id).await;
            }

            ManagerMessage::ParticipantLeft { participant_id } => {
                self.handle_participant_left(participant_id).await;
            }

            ManagerMessage::Signaling { message } => {
                self.handle_signaling(message).await;
            }

            ManagerMessage::SetLocalMuted { muted, respond_to } => {
                let result = self.handle_set_local_muted(muted).await;
                let _ = respond_to.send(result);
            }

            ManagerMessage::SetLocalVideoOff { off, respond_to } => {
                let result = self.handle_set_local_video_off(off).await;
                let _ = respond_to.send(result);
            }

            ManagerMessage::SetScreenSharing {
                enabled,
                respond_to,
            } => {
                let result = self.handle_set_screen_sharing(enabled).await;
                let _ = respond_to.send(result);
            }

            ManagerMessage::TeardownAll { respond_to } => {
                self.teardown().await;
                let _ = respond_to.send(());
            }

            ManagerMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.mesh_state());
            }

            ManagerMessage::GetPeer {
                participant_id,
                respond_to,
            } => {
                let handle = self
                    .sessions
                    .get(&participant_id)
                    .map(|managed| managed.handle.clone());
                let _ = respond_to.send(handle);
            }
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Presence(PresenceEvent::Snapshot(participants)) => {
                self.handle_roster_snapshot(participants).await;
            }
            TransportEvent::Presence(PresenceEvent::Joined(participant_id)) => {
                self.handle_participant_joined(participant_id).await;
            }
            TransportEvent::Presence(PresenceEvent::Left(participant_id)) => {
                self.handle_participant_left(participant_id).await;
            }
            TransportEvent::Whisper(message) => {
                self.handle_signaling(message).await;
            }
        }
    }

    /// Reconcile against a full roster. Sessions for absent participants are
    /// closed; present participants without a session get an initiator
    /// session. Repeated snapshots leave existing sessions alone.
    async fn handle_roster_snapshot(&mut self, participants: Vec<ParticipantId>) {
        if self.torn_down {
            debug!(target: "mesh.actor.manager", "Roster snapshot after teardown ignored");
            return;
        }

        let snapshot: BTreeSet<ParticipantId> = participants
            .into_iter()
            .filter(|id| *id != self.local_participant_id)
            .collect();

        let departed: Vec<ParticipantId> = self
            .sessions
            .keys()
            .filter(|id| !snapshot.contains(id))
            .copied()
            .collect();
        for participant_id in departed {
            self.close_session(participant_id, "absent from roster snapshot")
                .await;
        }

        self.roster.clone_from(&snapshot);
        self.roster.insert(self.local_participant_id);

        for participant_id in snapshot {
            if !self.sessions.contains_key(&participant_id) {
                self.create_session(participant_id, PeerRole::Initiator)
                    .await;
            }
        }

        info!(
            target: "mesh.actor.manager",
            meeting_id = %self.meeting_id,
            roster_size = self.roster.len(),
            sessions = self.sessions.len(),
            "Roster snapshot applied"
        );
    }

    async fn handle_participant_joined(&mut self, participant_id: ParticipantId) {
        if self.torn_down || participant_id == self.local_participant_id {
            return;
        }

        self.roster.insert(participant_id);
        if self.sessions.contains_key(&participant_id) {
            debug!(
                target: "mesh.actor.manager",
                participant_id = %participant_id,
                "Duplicate join ignored"
            );
            return;
        }

        self.create_session(participant_id, PeerRole::Responder)
            .await;
    }

    async fn handle_participant_left(&mut self, participant_id: ParticipantId) {
        if self.torn_down || participant_id == self.local_participant_id {
            return;
        }

        let was_listed = self.roster.remove(&participant_id);
        let closed = self.close_session(participant_id, "participant left").await;
        if !closed && !was_listed {
            debug!(
                target: "mesh.actor.manager",
                participant_id = %participant_id,
                "Leave for unknown participant ignored"
            );
        }
    }

    async fn handle_signaling(&mut self, message: SignalingMessage) {
        let kind = message.payload.kind();

        if self.torn_down {
            metrics::record_signaling_dropped(metrics::DROP_CLOSED);
            return;
        }

        if message.receiver_id != self.local_participant_id
            || message.sender_id == self.local_participant_id
        {
            debug!(
                target: "mesh.actor.manager",
                receiver_id = %message.receiver_id,
                kind = kind.as_str(),
                "Ignoring whisper addressed to another participant"
            );
            return;
        }

        let sender = message.sender_id;
        if !self.sessions.contains_key(&sender) {
            let err = MeshError::UnknownPeer(sender);
            // Only an offer can open a session; answers and candidates from an
            // unknown sender are leftovers of a departed participant
            if !matches!(message.payload, SignalPayload::Offer(_)) {
                debug!(
                    target: "mesh.actor.manager",
                    kind = kind.as_str(),
                    error = %err,
                    "Dropping signaling from unknown sender"
                );
                metrics::record_signaling_dropped(metrics::DROP_UNKNOWN_PEER);
                return;
            }

            // An offer can overtake the presence event for its sender
            warn!(
                target: "mesh.actor.manager",
                kind = kind.as_str(),
                error = %err,
                error_type = err.metric_label(),
                "Creating responder session for unlisted sender"
            );
            self.roster.insert(sender);
            if !self.create_session(sender, PeerRole::Responder).await {
                metrics::record_signaling_dropped(metrics::DROP_CLOSED);
                return;
            }
        }

        let Some(managed) = self.sessions.get(&sender) else {
            return;
        };
        if let Err(e) = managed.handle.signal(message.payload).await {
            warn!(
                target: "mesh.actor.manager",
                participant_id = %sender,
                kind = kind.as_str(),
                error = %e,
                "Failed to route signaling to session"
            );
            metrics::record_signaling_dropped(metrics::DROP_CLOSED);
        }
    }

    /// Returns `false` if the connection could not be created.
    async fn create_session(&mut self, participant_id: ParticipantId, role: PeerRole) -> bool {
        let parts = match self
            .connections
            .create(participant_id, &self.config.ice_servers)
            .await
        {
            Ok(parts) => parts,
            Err(e) => {
                let err = MeshError::from(e);
                warn!(
                    target: "mesh.actor.manager",
                    participant_id = %participant_id,
                    error = %err,
                    error_type = err.metric_label(),
                    "Failed to create peer connection"
                );
                return false;
            }
        };

        let generation = self.next_generation;
        self.next_generation += 1;

        let (handle, task_handle) = PeerSessionActor::spawn(
            PeerSessionConfig {
                meeting_id: self.meeting_id.clone(),
                local_participant_id: self.local_participant_id,
                participant_id,
                role,
                generation,
                timing: SessionTiming::from(&self.config),
            },
            parts,
            self.capture.tracks(),
            Arc::clone(&self.transport),
            self.updates_tx.clone(),
            self.cancel_token.child_token(),
            Arc::clone(&self.metrics),
        );

        self.sessions.insert(
            participant_id,
            ManagedSession {
                handle,
                task_handle,
                state: PeerState::New,
                remote_stream: None,
                created_at: Utc::now(),
            },
        );
        self.metrics.session_created();
        metrics::set_peer_sessions_active(self.sessions.len());

        info!(
            target: "mesh.actor.manager",
            participant_id = %participant_id,
            role = role.as_str(),
            generation,
            "Peer session created"
        );
        true
    }

    /// Returns whether a session existed.
    async fn close_session(&mut self, participant_id: ParticipantId, reason: &'static str) -> bool {
        let Some(managed) = self.sessions.remove(&participant_id) else {
            return false;
        };

        let generation = managed.handle.generation();
        managed.handle.close();
        self.await_session(participant_id, managed.task_handle).await;
        self.metrics.session_closed();
        metrics::set_peer_sessions_active(self.sessions.len());

        info!(
            target: "mesh.actor.manager",
            participant_id = %participant_id,
            generation,
            reason,
            "Peer session removed"
        );
        true
    }

    async fn await_session(&self, participant_id: ParticipantId, task_handle: JoinHandle<()>) {
        match tokio::time::timeout(self.config.session_close_timeout, task_handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_panic() => self.metrics.record_panic(ActorType::Peer),
            Ok(Err(_)) => {}
            Err(_) => {
                warn!(
                    target: "mesh.actor.manager",
                    participant_id = %participant_id,
                    "Peer session did not stop in time"
                );
            }
        }
    }

    fn handle_peer_update(&mut self, update: PeerUpdate) {
        let current = self
            .sessions
            .get_mut(&update.participant_id)
            .filter(|managed| managed.handle.generation() == update.generation);

        let Some(managed) = current else {
            let err = MeshError::TeardownRace {
                participant_id: update.participant_id,
                generation: update.generation,
            };
            debug!(target: "mesh.actor.manager", error = %err, "Discarding stale session update");
            metrics::record_stale_update();
            return;
        };

        match update.kind {
            PeerUpdateKind::StateChanged(state) => managed.state = state,
            PeerUpdateKind::RemoteStream(stream) => managed.remote_stream = Some(stream),
        }
    }

    async fn handle_set_local_muted(&mut self, muted: bool) -> Result<LocalMediaState, MeshError> {
        if self.torn_down {
            return Err(MeshError::TornDown);
        }
        let change = self.capture.set_audio_muted(muted).await?;
        self.propagate(change).await;
        Ok(self.capture.snapshot())
    }

    async fn handle_set_local_video_off(&mut self, off: bool) -> Result<LocalMediaState, MeshError> {
        if self.torn_down {
            return Err(MeshError::TornDown);
        }
        let change = self.capture.set_video_off(off).await?;
        self.propagate(change).await;
        Ok(self.capture.snapshot())
    }

    async fn handle_set_screen_sharing(
        &mut self,
        enabled: bool,
    ) -> Result<LocalMediaState, MeshError> {
        if self.torn_down {
            return Err(MeshError::TornDown);
        }
        let change = self.capture.set_screen_sharing(enabled).await?;
        self.propagate(change).await;
        Ok(self.capture.snapshot())
    }

    async fn handle_track_ended(&mut self, track_id: String) {
        self.watched_tracks.remove(&track_id);
        if self.torn_down {
            return;
        }

        debug!(target: "mesh.actor.manager", track_id = %track_id, "Local track ended");
        let change = self.capture.on_track_ended(&track_id).await;
        self.propagate(change).await;
    }

    /// Push the current outbound track set to every session when senders
    /// changed. Enabled-flag changes travel in-band and need nothing here.
    async fn propagate(&mut self, change: TrackChange) {
        if !change.requires_renegotiation() {
            return;
        }

        self.watch_tracks();
        let tracks = self.capture.tracks();
        debug!(
            target: "mesh.actor.manager",
            sessions = self.sessions.len(),
            tracks = tracks.len(),
            "Propagating outbound track change"
        );

        for (participant_id, managed) in &self.sessions {
            if let Err(e) = managed.handle.replace_tracks(tracks.clone()).await {
                warn!(
                    target: "mesh.actor.manager",
                    participant_id = %participant_id,
                    error = %e,
                    "Failed to propagate track change"
                );
            }
        }
    }

    /// Watch every current track for an external end (device unplugged,
    /// browser "stop sharing"), reporting it back into this actor.
    fn watch_tracks(&mut self) {
        for track in self.capture.tracks() {
            let track_id = track.id().to_string();
            if !self.watched_tracks.insert(track_id.clone()) {
                continue;
            }

            let ended = track.ended_token();
            let cancel = self.cancel_token.clone();
            let tx = self.track_ended_tx.clone();
            tokio::spawn(async move {
                tokio::select! {
                    () = ended.cancelled() => {
                        let _ = tx.send(track_id);
                    }
                    () = cancel.cancelled() => {}
                }
            });
        }
    }

    /// Stop capture, close every session and clear the roster. Safe to call
    /// more than once.
    async fn teardown(&mut self) {
        if self.torn_down {
            debug!(target: "mesh.actor.manager", "Teardown already complete");
            return;
        }
        self.torn_down = true;

        self.capture.stop_all();
        self.transport_events = None;

        let sessions: Vec<(ParticipantId, ManagedSession)> = self.sessions.drain().collect();
        for (_, managed) in &sessions {
            managed.handle.close();
        }
        let closed = sessions.len();
        for (participant_id, managed) in sessions {
            self.await_session(participant_id, managed.task_handle).await;
            self.metrics.session_closed();
        }

        self.roster.clear();
        metrics::set_peer_sessions_active(0);

        info!(
            target: "mesh.actor.manager",
            meeting_id = %self.meeting_id,
            sessions_closed = closed,
            "Mesh torn down"
        );
    }

    fn mesh_state(&self) -> MeshState {
        let mut peers: Vec<PeerInfo> = self
            .sessions
            .iter()
            .map(|(participant_id, managed)| PeerInfo {
                participant_id: *participant_id,
                role: managed.handle.role(),
                generation: managed.handle.generation(),
                state: managed.state,
                remote_stream: managed.remote_stream.clone(),
                created_at: managed.created_at,
            })
            .collect();
        peers.sort_by_key(|peer| peer.participant_id);

        MeshState {
            meeting_id: self.meeting_id.clone(),
            local_participant_id: self.local_participant_id,
            roster: self.roster.iter().copied().collect(),
            peers,
            local_media: self.capture.snapshot(),
            torn_down: self.torn_down,
        }
    }
}

/// Next event from the subscription, or never if there is none.
async fn next_transport_event(
    events: &mut Option<mpsc::Receiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}
