//! Message types for actor communication.
//!
//! All inter-actor communication uses typed messages over `tokio::sync::mpsc`;
//! request-reply uses `tokio::sync::oneshot`.

use super::peer::PeerSessionHandle;
use crate::errors::MeshError;
use crate::media::{LocalMediaState, MediaTrack};
use crate::negotiation::{IceConnectionState, RemoteStream, SignalingState};
use crate::signaling::{SignalPayload, SignalingMessage};
use chrono::{DateTime, Utc};
use common::types::{MeetingId, ParticipantId};
use tokio::sync::oneshot;

/// Messages sent to `SessionManagerActor`.
#[derive(Debug)]
pub enum ManagerMessage {
    /// Everyone present when the local participant joined.
    RosterSnapshot { participants: Vec<ParticipantId> },

    ParticipantJoined { participant_id: ParticipantId },

    ParticipantLeft { participant_id: ParticipantId },

    /// Inbound whisper to route to a peer session.
    Signaling { message: SignalingMessage },

    SetLocalMuted {
        muted: bool,
        respond_to: oneshot::Sender<Result<LocalMediaState, MeshError>>,
    },

    SetLocalVideoOff {
        off: bool,
        respond_to: oneshot::Sender<Result<LocalMediaState, MeshError>>,
    },

    SetScreenSharing {
        enabled: bool,
        respond_to: oneshot::Sender<Result<LocalMediaState, MeshError>>,
    },

    /// Stop capture, close every session, clear the roster.
    TeardownAll { respond_to: oneshot::Sender<()> },

    GetState {
        respond_to: oneshot::Sender<MeshState>,
    },

    /// Handle of the live session for a participant, if any.
    GetPeer {
        participant_id: ParticipantId,
        respond_to: oneshot::Sender<Option<PeerSessionHandle>>,
    },
}

/// Messages sent to `PeerSessionActor`.
#[derive(Debug)]
pub enum PeerMessage {
    /// Inbound offer, answer or candidate from the remote participant.
    Signal { payload: SignalPayload },

    /// The local outbound track set changed.
    ReplaceTracks { tracks: Vec<MediaTrack> },

    GetState {
        respond_to: oneshot::Sender<PeerSnapshot>,
    },
}

/// Which side sends the first offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// Joined after the remote participant; offers first.
    Initiator,
    /// Was present first; waits for the remote offer.
    Responder,
}

impl PeerRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PeerRole::Initiator => "initiator",
            PeerRole::Responder => "responder",
        }
    }
}

/// Negotiation state of a peer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Offering,
    Connected,
    Renegotiating,
    Failed,
    Closed,
}

impl PeerState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PeerState::New => "new",
            PeerState::Offering => "offering",
            PeerState::Connected => "connected",
            PeerState::Renegotiating => "renegotiating",
            PeerState::Failed => "failed",
            PeerState::Closed => "closed",
        }
    }
}

/// Update posted by a peer session to the manager.
///
/// `generation` identifies the session instance; the manager drops updates
/// whose generation no longer matches the registered session.
#[derive(Debug, Clone)]
pub struct PeerUpdate {
    pub participant_id: ParticipantId,
    pub generation: u64,
    pub kind: PeerUpdateKind,
}

#[derive(Debug, Clone)]
pub enum PeerUpdateKind {
    StateChanged(PeerState),
    RemoteStream(RemoteStream),
}

/// Point-in-time view of one peer session, from the session itself.
#[derive(Debug, Clone)]
pub struct PeerSnapshot {
    pub participant_id: ParticipantId,
    pub role: PeerRole,
    pub generation: u64,
    pub state: PeerState,
    pub signaling_state: SignalingState,
    pub ice_state: IceConnectionState,
    pub renegotiation_in_flight: bool,
    pub remote_stream: Option<RemoteStream>,
    /// Track ids currently attached as outbound senders.
    pub outbound_track_ids: Vec<String>,
}

/// Manager's view of one peer.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub participant_id: ParticipantId,
    pub role: PeerRole,
    pub generation: u64,
    pub state: PeerState,
    pub remote_stream: Option<RemoteStream>,
    /// When the manager created this session.
    pub created_at: DateTime<Utc>,
}

/// Point-in-time view of the whole mesh for one local participant.
#[derive(Debug, Clone)]
pub struct MeshState {
    pub meeting_id: MeetingId,
    pub local_participant_id: ParticipantId,
    /// Sorted, self included.
    pub roster: Vec<ParticipantId>,
    /// Sorted by participant id.
    pub peers: Vec<PeerInfo>,
    pub local_media: LocalMediaState,
    pub torn_down: bool,
}

impl MeshState {
    /// The manager's view of one peer.
    #[must_use]
    pub fn peer(&self, participant_id: ParticipantId) -> Option<&PeerInfo> {
        self.peers
            .iter()
            .find(|p| p.participant_id == participant_id)
    }
}
