//! Connection-primitive contract.
//!
//! A [`PeerConnection`] is the platform's negotiated peer-to-peer transport
//! (offer/answer exchange, candidate gathering, track senders). This crate
//! never looks inside session descriptions or candidates: they are opaque
//! blobs carried between the primitive and the signaling transport.
//!
//! Connections are created through a [`PeerConnectionFactory`], which hands
//! back the connection together with the receiver for its
//! [`ConnectionEvent`]s. Whoever owns the receiver owns the callbacks;
//! dropping it detaches them.

use crate::media::{MediaTrack, TrackKind};
use async_trait::async_trait;
use common::secret::SecretString;
use common::types::ParticipantId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Offer or answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Opaque session description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Opaque network candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
            username_fragment: None,
        }
    }
}

/// Offer/answer sub-state of the connection primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    Closed,
}

/// Connectivity state of the connection primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl IceConnectionState {
    /// Media is flowing.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Completed)
    }

    /// The network path dropped and needs an ICE restart.
    #[must_use]
    pub const fn is_lost(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Closed)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Checking => "checking",
            Self::Connected => "connected",
            Self::Completed => "completed",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

/// Options for [`PeerConnection::create_offer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OfferOptions {
    /// Gather fresh candidates and credentials.
    pub ice_restart: bool,
}

/// Handle to an outbound track sender, returned by `add_track`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SenderId(pub String);

/// A remote track surfaced by the connection primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub track_id: String,
    pub stream_id: String,
    pub kind: TrackKind,
}

/// The remote participant's media as seen by the local side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    pub stream_id: String,
    pub tracks: Vec<RemoteTrack>,
}

impl RemoteStream {
    /// Start a stream view from its first track.
    #[must_use]
    pub fn from_track(track: RemoteTrack) -> Self {
        Self {
            stream_id: track.stream_id.clone(),
            tracks: vec![track],
        }
    }

    /// Record a track; a repeated track id replaces the earlier entry.
    pub fn add_track(&mut self, track: RemoteTrack) {
        self.tracks.retain(|t| t.track_id != track.track_id);
        self.tracks.push(track);
    }
}

/// Events emitted by a connection primitive.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A locally gathered candidate to forward to the remote side.
    LocalCandidate(IceCandidate),
    /// The remote side's media arrived.
    Track(RemoteTrack),
    /// Connectivity changed.
    IceConnectionStateChanged(IceConnectionState),
}

/// Errors from the connection primitive.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// The operation is not valid in the current signaling state.
    #[error("invalid signaling state: {0}")]
    InvalidState(String),

    /// The primitive rejected the operation.
    #[error("negotiation operation failed: {0}")]
    Failed(String),

    /// The connection has been closed.
    #[error("connection closed")]
    Closed,
}

/// STUN/TURN server entry handed to the factory.
#[derive(Debug, Clone)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<SecretString>,
}

/// The negotiated peer-to-peer transport for one remote participant.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(
        &self,
        options: OfferOptions,
    ) -> Result<SessionDescription, NegotiationError>;

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError>;

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError>;

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), NegotiationError>;

    /// Abandon a pending local or remote offer and return to `Stable`.
    /// A no-op when already stable.
    async fn rollback(&self) -> Result<(), NegotiationError>;

    /// Attach an outbound track.
    async fn add_track(&self, track: MediaTrack) -> Result<SenderId, NegotiationError>;

    /// Detach an outbound track.
    async fn remove_track(&self, sender: &SenderId) -> Result<(), NegotiationError>;

    fn signaling_state(&self) -> SignalingState;

    fn has_remote_description(&self) -> bool;

    /// Release the transport. Idempotent.
    async fn close(&self);
}

/// A freshly created connection and its event stream.
pub struct ConnectionParts {
    pub connection: Box<dyn PeerConnection>,
    pub events: mpsc::Receiver<ConnectionEvent>,
}

/// Creates connection primitives.
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(
        &self,
        remote: ParticipantId,
        ice_servers: &[IceServer],
    ) -> Result<ConnectionParts, NegotiationError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_description_serializes_as_browser_init_dict() {
        let json = serde_json::to_value(SessionDescription::offer("v=0")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "offer", "sdp": "v=0"}));
    }

    #[test]
    fn test_candidate_field_names() {
        let candidate = IceCandidate {
            candidate: "candidate:1 1 udp 2122260223 10.0.0.2 54400 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
            username_fragment: None,
        };
        let json = serde_json::to_value(&candidate).unwrap();
        assert_eq!(json["sdpMid"], "0");
        assert_eq!(json["sdpMLineIndex"], 0);
        assert!(json.get("usernameFragment").is_none());

        let parsed: IceCandidate =
            serde_json::from_str(r#"{"candidate":"candidate:2","sdpMLineIndex":1}"#).unwrap();
        assert_eq!(parsed.sdp_m_line_index, Some(1));
        assert!(parsed.sdp_mid.is_none());
    }

    #[test]
    fn test_ice_state_classification() {
        assert!(IceConnectionState::Connected.is_connected());
        assert!(IceConnectionState::Completed.is_connected());
        assert!(!IceConnectionState::Checking.is_connected());

        assert!(IceConnectionState::Disconnected.is_lost());
        assert!(IceConnectionState::Failed.is_lost());
        assert!(IceConnectionState::Closed.is_lost());
        assert!(!IceConnectionState::New.is_lost());
    }

    #[test]
    fn test_remote_stream_replaces_repeated_track() {
        let audio = RemoteTrack {
            track_id: "a1".to_string(),
            stream_id: "s1".to_string(),
            kind: TrackKind::Audio,
        };
        let mut stream = RemoteStream::from_track(audio.clone());
        stream.add_track(audio);
        stream.add_track(RemoteTrack {
            track_id: "v1".to_string(),
            stream_id: "s1".to_string(),
            kind: TrackKind::Video,
        });

        assert_eq!(stream.stream_id, "s1");
        assert_eq!(stream.tracks.len(), 2);
    }
}
