//! Mesh session error types.
//!
//! Collaborator contracts return their own narrow errors
//! ([`DeviceError`], [`SignalingError`], [`NegotiationError`]); they fold into
//! [`MeshError`] at the actor boundary. None of these are fatal to the
//! manager: the worst outcome of any single error is one peer session in the
//! `Failed` state.

use crate::media::DeviceError;
use crate::negotiation::NegotiationError;
use crate::signaling::SignalingError;
use common::types::ParticipantId;
use thiserror::Error;

/// Mesh session error type.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Capture permission denied or device missing.
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A message could not be handed to the signaling transport.
    #[error("Signaling send failed: {0}")]
    SignalingSendFailure(String),

    /// Subscription or decode failure on the signaling transport.
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// An offer arrived while a local offer was outstanding.
    #[error("Negotiation glare with {0}")]
    NegotiationGlare(ParticipantId),

    /// The network path to a peer dropped.
    #[error("Connection lost to {0}")]
    ConnectionLost(ParticipantId),

    /// A message referenced a participant with no session.
    #[error("Unknown peer: {0}")]
    UnknownPeer(ParticipantId),

    /// An update arrived from a session that has already been replaced.
    #[error("Stale update from {participant_id} (generation {generation})")]
    TeardownRace {
        participant_id: ParticipantId,
        generation: u64,
    },

    /// The connection primitive rejected an operation.
    #[error("Negotiation error: {0}")]
    Negotiation(String),

    /// The manager has been torn down.
    #[error("Session manager torn down")]
    TornDown,

    /// Actor channel closed or response dropped.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MeshError {
    /// Bounded label for metrics and structured logs.
    #[must_use]
    pub const fn metric_label(&self) -> &'static str {
        match self {
            MeshError::DeviceUnavailable(_) => "device_unavailable",
            MeshError::SignalingSendFailure(_) => "signaling_send_failure",
            MeshError::Signaling(_) => "signaling",
            MeshError::NegotiationGlare(_) => "negotiation_glare",
            MeshError::ConnectionLost(_) => "connection_lost",
            MeshError::UnknownPeer(_) => "unknown_peer",
            MeshError::TeardownRace { .. } => "teardown_race",
            MeshError::Negotiation(_) => "negotiation",
            MeshError::TornDown => "torn_down",
            MeshError::Internal(_) => "internal",
        }
    }

    /// Whether a later attempt may succeed without any state change on our side.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            MeshError::SignalingSendFailure(_)
                | MeshError::NegotiationGlare(_)
                | MeshError::ConnectionLost(_)
        )
    }
}

impl From<DeviceError> for MeshError {
    fn from(err: DeviceError) -> Self {
        MeshError::DeviceUnavailable(err.to_string())
    }
}

impl From<NegotiationError> for MeshError {
    fn from(err: NegotiationError) -> Self {
        MeshError::Negotiation(err.to_string())
    }
}

impl From<SignalingError> for MeshError {
    fn from(err: SignalingError) -> Self {
        match err {
            SignalingError::Send(reason) => MeshError::SignalingSendFailure(reason),
            other => MeshError::Signaling(other.to_string()),
        }
    }
}
