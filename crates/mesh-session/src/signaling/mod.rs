//! Signaling transport contract.
//!
//! The transport is a per-meeting pub/sub channel owned by an external
//! collaborator. It delivers presence (roster snapshot, joins, leaves) and
//! point-to-point whispers carrying offers, answers and candidates.
//! Delivery is at-most-once and ordered per sender; duplicates and
//! out-of-order presence are expected across reconnects.
//!
//! - [`wire`]: JSON envelope codec used at the transport boundary
//! - [`channel`]: adapter from a raw presence/whisper channel client

pub mod channel;
pub mod wire;

use crate::negotiation::{IceCandidate, SessionDescription};
use async_trait::async_trait;
use common::types::{MeetingId, ParticipantId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Discriminant of a signaling payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

impl SignalKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::Candidate => "candidate",
        }
    }
}

/// Decoded signaling payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalPayload {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(IceCandidate),
}

impl SignalPayload {
    #[must_use]
    pub const fn kind(&self) -> SignalKind {
        match self {
            SignalPayload::Offer(_) => SignalKind::Offer,
            SignalPayload::Answer(_) => SignalKind::Answer,
            SignalPayload::Candidate(_) => SignalKind::Candidate,
        }
    }
}

/// A point-to-point negotiation message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingMessage {
    pub sender_id: ParticipantId,
    pub receiver_id: ParticipantId,
    pub payload: SignalPayload,
}

/// Presence changes in a meeting scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    /// Everyone present when the subscription started, self included.
    Snapshot(Vec<ParticipantId>),
    Joined(ParticipantId),
    Left(ParticipantId),
}

/// Everything a subscription yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Presence(PresenceEvent),
    Whisper(SignalingMessage),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignalingError {
    #[error("send failed: {0}")]
    Send(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("malformed signaling message: {0}")]
    Decode(String),

    #[error("signaling message could not be encoded: {0}")]
    Encode(String),

    #[error("signaling channel closed")]
    Closed,
}

/// Per-meeting pub/sub channel.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Join the scope. The first event is the roster snapshot.
    async fn subscribe(
        &self,
        scope: &MeetingId,
    ) -> Result<mpsc::Receiver<TransportEvent>, SignalingError>;

    /// Whisper a message to its receiver.
    async fn send(&self, scope: &MeetingId, message: SignalingMessage)
        -> Result<(), SignalingError>;
}
