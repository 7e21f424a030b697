//! JSON wire format for signaling whispers.
//!
//! ```json
//! {"type": "offer", "senderId": "...", "receiverId": "...", "payload": {...}}
//! ```
//!
//! The payload is decoded according to `type` into the typed union at this
//! boundary; nothing past here handles string tags.

use super::{SignalKind, SignalPayload, SignalingError, SignalingMessage};
use crate::negotiation::{SdpType, SessionDescription};
use common::types::ParticipantId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(rename = "type")]
    kind: SignalKind,
    sender_id: ParticipantId,
    receiver_id: ParticipantId,
    payload: serde_json::Value,
}

/// Encode a message for the wire.
pub fn encode(message: &SignalingMessage) -> Result<String, SignalingError> {
    let payload = match &message.payload {
        SignalPayload::Offer(description) | SignalPayload::Answer(description) => {
            serde_json::to_value(description)
        }
        SignalPayload::Candidate(candidate) => serde_json::to_value(candidate),
    }
    .map_err(|e| SignalingError::Encode(format!("payload: {e}")))?;

    let envelope = Envelope {
        kind: message.payload.kind(),
        sender_id: message.sender_id,
        receiver_id: message.receiver_id,
        payload,
    };

    serde_json::to_string(&envelope)
        .map_err(|e| SignalingError::Encode(format!("envelope: {e}")))
}

/// Decode a message from the wire.
pub fn decode(text: &str) -> Result<SignalingMessage, SignalingError> {
    let envelope: Envelope = serde_json::from_str(text)
        .map_err(|e| SignalingError::Decode(format!("invalid envelope: {e}")))?;

    let payload = match envelope.kind {
        SignalKind::Offer => {
            SignalPayload::Offer(parse_description(envelope.payload, SdpType::Offer)?)
        }
        SignalKind::Answer => {
            SignalPayload::Answer(parse_description(envelope.payload, SdpType::Answer)?)
        }
        SignalKind::Candidate => SignalPayload::Candidate(parse_payload(envelope.payload)?),
    };

    Ok(SignalingMessage {
        sender_id: envelope.sender_id,
        receiver_id: envelope.receiver_id,
        payload,
    })
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    value: serde_json::Value,
) -> Result<T, SignalingError> {
    serde_json::from_value(value)
        .map_err(|e| SignalingError::Decode(format!("invalid payload: {e}")))
}

/// The description's own `type` must agree with the envelope.
fn parse_description(
    value: serde_json::Value,
    expected: SdpType,
) -> Result<SessionDescription, SignalingError> {
    let description: SessionDescription = parse_payload(value)?;
    if description.sdp_type != expected {
        return Err(SignalingError::Decode(format!(
            "payload type {:?} does not match envelope type {:?}",
            description.sdp_type, expected
        )));
    }
    Ok(description)
}
