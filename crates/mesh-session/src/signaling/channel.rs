//! [`SignalingTransport`] over a presence channel with client whispers.
//!
//! Many realtime backends expose per-channel presence (`here`, `joining`,
//! `leaving`) plus named client-to-client "whisper" events carrying text.
//! [`PresenceChannelTransport`] adapts such a client: it joins
//! `handshake.{meeting}` and carries signaling as JSON text under the
//! `negotiation` whisper event, decoding at this boundary. Whispers that fail
//! to decode are logged and dropped; they never reach a peer session.

use super::{
    wire, PresenceEvent, SignalingError, SignalingMessage, SignalingTransport, TransportEvent,
};
use async_trait::async_trait;
use common::types::{MeetingId, ParticipantId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Prefix of the channel that carries presence and negotiation whispers.
pub const HANDSHAKE_CHANNEL_PREFIX: &str = "handshake";

/// Whisper event name for signaling messages.
pub const NEGOTIATION_EVENT: &str = "negotiation";

/// Default buffer for decoded events.
const EVENT_CHANNEL_BUFFER: usize = 256;

/// Raw event from a presence channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Members present at join time.
    Here(Vec<ParticipantId>),
    Joining(ParticipantId),
    Leaving(ParticipantId),
    Whisper { event: String, data: String },
}

/// A realtime client with presence channels and whispers.
#[async_trait]
pub trait PresenceChannelClient: Send + Sync {
    async fn join(&self, channel: &str) -> Result<mpsc::Receiver<ChannelEvent>, SignalingError>;

    async fn whisper(&self, channel: &str, event: &str, data: String)
        -> Result<(), SignalingError>;
}

/// Adapts a [`PresenceChannelClient`] to [`SignalingTransport`].
pub struct PresenceChannelTransport<C: ?Sized> {
    client: Arc<C>,
}

impl<C: PresenceChannelClient + ?Sized> PresenceChannelTransport<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Channel name for a meeting scope.
    #[must_use]
    pub fn channel_name(scope: &MeetingId) -> String {
        format!("{HANDSHAKE_CHANNEL_PREFIX}.{scope}")
    }
}

#[async_trait]
impl<C: PresenceChannelClient + ?Sized> SignalingTransport for PresenceChannelTransport<C> {
    async fn subscribe(
        &self,
        scope: &MeetingId,
    ) -> Result<mpsc::Receiver<TransportEvent>, SignalingError> {
        let channel = Self::channel_name(scope);
        let raw = self.client.join(&channel).await?;
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);

        debug!(target: "mesh.signaling", channel = %channel, "Joined presence channel");
        tokio::spawn(pump(raw, tx, channel));

        Ok(rx)
    }

    async fn send(
        &self,
        scope: &MeetingId,
        message: SignalingMessage,
    ) -> Result<(), SignalingError> {
        let data = wire::encode(&message)?;
        self.client
            .whisper(&Self::channel_name(scope), NEGOTIATION_EVENT, data)
            .await
    }
}

/// Decode raw channel events until either side goes away.
async fn pump(
    mut raw: mpsc::Receiver<ChannelEvent>,
    out: mpsc::Sender<TransportEvent>,
    channel: String,
) {
    while let Some(event) = raw.recv().await {
        let decoded = match event {
            ChannelEvent::Here(members) => {
                Some(TransportEvent::Presence(PresenceEvent::Snapshot(members)))
            }
            ChannelEvent::Joining(id) => Some(TransportEvent::Presence(PresenceEvent::Joined(id))),
            ChannelEvent::Leaving(id) => Some(TransportEvent::Presence(PresenceEvent::Left(id))),
            ChannelEvent::Whisper { event, data } if event == NEGOTIATION_EVENT => {
                match wire::decode(&data) {
                    Ok(message) => Some(TransportEvent::Whisper(message)),
                    Err(e) => {
                        warn!(
                            target: "mesh.signaling",
                            channel = %channel,
                            error = %e,
                            len = data.len(),
                            "Dropping undecodable whisper"
                        );
                        None
                    }
                }
            }
            ChannelEvent::Whisper { event, .. } => {
                debug!(target: "mesh.signaling", channel = %channel, event = %event, "Ignoring whisper event");
                None
            }
        };

        if let Some(event) = decoded {
            if out.send(event).await.is_err() {
                debug!(target: "mesh.signaling", channel = %channel, "Subscriber dropped");
                return;
            }
        }
    }

    debug!(target: "mesh.signaling", channel = %channel, "Presence channel closed");
}
