//! In-memory signaling transport.
//!
//! A [`MemoryHub`] plays the realtime backend for any number of
//! participants. Each participant gets its own [`MemoryTransport`]:
//!
//! - `subscribe` hands the subscriber a roster snapshot (self included) and
//!   tells everyone already subscribed that it joined
//! - `send` records the message and whispers it to every other subscriber
//!   of the scope, like a broadcast channel; receivers filter by address
//! - [`MemoryHub::leave`] drops a subscriber and tells the rest
//!
//! # Example
//!
//! ```rust,ignore
//! let hub = MemoryHub::new();
//! let transport = hub.transport(participant_id);
//! hub.fail_next_sends(1);
//! ```

use async_trait::async_trait;
use common::types::{MeetingId, ParticipantId};
use mesh_session::signaling::{
    PresenceEvent, SignalKind, SignalingError, SignalingMessage, SignalingTransport,
    TransportEvent,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

const SUBSCRIBER_BUFFER: usize = 1024;

#[derive(Default)]
struct HubState {
    /// Scope name -> participant -> event sender.
    scopes: BTreeMap<String, BTreeMap<ParticipantId, mpsc::Sender<TransportEvent>>>,
    sent: Vec<SignalingMessage>,
    fail_sends: usize,
    send_failures: usize,
}

/// Shared in-memory signaling backend.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport for one participant.
    #[must_use]
    pub fn transport(&self, participant_id: ParticipantId) -> Arc<MemoryTransport> {
        Arc::new(MemoryTransport {
            hub: self.clone(),
            participant_id,
        })
    }

    /// Make the next `n` sends fail.
    pub fn fail_next_sends(&self, n: usize) {
        self.lock().fail_sends = n;
    }

    /// Sends that failed because of [`Self::fail_next_sends`].
    #[must_use]
    pub fn send_failures(&self) -> usize {
        self.lock().send_failures
    }

    /// Every message successfully sent, in order.
    #[must_use]
    pub fn sent_messages(&self) -> Vec<SignalingMessage> {
        self.lock().sent.clone()
    }

    /// Number of messages of `kind` sent from `sender` to `receiver`.
    #[must_use]
    pub fn count_between(
        &self,
        sender: ParticipantId,
        receiver: ParticipantId,
        kind: SignalKind,
    ) -> usize {
        self.lock()
            .sent
            .iter()
            .filter(|m| {
                m.sender_id == sender && m.receiver_id == receiver && m.payload.kind() == kind
            })
            .count()
    }

    /// Number of offers sent by `sender` to anyone.
    #[must_use]
    pub fn offers_from(&self, sender: ParticipantId) -> usize {
        self.lock()
            .sent
            .iter()
            .filter(|m| m.sender_id == sender && m.payload.kind() == SignalKind::Offer)
            .count()
    }

    /// Forget recorded messages.
    pub fn clear_sent(&self) {
        self.lock().sent.clear();
    }

    /// Participants currently subscribed to `scope`.
    #[must_use]
    pub fn members(&self, scope: &MeetingId) -> Vec<ParticipantId> {
        self.lock()
            .scopes
            .get(scope.as_str())
            .map(|members| members.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Remove `participant_id` from `scope`, closing its subscription and
    /// announcing the departure.
    pub fn leave(&self, scope: &MeetingId, participant_id: ParticipantId) {
        let mut state = self.lock();
        let Some(members) = state.scopes.get_mut(scope.as_str()) else {
            return;
        };
        if members.remove(&participant_id).is_none() {
            return;
        }
        for tx in members.values() {
            let _ = tx.try_send(TransportEvent::Presence(PresenceEvent::Left(participant_id)));
        }
    }

    /// Deliver `event` to one subscriber only. Returns whether it was
    /// subscribed.
    pub fn inject(&self, scope: &MeetingId, to: ParticipantId, event: TransportEvent) -> bool {
        let state = self.lock();
        state
            .scopes
            .get(scope.as_str())
            .and_then(|members| members.get(&to))
            .is_some_and(|tx| tx.try_send(event).is_ok())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubState> {
        self.inner.lock().expect("memory hub lock poisoned")
    }
}

/// One participant's view of a [`MemoryHub`].
pub struct MemoryTransport {
    hub: MemoryHub,
    participant_id: ParticipantId,
}

impl MemoryTransport {
    #[must_use]
    pub fn participant_id(&self) -> ParticipantId {
        self.participant_id
    }
}

#[async_trait]
impl SignalingTransport for MemoryTransport {
    async fn subscribe(
        &self,
        scope: &MeetingId,
    ) -> Result<mpsc::Receiver<TransportEvent>, SignalingError> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut state = self.hub.lock();
        let members = state.scopes.entry(scope.as_str().to_string()).or_default();

        let mut roster: Vec<ParticipantId> = members.keys().copied().collect();
        roster.push(self.participant_id);
        roster.sort();
        tx.try_send(TransportEvent::Presence(PresenceEvent::Snapshot(roster)))
            .map_err(|e| SignalingError::Subscribe(e.to_string()))?;

        for (id, other) in members.iter() {
            if *id != self.participant_id {
                let _ = other.try_send(TransportEvent::Presence(PresenceEvent::Joined(
                    self.participant_id,
                )));
            }
        }
        members.insert(self.participant_id, tx);

        Ok(rx)
    }

    async fn send(
        &self,
        scope: &MeetingId,
        message: SignalingMessage,
    ) -> Result<(), SignalingError> {
        let mut state = self.hub.lock();
        if state.fail_sends > 0 {
            state.fail_sends -= 1;
            state.send_failures += 1;
            return Err(SignalingError::Send("injected failure".to_string()));
        }

        state.sent.push(message.clone());
        if let Some(members) = state.scopes.get(scope.as_str()) {
            for (id, tx) in members {
                if *id != self.participant_id {
                    let _ = tx.try_send(TransportEvent::Whisper(message.clone()));
                }
            }
        }
        Ok(())
    }
}
