//! Tests for `SessionManagerActor` over an in-memory signaling hub.
//!
//! Every participant runs a real manager with mock connections and devices;
//! offers, answers and presence travel through a shared `MemoryHub`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::time::Duration;

use common::types::{MeetingId, ParticipantId};
use mesh_session::media::TrackSource;
use mesh_session::negotiation::{IceCandidate, IceConnectionState, SessionDescription};
use mesh_session::signaling::{
    PresenceEvent, SignalKind, SignalPayload, SignalingMessage, TransportEvent,
};
use mesh_session::{Config, MeshError, PeerRole, PeerState};
use mesh_test_utils::{
    eventually, init_test_tracing, test_config, MemoryHub, MockDevices, TestPeer,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

fn meeting() -> MeetingId {
    MeetingId::new("abc-defg-hij")
}

async fn pair(hub: &MemoryHub) -> (TestPeer, TestPeer) {
    let a = TestPeer::spawn(hub, &meeting(), test_config()).await;
    let b = TestPeer::spawn(hub, &meeting(), test_config()).await;
    assert!(a.wait_connected_to(&[b.participant_id]).await);
    assert!(b.wait_connected_to(&[a.participant_id]).await);
    (a, b)
}

fn offer_from(sender: ParticipantId, receiver: ParticipantId) -> TransportEvent {
    TransportEvent::Whisper(SignalingMessage {
        sender_id: sender,
        receiver_id: receiver,
        payload: SignalPayload::Offer(SessionDescription::offer("injected-offer")),
    })
}

fn whisper(sender: ParticipantId, receiver: ParticipantId, payload: SignalPayload) -> TransportEvent {
    TransportEvent::Whisper(SignalingMessage {
        sender_id: sender,
        receiver_id: receiver,
        payload,
    })
}

/// Keep polling `wait_settled` for up to `limit` of (virtual) time.
async fn settles_within(peer: &TestPeer, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if peer.wait_settled().await {
            return true;
        }
    }
    false
}

/// Let queued session updates reach the manager.
async fn settle_updates() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

type MetricEntry = (
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
);

fn counter_total(snapshot: &[MetricEntry], name: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.key().name() == name)
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(n) => *n,
            _ => 0,
        })
        .sum()
}

// ============================================================================
// Join, connect, leave
// ============================================================================

#[tokio::test]
async fn test_two_participants_connect_with_single_initiator() {
    init_test_tracing();
    let hub = MemoryHub::new();
    let (a, b) = pair(&hub).await;

    // The later joiner offers; the earlier one only answers
    assert_eq!(
        hub.count_between(b.participant_id, a.participant_id, SignalKind::Offer),
        1
    );
    assert_eq!(
        hub.count_between(a.participant_id, b.participant_id, SignalKind::Offer),
        0
    );
    assert_eq!(
        hub.count_between(a.participant_id, b.participant_id, SignalKind::Answer),
        1
    );

    let a_state = a.state().await;
    let b_state = b.state().await;
    let mut expected_roster = vec![a.participant_id, b.participant_id];
    expected_roster.sort();
    assert_eq!(a_state.roster, expected_roster);
    assert_eq!(b_state.roster, expected_roster);
    assert_eq!(
        a_state.peer(b.participant_id).unwrap().role,
        PeerRole::Responder
    );
    assert_eq!(
        b_state.peer(a.participant_id).unwrap().role,
        PeerRole::Initiator
    );

    // Each side attached its local capture
    let conn = a.connections.connection(b.participant_id).unwrap();
    assert_eq!(conn.outbound_tracks().len(), 2);
    assert_eq!(a.metrics.session_count(), 1);
}

#[tokio::test]
async fn test_leave_closes_session_and_updates_roster() {
    let hub = MemoryHub::new();
    let (a, b) = pair(&hub).await;
    let conn = a.connections.connection(b.participant_id).unwrap();

    hub.leave(&meeting(), b.participant_id);
    b.handle.teardown_all().await.unwrap();

    let a_ref = &a;
    assert!(
        eventually(move || async move { a_ref.state().await.peers.is_empty() }).await
    );
    assert_eq!(a.state().await.roster, vec![a.participant_id]);
    assert!(conn.is_closed());
    assert_eq!(a.metrics.session_count(), 0);
}

#[tokio::test]
async fn test_three_participants_form_full_mesh() {
    let hub = MemoryHub::new();
    let a = TestPeer::spawn(&hub, &meeting(), test_config()).await;
    let b = TestPeer::spawn(&hub, &meeting(), test_config()).await;
    let c = TestPeer::spawn(&hub, &meeting(), test_config()).await;

    assert!(a.wait_connected_to(&[b.participant_id, c.participant_id]).await);
    assert!(b.wait_connected_to(&[a.participant_id, c.participant_id]).await);
    assert!(c.wait_connected_to(&[a.participant_id, b.participant_id]).await);

    // Exactly one offer per pair, always from the later joiner
    for (earlier, later) in [(&a, &b), (&a, &c), (&b, &c)] {
        assert_eq!(
            hub.count_between(later.participant_id, earlier.participant_id, SignalKind::Offer),
            1
        );
        assert_eq!(
            hub.count_between(earlier.participant_id, later.participant_id, SignalKind::Offer),
            0
        );
    }

    assert_eq!(c.state().await.roster.len(), 3);
}

#[tokio::test]
async fn test_joining_without_camera_still_connects() {
    let hub = MemoryHub::new();
    let a = TestPeer::spawn(&hub, &meeting(), test_config()).await;
    let b = TestPeer::spawn_with_devices(
        &hub,
        &meeting(),
        test_config(),
        MockDevices::builder().deny_camera().build(),
    )
    .await;

    assert!(b.wait_connected_to(&[a.participant_id]).await);
    let media = b.state().await.local_media;
    assert!(media.audio_enabled);
    assert!(!media.video_enabled);

    let conn = b.connections.connection(a.participant_id).unwrap();
    assert_eq!(conn.outbound_tracks().len(), 1);
}

// ============================================================================
// Local media propagation
// ============================================================================

#[tokio::test]
async fn test_mute_does_not_renegotiate() {
    let hub = MemoryHub::new();
    let (a, b) = pair(&hub).await;
    hub.clear_sent();

    let media = a.handle.set_local_muted(true).await.unwrap();
    assert!(!media.audio_enabled);
    let media = a.handle.set_local_video_off(true).await.unwrap();
    assert!(!media.video_enabled);
    assert!(a.wait_settled().await);

    assert_eq!(hub.offers_from(a.participant_id), 0);
    assert_eq!(hub.offers_from(b.participant_id), 0);

    // Same senders, flags flipped in place
    let conn = a.connections.connection(b.participant_id).unwrap();
    let outbound = conn.outbound_tracks();
    assert_eq!(outbound.len(), 2);
    assert!(outbound.iter().all(|t| !t.is_enabled()));
}

#[tokio::test]
async fn test_screen_share_renegotiates_once_per_peer_each_way() {
    let hub = MemoryHub::new();
    let a = TestPeer::spawn(&hub, &meeting(), test_config()).await;
    let b = TestPeer::spawn(&hub, &meeting(), test_config()).await;
    let c = TestPeer::spawn(&hub, &meeting(), test_config()).await;
    assert!(a.wait_connected_to(&[b.participant_id, c.participant_id]).await);
    assert!(b.wait_settled().await);
    assert!(c.wait_settled().await);
    hub.clear_sent();

    let media = a.handle.set_screen_sharing(true).await.unwrap();
    assert!(media.screen_sharing);
    let hub_ref = &hub;
    let a_id = a.participant_id;
    assert!(eventually(move || async move { hub_ref.offers_from(a_id) == 2 }).await);
    assert!(a.wait_settled().await);
    assert_eq!(hub.offers_from(a.participant_id), 2);
    assert_eq!(
        hub.count_between(a.participant_id, b.participant_id, SignalKind::Offer),
        1
    );

    let conn = a.connections.connection(b.participant_id).unwrap();
    assert!(conn
        .outbound_tracks()
        .iter()
        .any(|t| t.source() == TrackSource::Screen));

    hub.clear_sent();
    let media = a.handle.set_screen_sharing(false).await.unwrap();
    assert!(!media.screen_sharing);
    assert!(media.video_enabled);
    assert!(eventually(move || async move { hub_ref.offers_from(a_id) == 2 }).await);
    assert!(a.wait_settled().await);
    assert_eq!(hub.offers_from(a.participant_id), 2);
    assert!(conn
        .outbound_tracks()
        .iter()
        .any(|t| t.source() == TrackSource::Camera));
}

#[tokio::test]
async fn test_external_screen_share_end_renegotiates_once() {
    let hub = MemoryHub::new();
    let (a, b) = pair(&hub).await;
    a.handle.set_screen_sharing(true).await.unwrap();
    assert!(a.wait_settled().await);
    hub.clear_sent();

    assert!(a.devices.end_screen_share());

    let a_ref = &a;
    assert!(
        eventually(move || async move { !a_ref.state().await.local_media.screen_sharing }).await
    );
    let hub_ref = &hub;
    let a_id = a.participant_id;
    assert!(eventually(move || async move { hub_ref.offers_from(a_id) == 1 }).await);
    assert!(a.wait_settled().await);
    assert_eq!(hub.offers_from(a.participant_id), 1);

    let media = a.state().await.local_media;
    assert!(media.video_enabled);
    let conn = a.connections.connection(b.participant_id).unwrap();
    assert!(conn
        .outbound_tracks()
        .iter()
        .all(|t| t.source() != TrackSource::Screen));
}

#[tokio::test]
async fn test_unmute_after_release_renegotiates() {
    let hub = MemoryHub::new();
    let mut config = test_config();
    config.release_idle_devices = true;
    let a = TestPeer::spawn(&hub, &meeting(), config).await;
    let b = TestPeer::spawn(&hub, &meeting(), test_config()).await;
    assert!(a.wait_connected_to(&[b.participant_id]).await);
    assert!(b.wait_settled().await);
    hub.clear_sent();

    a.handle.set_local_muted(true).await.unwrap();
    let media = a.handle.set_local_video_off(true).await.unwrap();
    assert!(media.capture_stream.is_empty());
    assert!(a.devices.live_tracks().is_empty());

    let hub_ref = &hub;
    let a_id = a.participant_id;
    assert!(eventually(move || async move { hub_ref.offers_from(a_id) == 1 }).await);
    assert!(a.wait_settled().await);

    let media = a.handle.set_local_muted(false).await.unwrap();
    assert!(media.audio_enabled);
    assert!(eventually(move || async move { hub_ref.offers_from(a_id) == 2 }).await);
    assert!(a.wait_settled().await);
}

#[tokio::test]
async fn test_denied_screen_share_reports_device_error() {
    let hub = MemoryHub::new();
    let a = TestPeer::spawn_with_devices(
        &hub,
        &meeting(),
        test_config(),
        MockDevices::builder().deny_screen().build(),
    )
    .await;

    let result = a.handle.set_screen_sharing(true).await;

    assert!(matches!(result, Err(MeshError::DeviceUnavailable(_))));
    assert!(!a.state().await.local_media.screen_sharing);
}

// ============================================================================
// Presence edge cases
// ============================================================================

#[tokio::test]
async fn test_signaling_from_unknown_sender_creates_responder() {
    let hub = MemoryHub::new();
    let a = TestPeer::spawn(&hub, &meeting(), test_config()).await;
    let stranger = ParticipantId::new();

    assert!(hub.inject(&meeting(), a.participant_id, offer_from(stranger, a.participant_id)));

    let hub_ref = &hub;
    let a_id = a.participant_id;
    assert!(
        eventually(move || async move {
            hub_ref.count_between(a_id, stranger, SignalKind::Answer) == 1
        })
        .await
    );
    let state = a.state().await;
    assert!(state.roster.contains(&stranger));
    assert_eq!(state.peer(stranger).unwrap().role, PeerRole::Responder);
}

#[tokio::test]
async fn test_signaling_for_other_receiver_is_ignored() {
    let hub = MemoryHub::new();
    let a = TestPeer::spawn(&hub, &meeting(), test_config()).await;
    let stranger = ParticipantId::new();
    let marker = ParticipantId::new();

    assert!(hub.inject(&meeting(), a.participant_id, offer_from(stranger, ParticipantId::new())));
    assert!(hub.inject(
        &meeting(),
        a.participant_id,
        TransportEvent::Presence(PresenceEvent::Joined(marker))
    ));

    let a_ref = &a;
    assert!(
        eventually(move || async move { a_ref.state().await.roster.contains(&marker) }).await
    );
    let state = a.state().await;
    assert!(state.peer(stranger).is_none());
    assert!(!state.roster.contains(&stranger));
}

#[tokio::test]
async fn test_late_signaling_from_departed_participant_is_dropped() {
    let hub = MemoryHub::new();
    let (a, b) = pair(&hub).await;
    let marker = ParticipantId::new();

    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let _guard = metrics::set_default_local_recorder(&recorder);

    hub.leave(&meeting(), b.participant_id);
    let a_ref = &a;
    assert!(
        eventually(move || async move { a_ref.state().await.peers.is_empty() }).await
    );

    // A candidate and an answer still in flight from B arrive after it left
    assert!(hub.inject(
        &meeting(),
        a.participant_id,
        whisper(
            b.participant_id,
            a.participant_id,
            SignalPayload::Candidate(IceCandidate::new(
                "candidate:1 1 udp 1 10.0.0.2 9 typ host"
            )),
        )
    ));
    assert!(hub.inject(
        &meeting(),
        a.participant_id,
        whisper(
            b.participant_id,
            a.participant_id,
            SignalPayload::Answer(SessionDescription::answer("late-answer")),
        )
    ));
    assert!(hub.inject(
        &meeting(),
        a.participant_id,
        TransportEvent::Presence(PresenceEvent::Joined(marker))
    ));
    assert!(
        eventually(move || async move { a_ref.state().await.roster.contains(&marker) }).await
    );

    let state = a.state().await;
    assert!(!state.roster.contains(&b.participant_id));
    assert!(state.peer(b.participant_id).is_none());
    assert_eq!(a.connections.connections_for(b.participant_id).len(), 1);

    let snapshot = snapshotter.snapshot().into_vec();
    let unknown_peer_drops: u64 = snapshot
        .iter()
        .filter(|(key, _, _, _)| {
            key.key().name() == "mesh_signaling_dropped_total"
                && key
                    .key()
                    .labels()
                    .any(|l| l.key() == "reason" && l.value() == "unknown_peer")
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(n) => *n,
            _ => 0,
        })
        .sum();
    assert_eq!(unknown_peer_drops, 2);
}

#[tokio::test]
async fn test_duplicate_join_keeps_existing_session() {
    let hub = MemoryHub::new();
    let (a, b) = pair(&hub).await;
    let generation = a.state().await.peer(b.participant_id).unwrap().generation;

    assert!(hub.inject(
        &meeting(),
        a.participant_id,
        TransportEvent::Presence(PresenceEvent::Joined(b.participant_id))
    ));
    a.handle.participant_joined(b.participant_id).await.unwrap();
    settle_updates().await;

    assert_eq!(a.connections.created_count(), 1);
    let state = a.state().await;
    assert_eq!(state.peers.len(), 1);
    assert_eq!(state.peer(b.participant_id).unwrap().generation, generation);
    assert_eq!(
        state.peer(b.participant_id).unwrap().state,
        PeerState::Connected
    );
}

#[tokio::test]
async fn test_roster_snapshot_reconciles_sessions() {
    let hub = MemoryHub::new();
    let (a, b) = pair(&hub).await;
    let stranger = ParticipantId::new();

    // Repeated snapshot: nothing new
    a.handle
        .roster_snapshot(vec![a.participant_id, b.participant_id])
        .await
        .unwrap();
    assert_eq!(a.connections.created_count(), 1);

    // A snapshot without B closes B's session and adds the stranger
    a.handle
        .roster_snapshot(vec![a.participant_id, stranger])
        .await
        .unwrap();

    let state = a.state().await;
    assert!(state.peer(b.participant_id).is_none());
    assert_eq!(state.peer(stranger).unwrap().role, PeerRole::Initiator);
    let mut expected = vec![a.participant_id, stranger];
    expected.sort();
    assert_eq!(state.roster, expected);
    assert!(a.connections.connection(b.participant_id).unwrap().is_closed());
}

#[tokio::test]
async fn test_connection_factory_failure_skips_participant() {
    let hub = MemoryHub::new();
    let a = TestPeer::spawn(&hub, &meeting(), test_config()).await;
    let broken = ParticipantId::new();
    a.connections.fail_for(broken);

    a.handle.participant_joined(broken).await.unwrap();

    let state = a.state().await;
    assert!(state.roster.contains(&broken));
    assert!(state.peer(broken).is_none());
}

#[tokio::test]
async fn test_rejoin_gets_new_generation_and_ignores_stale_updates() {
    let hub = MemoryHub::new();
    let a = TestPeer::spawn(&hub, &meeting(), test_config()).await;
    let other = ParticipantId::new();

    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let _guard = metrics::set_default_local_recorder(&recorder);

    a.handle.participant_joined(other).await.unwrap();
    let first = a.state().await.peer(other).unwrap().generation;

    a.handle.participant_left(other).await.unwrap();
    a.handle.participant_joined(other).await.unwrap();
    settle_updates().await;

    let state = a.state().await;
    let peer = state.peer(other).unwrap();
    assert!(peer.generation > first);
    // The old session's Closed update must not leak into the new one
    assert_eq!(peer.state, PeerState::New);
    assert_eq!(a.connections.connections_for(other).len(), 2);
    assert!(a.connections.connections_for(other)[0].is_closed());

    let snapshot = snapshotter.snapshot().into_vec();
    assert!(counter_total(&snapshot, "mesh_stale_updates_total") >= 1);
}

#[tokio::test]
async fn test_ice_servers_passed_to_factory() {
    let hub = MemoryHub::new();
    let (a, _b) = pair(&hub).await;

    assert_eq!(
        a.connections.last_ice_server_urls(),
        vec!["stun:stun.l.google.com:19302".to_string()]
    );
}

// ============================================================================
// Recovery
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_simultaneous_connectivity_loss_settles() {
    let hub = MemoryHub::new();
    let config = Config {
        watchdog_interval: Duration::from_secs(1),
        offer_timeout: Duration::from_secs(5),
        offer_retry_jitter: Duration::from_secs(2),
        ..test_config()
    };
    let a = TestPeer::spawn(&hub, &meeting(), config.clone()).await;
    let b = TestPeer::spawn(&hub, &meeting(), config).await;
    assert!(a.wait_connected_to(&[b.participant_id]).await);
    assert!(b.wait_connected_to(&[a.participant_id]).await);

    let a_conn = a.connections.connection(b.participant_id).unwrap();
    let b_conn = b.connections.connection(a.participant_id).unwrap();
    assert!(a_conn.set_ice_state(IceConnectionState::Connected).await);
    assert!(b_conn.set_ice_state(IceConnectionState::Connected).await);
    let answers_before = a_conn.answers_created() + b_conn.answers_created();

    // Both sides offer an ICE restart at once; the offers cross
    assert!(a_conn.set_ice_state(IceConnectionState::Failed).await);
    assert!(b_conn.set_ice_state(IceConnectionState::Failed).await);

    let mut answered = false;
    for _ in 0..300 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if a_conn.answers_created() + b_conn.answers_created() > answers_before {
            answered = true;
            break;
        }
    }
    assert!(answered, "crossing offers were never resolved");
    assert!(a_conn.ice_restart_offers() >= 1);
    assert!(b_conn.ice_restart_offers() >= 1);

    assert!(a_conn.set_ice_state(IceConnectionState::Connected).await);
    assert!(b_conn.set_ice_state(IceConnectionState::Connected).await);
    assert!(settles_within(&a, Duration::from_secs(60)).await);
    assert!(settles_within(&b, Duration::from_secs(60)).await);
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test]
async fn test_teardown_releases_everything() {
    let hub = MemoryHub::new();
    let (a, b) = pair(&hub).await;
    let conn = a.connections.connection(b.participant_id).unwrap();

    a.handle.teardown_all().await.unwrap();

    let state = a.state().await;
    assert!(state.torn_down);
    assert!(state.peers.is_empty());
    assert!(state.roster.is_empty());
    assert!(state.local_media.capture_stream.is_empty());
    assert!(a.devices.live_tracks().is_empty());
    assert!(conn.is_closed());
    assert_eq!(a.metrics.session_count(), 0);

    // Idempotent
    a.handle.teardown_all().await.unwrap();

    assert!(matches!(
        a.handle.set_local_muted(true).await,
        Err(MeshError::TornDown)
    ));

    // Late signaling creates nothing
    a.handle
        .signaling_message(SignalingMessage {
            sender_id: b.participant_id,
            receiver_id: a.participant_id,
            payload: SignalPayload::Offer(SessionDescription::offer("late")),
        })
        .await
        .unwrap();
    assert!(a.state().await.peers.is_empty());
}

#[tokio::test]
async fn test_cancel_stops_manager_and_releases_capture() {
    let hub = MemoryHub::new();
    let (mut a, b) = pair(&hub).await;
    let conn = a.connections.connection(b.participant_id).unwrap();

    a.handle.cancel();
    (&mut a.task).await.unwrap();

    assert!(a.handle.is_cancelled());
    assert!(conn.is_closed());
    assert!(a.devices.live_tracks().is_empty());
    assert!(a.handle.get_state().await.is_err());
}
