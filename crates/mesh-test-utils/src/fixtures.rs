//! Test configuration, participant bundles and polling helpers.

use crate::memory_hub::MemoryHub;
use crate::mock_connection::MockPeerConnectionFactory;
use crate::mock_devices::MockDevices;
use common::config::ObservabilityConfig;
use common::observability::init_tracing;
use common::types::{MeetingId, ParticipantId};
use mesh_session::actors::ActorMetrics;
use mesh_session::{
    Config, MeshState, PeerState, SessionManagerActor, SessionManagerDeps, SessionManagerHandle,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Attempts made by [`eventually`] before giving up.
const EVENTUALLY_ATTEMPTS: usize = 300;
const EVENTUALLY_INTERVAL: Duration = Duration::from_millis(10);

/// Configuration for tests: microphone and camera requested, timers long
/// enough that the watchdog never fires unless a test drives the clock.
#[must_use]
pub fn test_config() -> Config {
    Config {
        watchdog_interval: Duration::from_secs(60),
        offer_timeout: Duration::from_secs(120),
        offer_retry_jitter: Duration::ZERO,
        session_close_timeout: Duration::from_secs(1),
        initial_audio: true,
        initial_video: true,
        ..Config::default()
    }
}

/// Install the workspace subscriber from `MESH_LOG_LEVEL`/`MESH_JSON_LOGS`
/// (or `RUST_LOG`). Safe to call from every test; only the first install
/// takes effect.
pub fn init_test_tracing() {
    let vars: HashMap<String, String> = std::env::vars().collect();
    let config = ObservabilityConfig::from_vars(&vars).unwrap_or_default();
    let _ = init_tracing(&config);
}

/// Poll `check` until it returns `true`. Returns `false` on timeout.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..EVENTUALLY_ATTEMPTS {
        if check().await {
            return true;
        }
        tokio::time::sleep(EVENTUALLY_INTERVAL).await;
    }
    false
}

/// One participant's manager with its mocks, spawned against a hub.
pub struct TestPeer {
    pub participant_id: ParticipantId,
    pub handle: SessionManagerHandle,
    pub task: JoinHandle<()>,
    pub devices: Arc<MockDevices>,
    pub connections: MockPeerConnectionFactory,
    pub metrics: Arc<ActorMetrics>,
}

impl TestPeer {
    /// Spawn with every device available.
    pub async fn spawn(hub: &MemoryHub, meeting: &MeetingId, config: Config) -> Self {
        Self::spawn_with_devices(hub, meeting, config, MockDevices::available()).await
    }

    /// Spawn and wait until the manager has subscribed to the hub.
    pub async fn spawn_with_devices(
        hub: &MemoryHub,
        meeting: &MeetingId,
        config: Config,
        devices: Arc<MockDevices>,
    ) -> Self {
        let participant_id = ParticipantId::new();
        let connections = MockPeerConnectionFactory::new();
        let metrics = ActorMetrics::new();

        let deps = SessionManagerDeps {
            transport: hub.transport(participant_id),
            connections: Arc::new(connections.clone()),
            devices: Arc::clone(&devices) as Arc<dyn mesh_session::media::MediaDevices>,
        };

        let (handle, task) = SessionManagerActor::spawn(
            meeting.clone(),
            participant_id,
            config,
            deps,
            CancellationToken::new(),
            Arc::clone(&metrics),
        );

        let subscribed = eventually(|| {
            let hub = hub.clone();
            let meeting = meeting.clone();
            async move { hub.members(&meeting).contains(&participant_id) }
        })
        .await;
        assert!(subscribed, "participant never subscribed to the hub");

        Self {
            participant_id,
            handle,
            task,
            devices,
            connections,
            metrics,
        }
    }

    pub async fn state(&self) -> MeshState {
        self.handle.get_state().await.expect("manager stopped")
    }

    /// Wait until the manager has a connected, idle session to each of
    /// `peers` and to no one else.
    pub async fn wait_connected_to(&self, peers: &[ParticipantId]) -> bool {
        let mut expected = peers.to_vec();
        expected.sort();
        eventually(|| {
            let handle = self.handle.clone();
            let expected = expected.clone();
            async move {
                let Some(settled) = settled_peers(&handle).await else {
                    return false;
                };
                settled == expected
            }
        })
        .await
    }

    /// Wait until every session of this manager has finished negotiating.
    pub async fn wait_settled(&self) -> bool {
        eventually(|| {
            let handle = self.handle.clone();
            async move { settled_peers(&handle).await.is_some() }
        })
        .await
    }
}

/// Sorted ids of the manager's sessions if every one of them is connected
/// with no round in flight, asking each session directly.
async fn settled_peers(handle: &SessionManagerHandle) -> Option<Vec<ParticipantId>> {
    let state = handle.get_state().await.ok()?;
    let mut settled = Vec::with_capacity(state.peers.len());
    for peer in &state.peers {
        let session = handle.peer(peer.participant_id).await.ok()??;
        let snapshot = session.get_state().await.ok()?;
        if snapshot.state != PeerState::Connected || snapshot.renegotiation_in_flight {
            return None;
        }
        settled.push(peer.participant_id);
    }
    Some(settled)
}
