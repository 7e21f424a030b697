//! Actor model for the mesh session core.
//!
//! # Hierarchy
//!
//! ```text
//! SessionManagerActor (one per local participant per meeting)
//! ├── MediaCaptureController (owned, not an actor)
//! └── PeerSessionActor (one per remote participant)
//! ```
//!
//! The manager serializes every roster and session-map mutation. Each peer
//! session owns its connection exclusively and reports back over an
//! unbounded update channel tagged with its generation.
//!
//! # Cancellation
//!
//! Each peer session runs on a child of the manager's `CancellationToken`.
//! Cancelling the manager closes every session and releases local capture.

pub mod manager;
pub mod messages;
pub mod metrics;
pub mod peer;

pub use manager::{SessionManagerActor, SessionManagerDeps, SessionManagerHandle};
pub use messages::{
    MeshState, PeerInfo, PeerRole, PeerSnapshot, PeerState, PeerUpdate, PeerUpdateKind,
};
pub use metrics::{ActorMetrics, ActorType, MailboxMonitor};
pub use peer::{PeerSessionActor, PeerSessionConfig, PeerSessionHandle, SessionTiming};
