//! Mesh Session
//!
//! Client-side media-session core for mesh video meetings. Every participant
//! holds one negotiated peer connection to every other participant; there is
//! no media server in the path.
//!
//! # Architecture
//!
//! ```text
//! SessionManagerActor (one per meeting membership)
//!     ├── MediaCaptureController (local tracks, mute/video/screen flags)
//!     ├── SignalingTransport subscription (presence + whispers)
//!     └── PeerSessionActor (one per remote participant)
//!             └── Box<dyn PeerConnection> (owned exclusively)
//! ```
//!
//! The manager is the single writer of the roster, the session registry and
//! the local capture state. Each peer session is the single owner of its
//! connection primitive; the manager talks to it only through its handle.
//! Updates coming back from a session carry the session's generation, so an
//! update from a torn-down session can never touch its replacement.
//!
//! # Modules
//!
//! - [`actors`]: session manager and per-peer session actors
//! - [`media`]: local tracks, the capture device contract and the controller
//! - [`negotiation`]: the connection-primitive contract
//! - [`signaling`]: the signaling transport contract, wire codec and adapter
//! - [`config`]: environment-driven configuration
//! - [`errors`]: error taxonomy
//! - [`observability`]: metric emission

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod actors;
pub mod config;
pub mod errors;
pub mod media;
pub mod negotiation;
pub mod observability;
pub mod signaling;

pub use actors::{
    MeshState, PeerInfo, PeerRole, PeerSessionActor, PeerSessionHandle, PeerState,
    SessionManagerActor, SessionManagerDeps, SessionManagerHandle,
};
pub use config::Config;
pub use errors::MeshError;
