//! # Mesh Test Utilities
//!
//! Mocks and fixtures for testing the mesh session core without a real
//! signaling backend, media stack or capture devices.
//!
//! ## Modules
//!
//! - `memory_hub` - In-memory signaling transport shared by several participants
//! - `mock_connection` - Scripted connection primitive with an inspectable handle
//! - `mock_devices` - Capture devices that can deny access or end tracks
//! - `fixtures` - Test configuration, a spawned participant bundle, polling helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mesh_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let hub = MemoryHub::new();
//!     let meeting = MeetingId::new("meeting-1");
//!
//!     let a = TestPeer::spawn(&hub, &meeting, test_config()).await;
//!     let b = TestPeer::spawn(&hub, &meeting, test_config()).await;
//!
//!     assert!(a.wait_connected_to(&[b.participant_id]).await);
//! }
//! ```

pub mod fixtures;
pub mod memory_hub;
pub mod mock_connection;
pub mod mock_devices;

pub use fixtures::{eventually, init_test_tracing, test_config, TestPeer};
pub use memory_hub::{MemoryHub, MemoryTransport};
pub use mock_connection::{MockConnectionHandle, MockPeerConnectionFactory};
pub use mock_devices::{MockDevices, MockDevicesBuilder};

pub use common::types::{MeetingId, ParticipantId};
