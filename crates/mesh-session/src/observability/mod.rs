//! Observability for the mesh session core.
//!
//! The crate emits metrics through the `metrics` facade and logs through
//! `tracing`; the embedding application installs the recorder and the
//! subscriber (see `common::observability::init_tracing`).
//!
//! # Privacy
//!
//! Session descriptions and candidates are never logged or used as labels,
//! only their kind. Metric labels are bounded:
//! - `kind`: offer, answer, candidate
//! - `reason`: fixed drop and renegotiation reasons
//! - `source`: microphone, camera, screen
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `mesh_peer_sessions_active` | Gauge | none | Live peer sessions |
//! | `mesh_signaling_sent_total` | Counter | `kind` | Messages handed to the transport |
//! | `mesh_signaling_send_failures_total` | Counter | `kind` | Transport send failures |
//! | `mesh_signaling_dropped_total` | Counter | `reason` | Inbound messages discarded |
//! | `mesh_renegotiations_total` | Counter | `reason` | Renegotiation rounds started |
//! | `mesh_stale_updates_total` | Counter | none | Updates from replaced sessions |
//! | `mesh_device_unavailable_total` | Counter | `source` | Capture denied or missing |
//! | `mesh_negotiation_duration_seconds` | Histogram | none | Offer to connected |

pub mod metrics;

pub use metrics::{
    record_device_unavailable, record_negotiation_duration, record_renegotiation,
    record_signaling_dropped, record_signaling_send_failure, record_signaling_sent,
    record_stale_update, set_peer_sessions_active,
};
