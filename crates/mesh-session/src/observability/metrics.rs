//! Metric definitions for the mesh session core.
//!
//! All metrics follow Prometheus naming conventions:
//! - `mesh_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms

use crate::signaling::SignalKind;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Drop reason: inbound offer while a local offer was outstanding.
pub const DROP_GLARE: &str = "glare";
/// Drop reason: answer with no outstanding offer.
pub const DROP_UNEXPECTED_ANSWER: &str = "unexpected_answer";
/// Drop reason: candidate before any remote description.
pub const DROP_EARLY_CANDIDATE: &str = "early_candidate";
/// Drop reason: candidate after ICE connected.
pub const DROP_CONNECTED_CANDIDATE: &str = "connected_candidate";
/// Drop reason: message for a session that is closing.
pub const DROP_CLOSED: &str = "closed";
/// Drop reason: answer or candidate from a participant with no session.
pub const DROP_UNKNOWN_PEER: &str = "unknown_peer";

/// Renegotiation reason: connectivity lost.
pub const RENEGOTIATE_ICE_RESTART: &str = "ice_restart";
/// Renegotiation reason: outbound tracks changed.
pub const RENEGOTIATE_TRACK_CHANGE: &str = "track_change";
/// Renegotiation reason: offer went unanswered.
pub const RENEGOTIATE_RETRY: &str = "retry";

// ============================================================================
// Sessions
// ============================================================================

/// Set the number of live peer sessions.
///
/// Metric: `mesh_peer_sessions_active`
pub fn set_peer_sessions_active(count: usize) {
    // Session counts are tiny compared to f64 precision
    #[allow(clippy::cast_precision_loss)]
    gauge!("mesh_peer_sessions_active").set(count as f64);
}

/// Record an update discarded because its session was already replaced.
///
/// Metric: `mesh_stale_updates_total`
pub fn record_stale_update() {
    counter!("mesh_stale_updates_total").increment(1);
}

// ============================================================================
// Signaling
// ============================================================================

/// Metric: `mesh_signaling_sent_total`
/// Labels: `kind`
pub fn record_signaling_sent(kind: SignalKind) {
    counter!("mesh_signaling_sent_total", "kind" => kind.as_str()).increment(1);
}

/// Metric: `mesh_signaling_send_failures_total`
/// Labels: `kind`
pub fn record_signaling_send_failure(kind: SignalKind) {
    counter!("mesh_signaling_send_failures_total", "kind" => kind.as_str()).increment(1);
}

/// Record an inbound signaling message that was discarded.
///
/// Metric: `mesh_signaling_dropped_total`
/// Labels: `reason` (one of the `DROP_*` constants)
pub fn record_signaling_dropped(reason: &'static str) {
    counter!("mesh_signaling_dropped_total", "reason" => reason).increment(1);
}

// ============================================================================
// Negotiation
// ============================================================================

/// Metric: `mesh_renegotiations_total`
/// Labels: `reason` (one of the `RENEGOTIATE_*` constants)
pub fn record_renegotiation(reason: &'static str) {
    counter!("mesh_renegotiations_total", "reason" => reason).increment(1);
}

/// Time from sending or receiving an offer to the round completing.
///
/// Metric: `mesh_negotiation_duration_seconds`
pub fn record_negotiation_duration(duration: Duration) {
    histogram!("mesh_negotiation_duration_seconds").record(duration.as_secs_f64());
}

// ============================================================================
// Capture
// ============================================================================

/// Metric: `mesh_device_unavailable_total`
/// Labels: `source` (microphone, camera, screen)
pub fn record_device_unavailable(source: &'static str) {
    counter!("mesh_device_unavailable_total", "source" => source).increment(1);
}
