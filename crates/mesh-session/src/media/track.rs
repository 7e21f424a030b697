//! Local media tracks and the capture stream that groups them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Media kind of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }
}

/// Where a local track comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackSource {
    Microphone,
    Camera,
    Screen,
}

impl TrackSource {
    #[must_use]
    pub const fn kind(self) -> TrackKind {
        match self {
            TrackSource::Microphone => TrackKind::Audio,
            TrackSource::Camera | TrackSource::Screen => TrackKind::Video,
        }
    }

    /// Returns the source as a string for metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TrackSource::Microphone => "microphone",
            TrackSource::Camera => "camera",
            TrackSource::Screen => "screen",
        }
    }
}

struct TrackInner {
    id: String,
    source: TrackSource,
    enabled: AtomicBool,
    ended: CancellationToken,
}

/// A live local capture track.
///
/// Clones share the same underlying track: every peer session holds a clone
/// for its sender, while only the capture controller flips the enabled flag
/// or stops the track.
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    /// Create an enabled, live track with a fresh id.
    #[must_use]
    pub fn new(source: TrackSource) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), source)
    }

    #[must_use]
    pub fn with_id(id: impl Into<String>, source: TrackSource) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: id.into(),
                source,
                enabled: AtomicBool::new(true),
                ended: CancellationToken::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.source.kind()
    }

    pub fn source(&self) -> TrackSource {
        self.inner.source
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Whether capture on this track has stopped.
    pub fn is_ended(&self) -> bool {
        self.inner.ended.is_cancelled()
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Release);
    }

    /// Stop capture. Fires the ended notification; idempotent.
    ///
    /// Called by the capture controller, or by the platform when the user
    /// ends capture from outside the application.
    pub fn stop(&self) {
        self.inner.ended.cancel();
    }

    /// Resolves once the track has ended.
    pub async fn ended(&self) {
        self.inner.ended.cancelled().await;
    }

    /// Token that fires when the track ends, for watchers that outlive a
    /// borrow of the track.
    pub(crate) fn ended_token(&self) -> CancellationToken {
        self.inner.ended.clone()
    }
}

impl PartialEq for MediaTrack {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for MediaTrack {}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("source", &self.inner.source)
            .field("enabled", &self.is_enabled())
            .field("ended", &self.is_ended())
            .finish()
    }
}

/// The local participant's capture stream: at most one track per kind.
#[derive(Debug, Clone, Default)]
pub struct CaptureStream {
    tracks: Vec<MediaTrack>,
}

impl CaptureStream {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn track(&self, kind: TrackKind) -> Option<&MediaTrack> {
        self.tracks.iter().find(|t| t.kind() == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Insert a track, returning the one it displaced for the same kind.
    pub(crate) fn insert(&mut self, track: MediaTrack) -> Option<MediaTrack> {
        let previous = self.take(track.kind());
        self.tracks.push(track);
        previous
    }

    pub(crate) fn take(&mut self, kind: TrackKind) -> Option<MediaTrack> {
        let index = self.tracks.iter().position(|t| t.kind() == kind)?;
        Some(self.tracks.remove(index))
    }

    /// Stop and drop every track.
    pub(crate) fn stop_all(&mut self) {
        for track in self.tracks.drain(..) {
            track.stop();
        }
    }
}
