//! `MediaCaptureController` - sole owner of the local capture stream.
//!
//! Every start, stop, enable and replace of a local track goes through this
//! controller. Each mutating call reports a [`TrackChange`] so the session
//! manager knows whether peer sessions must renegotiate:
//!
//! - flipping an existing track's enabled flag never renegotiates
//! - a track appearing, disappearing or being swapped always does
//!
//! Screen sharing replaces the outbound video track. The camera state from
//! before the share (absent, present but off, present and on) is remembered
//! and restored when the share ends, whether the user stopped it or the
//! platform ended the screen track. Camera toggles during a share edit that
//! remembered state instead of touching the screen track.

use super::devices::{DeviceError, MediaDevices};
use super::track::{CaptureStream, MediaTrack, TrackKind, TrackSource};
use crate::observability::metrics;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Snapshot of local media flags and tracks.
#[derive(Debug, Clone, Default)]
pub struct LocalMediaState {
    /// Microphone track present and enabled.
    pub audio_enabled: bool,
    /// Outbound video (camera or screen) present and enabled.
    pub video_enabled: bool,
    pub screen_sharing: bool,
    pub capture_stream: CaptureStream,
}

/// Result of a capture mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackChange {
    /// Nothing observable changed.
    Unchanged,
    /// An existing track's enabled flag flipped. Senders pick it up without
    /// renegotiation.
    EnabledFlag,
    /// A track was added, removed or swapped.
    Replaced,
}

impl TrackChange {
    #[must_use]
    pub const fn requires_renegotiation(self) -> bool {
        matches!(self, TrackChange::Replaced)
    }
}

/// What [`MediaCaptureController::switch_track`] should put in a kind's slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackRequest {
    /// Open the microphone or camera.
    Device,
    /// Open a screen capture (video only).
    Screen,
    /// Leave the slot empty.
    Remove,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CameraState {
    present: bool,
    enabled: bool,
}

/// Owns local capture for one meeting membership.
pub struct MediaCaptureController {
    devices: Arc<dyn MediaDevices>,
    state: LocalMediaState,
    release_idle_devices: bool,
    /// Camera state to restore when the current screen share ends.
    camera_before_share: Option<CameraState>,
}

impl MediaCaptureController {
    #[must_use]
    pub fn new(devices: Arc<dyn MediaDevices>, release_idle_devices: bool) -> Self {
        Self {
            devices,
            state: LocalMediaState::default(),
            release_idle_devices,
            camera_before_share: None,
        }
    }

    pub fn state(&self) -> &LocalMediaState {
        &self.state
    }

    /// Cloned snapshot for observers.
    pub fn snapshot(&self) -> LocalMediaState {
        self.state.clone()
    }

    /// Handles to the current tracks, for attaching to senders.
    pub fn tracks(&self) -> Vec<MediaTrack> {
        self.state.capture_stream.tracks().to_vec()
    }

    /// Open the initial capture stream.
    ///
    /// Never fails: a denied or missing device leaves its kind out of the
    /// stream with its flag off. Any previous capture is stopped first.
    pub async fn acquire(&mut self, video: bool, audio: bool) -> CaptureStream {
        self.stop_all();

        if !video && !audio {
            debug!(target: "mesh.media.capture", "No capture requested");
            return self.state.capture_stream.clone();
        }

        match self.devices.get_user_media(video, audio).await {
            Ok(tracks) => {
                for track in tracks {
                    let kind = track.kind();
                    let requested = match kind {
                        TrackKind::Audio => audio,
                        TrackKind::Video => video,
                    };
                    if requested && self.state.capture_stream.track(kind).is_none() {
                        self.state.capture_stream.insert(track);
                    } else {
                        track.stop();
                    }
                }
            }
            Err(e) => {
                warn!(
                    target: "mesh.media.capture",
                    error = %e,
                    video,
                    audio,
                    "Capture unavailable, joining without local media"
                );
            }
        }

        for (requested, source) in [(audio, TrackSource::Microphone), (video, TrackSource::Camera)] {
            if requested && self.state.capture_stream.track(source.kind()).is_none() {
                metrics::record_device_unavailable(source.as_str());
            }
        }
        self.refresh_flags();

        info!(
            target: "mesh.media.capture",
            audio_enabled = self.state.audio_enabled,
            video_enabled = self.state.video_enabled,
            "Local capture acquired"
        );

        self.state.capture_stream.clone()
    }

    /// Flip an existing track's enabled flag.
    pub fn set_track_enabled(&mut self, kind: TrackKind, enabled: bool) -> TrackChange {
        let Some(track) = self.state.capture_stream.track(kind) else {
            return TrackChange::Unchanged;
        };
        if track.is_enabled() == enabled {
            return TrackChange::Unchanged;
        }
        track.set_enabled(enabled);
        self.refresh_flags();
        TrackChange::EnabledFlag
    }

    /// Replace whatever occupies `kind`'s slot.
    ///
    /// The new track is opened before the old one is stopped, so a failed
    /// acquisition leaves the stream untouched.
    pub async fn switch_track(
        &mut self,
        kind: TrackKind,
        request: TrackRequest,
    ) -> Result<TrackChange, DeviceError> {
        let source = match (kind, request) {
            (_, TrackRequest::Remove) => {
                let change = match self.state.capture_stream.take(kind) {
                    Some(old) => {
                        old.stop();
                        TrackChange::Replaced
                    }
                    None => TrackChange::Unchanged,
                };
                if kind == TrackKind::Video {
                    self.state.screen_sharing = false;
                }
                self.refresh_flags();
                return Ok(change);
            }
            (TrackKind::Audio, TrackRequest::Device) => TrackSource::Microphone,
            (TrackKind::Video, TrackRequest::Device) => TrackSource::Camera,
            (TrackKind::Video, TrackRequest::Screen) => TrackSource::Screen,
            (TrackKind::Audio, TrackRequest::Screen) => {
                return Err(DeviceError::Failed(
                    "screen capture provides video only".to_string(),
                ))
            }
        };

        let track = self.open(source).await?;
        self.install(track);
        Ok(TrackChange::Replaced)
    }

    /// Mute or unmute the microphone.
    ///
    /// Unmuting with no microphone track opens one, which replaces tracks.
    pub async fn set_audio_muted(&mut self, muted: bool) -> Result<TrackChange, DeviceError> {
        let change = if self.state.capture_stream.track(TrackKind::Audio).is_some() {
            self.set_track_enabled(TrackKind::Audio, !muted)
        } else if muted {
            TrackChange::Unchanged
        } else {
            self.switch_track(TrackKind::Audio, TrackRequest::Device)
                .await?
        };
        Ok(self.release_if_idle(change))
    }

    /// Turn the camera off or on.
    ///
    /// While a screen share is active only the camera state to restore
    /// changes.
    pub async fn set_video_off(&mut self, off: bool) -> Result<TrackChange, DeviceError> {
        if self.state.screen_sharing {
            let saved = self.camera_before_share.get_or_insert_with(CameraState::default);
            if off {
                saved.enabled = false;
            } else {
                saved.present = true;
                saved.enabled = true;
            }
            debug!(
                target: "mesh.media.capture",
                camera_on = !off,
                "Camera toggled during screen share, restore state updated"
            );
            return Ok(TrackChange::Unchanged);
        }

        let change = if self.state.capture_stream.track(TrackKind::Video).is_some() {
            self.set_track_enabled(TrackKind::Video, !off)
        } else if off {
            TrackChange::Unchanged
        } else {
            self.switch_track(TrackKind::Video, TrackRequest::Device)
                .await?
        };
        Ok(self.release_if_idle(change))
    }

    pub async fn set_screen_sharing(&mut self, enabled: bool) -> Result<TrackChange, DeviceError> {
        if enabled {
            self.start_screen_share().await
        } else {
            Ok(self.stop_screen_share().await)
        }
    }

    /// Replace the outbound video with a screen capture.
    pub async fn start_screen_share(&mut self) -> Result<TrackChange, DeviceError> {
        if self.state.screen_sharing {
            return Ok(TrackChange::Unchanged);
        }

        let prior = CameraState {
            present: self.state.capture_stream.track(TrackKind::Video).is_some(),
            enabled: self.state.video_enabled,
        };

        let change = self
            .switch_track(TrackKind::Video, TrackRequest::Screen)
            .await?;
        self.camera_before_share = Some(prior);
        self.state.screen_sharing = true;

        info!(
            target: "mesh.media.capture",
            camera_was_present = prior.present,
            camera_was_on = prior.enabled,
            "Screen share started"
        );
        Ok(change)
    }

    /// End the screen share and put the camera back as it was.
    ///
    /// A camera that cannot be reopened is left off.
    pub async fn stop_screen_share(&mut self) -> TrackChange {
        if !self.state.screen_sharing {
            return TrackChange::Unchanged;
        }

        if let Some(screen) = self.state.capture_stream.take(TrackKind::Video) {
            screen.stop();
        }
        self.state.screen_sharing = false;

        let prior = self.camera_before_share.take().unwrap_or_default();
        if prior.present {
            match self.open(TrackSource::Camera).await {
                Ok(camera) => {
                    camera.set_enabled(prior.enabled);
                    self.install(camera);
                }
                Err(e) => {
                    warn!(
                        target: "mesh.media.capture",
                        error = %e,
                        "Camera could not be restored after screen share"
                    );
                }
            }
        }
        self.refresh_flags();

        info!(
            target: "mesh.media.capture",
            camera_restored = self.state.capture_stream.track(TrackKind::Video).is_some(),
            "Screen share stopped"
        );
        self.release_if_idle(TrackChange::Replaced)
    }

    /// React to the platform ending a track.
    ///
    /// Notifications for tracks that are no longer current (already replaced
    /// or stopped by us) are ignored.
    pub async fn on_track_ended(&mut self, track_id: &str) -> TrackChange {
        let Some(track) = self
            .state
            .capture_stream
            .tracks()
            .iter()
            .find(|t| t.id() == track_id)
            .cloned()
        else {
            debug!(
                target: "mesh.media.capture",
                track_id,
                "Ignoring end of a track that is no longer current"
            );
            return TrackChange::Unchanged;
        };

        if track.source() == TrackSource::Screen {
            info!(target: "mesh.media.capture", "Screen share ended outside the application");
            return self.stop_screen_share().await;
        }

        warn!(
            target: "mesh.media.capture",
            source = track.source().as_str(),
            "Capture track ended unexpectedly"
        );
        metrics::record_device_unavailable(track.source().as_str());
        self.state.capture_stream.take(track.kind());
        self.refresh_flags();
        TrackChange::Replaced
    }

    /// Stop every track and reset all flags.
    pub fn stop_all(&mut self) {
        self.state.capture_stream.stop_all();
        self.state.screen_sharing = false;
        self.camera_before_share = None;
        self.refresh_flags();
    }

    /// Open one track from `source`, stopping any extra tracks the platform
    /// handed back.
    async fn open(&self, source: TrackSource) -> Result<MediaTrack, DeviceError> {
        let result = match source {
            TrackSource::Microphone => self.devices.get_user_media(false, true).await,
            TrackSource::Camera => self.devices.get_user_media(true, false).await,
            TrackSource::Screen => self.devices.get_display_media().await.map(|t| vec![t]),
        };

        let tracks = result.map_err(|e| {
            warn!(
                target: "mesh.media.capture",
                source = source.as_str(),
                error = %e,
                "Device unavailable"
            );
            metrics::record_device_unavailable(source.as_str());
            e
        })?;

        let mut wanted = None;
        for track in tracks {
            if wanted.is_none() && track.kind() == source.kind() {
                wanted = Some(track);
            } else {
                track.stop();
            }
        }

        wanted.ok_or_else(|| {
            metrics::record_device_unavailable(source.as_str());
            DeviceError::NotFound(source.as_str().to_string())
        })
    }

    fn install(&mut self, track: MediaTrack) {
        if let Some(old) = self.state.capture_stream.insert(track) {
            old.stop();
        }
        self.refresh_flags();
    }

    /// With idle release on, drop all capture once nothing is being sent.
    fn release_if_idle(&mut self, change: TrackChange) -> TrackChange {
        if !self.release_idle_devices
            || self.state.audio_enabled
            || self.state.video_enabled
            || self.state.screen_sharing
            || self.state.capture_stream.is_empty()
        {
            return change;
        }

        info!(target: "mesh.media.capture", "Microphone and camera off, releasing devices");
        self.state.capture_stream.stop_all();
        self.refresh_flags();
        TrackChange::Replaced
    }

    fn refresh_flags(&mut self) {
        let enabled = |kind| {
            self.state
                .capture_stream
                .track(kind)
                .is_some_and(MediaTrack::is_enabled)
        };
        let audio = enabled(TrackKind::Audio);
        let video = enabled(TrackKind::Video);
        self.state.audio_enabled = audio;
        self.state.video_enabled = video;
    }
}
