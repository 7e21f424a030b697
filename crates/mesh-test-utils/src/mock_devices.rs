//! Mock capture devices.
//!
//! # Example
//!
//! ```rust,ignore
//! let devices = MockDevices::builder()
//!     .deny_camera()
//!     .build();
//!
//! // Later, simulate the user pressing the browser's "stop sharing"
//! devices.end_screen_share();
//! ```

use async_trait::async_trait;
use mesh_session::media::{DeviceError, MediaDevices, MediaTrack, TrackSource};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Capture devices whose availability can be scripted.
#[derive(Debug, Default)]
pub struct MockDevices {
    deny_camera: AtomicBool,
    deny_microphone: AtomicBool,
    deny_screen: AtomicBool,
    user_media_calls: AtomicUsize,
    display_media_calls: AtomicUsize,
    opened: Mutex<Vec<MediaTrack>>,
}

impl MockDevices {
    #[must_use]
    pub fn builder() -> MockDevicesBuilder {
        MockDevicesBuilder::default()
    }

    /// Every device available.
    #[must_use]
    pub fn available() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_camera_denied(&self, denied: bool) {
        self.deny_camera.store(denied, Ordering::SeqCst);
    }

    pub fn set_microphone_denied(&self, denied: bool) {
        self.deny_microphone.store(denied, Ordering::SeqCst);
    }

    pub fn set_screen_denied(&self, denied: bool) {
        self.deny_screen.store(denied, Ordering::SeqCst);
    }

    #[must_use]
    pub fn user_media_calls(&self) -> usize {
        self.user_media_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn display_media_calls(&self) -> usize {
        self.display_media_calls.load(Ordering::SeqCst)
    }

    /// Every track ever handed out, oldest first.
    #[must_use]
    pub fn opened_tracks(&self) -> Vec<MediaTrack> {
        self.opened.lock().expect("mock devices lock poisoned").clone()
    }

    /// Tracks handed out that have not been stopped.
    #[must_use]
    pub fn live_tracks(&self) -> Vec<MediaTrack> {
        self.opened_tracks()
            .into_iter()
            .filter(|t| !t.is_ended())
            .collect()
    }

    /// The most recent live track from `source`.
    #[must_use]
    pub fn live_track(&self, source: TrackSource) -> Option<MediaTrack> {
        self.live_tracks()
            .into_iter()
            .rev()
            .find(|t| t.source() == source)
    }

    /// End the live track from `source` as the platform would. Returns
    /// whether one was live.
    pub fn end_track(&self, source: TrackSource) -> bool {
        match self.live_track(source) {
            Some(track) => {
                track.stop();
                true
            }
            None => false,
        }
    }

    /// The user stopped sharing from outside the application.
    pub fn end_screen_share(&self) -> bool {
        self.end_track(TrackSource::Screen)
    }

    fn open(&self, source: TrackSource) -> MediaTrack {
        let track = MediaTrack::new(source);
        self.opened
            .lock()
            .expect("mock devices lock poisoned")
            .push(track.clone());
        track
    }
}

#[async_trait]
impl MediaDevices for MockDevices {
    async fn get_user_media(
        &self,
        video: bool,
        audio: bool,
    ) -> Result<Vec<MediaTrack>, DeviceError> {
        self.user_media_calls.fetch_add(1, Ordering::SeqCst);

        let camera = video && !self.deny_camera.load(Ordering::SeqCst);
        let microphone = audio && !self.deny_microphone.load(Ordering::SeqCst);
        if !camera && !microphone {
            return Err(DeviceError::PermissionDenied(
                match (video, audio) {
                    (true, true) => "camera and microphone",
                    (true, false) => "camera",
                    _ => "microphone",
                }
                .to_string(),
            ));
        }

        let mut tracks = Vec::new();
        if microphone {
            tracks.push(self.open(TrackSource::Microphone));
        }
        if camera {
            tracks.push(self.open(TrackSource::Camera));
        }
        Ok(tracks)
    }

    async fn get_display_media(&self) -> Result<MediaTrack, DeviceError> {
        self.display_media_calls.fetch_add(1, Ordering::SeqCst);
        if self.deny_screen.load(Ordering::SeqCst) {
            return Err(DeviceError::PermissionDenied("screen".to_string()));
        }
        Ok(self.open(TrackSource::Screen))
    }
}

/// Builder for [`MockDevices`].
#[derive(Debug, Default)]
pub struct MockDevicesBuilder {
    deny_camera: bool,
    deny_microphone: bool,
    deny_screen: bool,
}

impl MockDevicesBuilder {
    #[must_use]
    pub fn deny_camera(mut self) -> Self {
        self.deny_camera = true;
        self
    }

    #[must_use]
    pub fn deny_microphone(mut self) -> Self {
        self.deny_microphone = true;
        self
    }

    #[must_use]
    pub fn deny_screen(mut self) -> Self {
        self.deny_screen = true;
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<MockDevices> {
        Arc::new(MockDevices {
            deny_camera: AtomicBool::new(self.deny_camera),
            deny_microphone: AtomicBool::new(self.deny_microphone),
            deny_screen: AtomicBool::new(self.deny_screen),
            ..MockDevices::default()
        })
    }
}
