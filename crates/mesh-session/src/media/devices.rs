//! Capture device contract.

use super::track::MediaTrack;
use async_trait::async_trait;
use thiserror::Error;

/// Capture failures reported by the platform.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("permission denied for {0}")]
    PermissionDenied(String),

    #[error("no {0} device found")]
    NotFound(String),

    #[error("capture failed: {0}")]
    Failed(String),
}

/// Access to the platform's capture devices.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Open the microphone and/or camera.
    ///
    /// Returns at most one track per requested kind. May be denied.
    async fn get_user_media(&self, video: bool, audio: bool)
        -> Result<Vec<MediaTrack>, DeviceError>;

    /// Open a screen-capture track. The track may end at any time when the
    /// user stops sharing from outside the application.
    async fn get_display_media(&self) -> Result<MediaTrack, DeviceError>;
}
