//! Tests for `MediaCaptureController`.
//!
//! Verifies which mutations renegotiate (`TrackChange::Replaced`) and which
//! only flip an enabled flag, and how screen sharing restores the camera.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use mesh_session::media::{
    DeviceError, MediaCaptureController, TrackChange, TrackKind, TrackRequest, TrackSource,
};
use mesh_test_utils::MockDevices;

async fn controller(devices: &Arc<MockDevices>, release_idle: bool) -> MediaCaptureController {
    let mut controller = MediaCaptureController::new(devices.clone(), release_idle);
    controller.acquire(true, true).await;
    controller
}

fn video_source(controller: &MediaCaptureController) -> Option<TrackSource> {
    controller
        .state()
        .capture_stream
        .track(TrackKind::Video)
        .map(|t| t.source())
}

// ============================================================================
// Acquisition
// ============================================================================

#[tokio::test]
async fn test_acquire_opens_microphone_and_camera() {
    let devices = MockDevices::available();
    let controller = controller(&devices, false).await;

    let state = controller.state();
    assert!(state.audio_enabled);
    assert!(state.video_enabled);
    assert!(!state.screen_sharing);
    assert_eq!(state.capture_stream.tracks().len(), 2);
    assert_eq!(devices.live_tracks().len(), 2);
}

#[tokio::test]
async fn test_acquire_with_denied_camera_keeps_microphone() {
    let devices = MockDevices::builder().deny_camera().build();
    let controller = controller(&devices, false).await;

    let state = controller.state();
    assert!(state.audio_enabled);
    assert!(!state.video_enabled);
    assert!(state.capture_stream.track(TrackKind::Video).is_none());
}

#[tokio::test]
async fn test_acquire_with_everything_denied_joins_without_media() {
    let devices = MockDevices::builder()
        .deny_camera()
        .deny_microphone()
        .build();
    let mut controller = MediaCaptureController::new(devices.clone(), false);

    let stream = controller.acquire(true, true).await;

    assert!(stream.is_empty());
    assert!(!controller.state().audio_enabled);
    assert!(!controller.state().video_enabled);
}

#[tokio::test]
async fn test_acquire_nothing_requested_opens_no_device() {
    let devices = MockDevices::available();
    let mut controller = MediaCaptureController::new(devices.clone(), false);

    let stream = controller.acquire(false, false).await;

    assert!(stream.is_empty());
    assert_eq!(devices.user_media_calls(), 0);
}

// ============================================================================
// Mute and camera toggles
// ============================================================================

#[tokio::test]
async fn test_mute_flips_enabled_flag_only() {
    let devices = MockDevices::available();
    let mut controller = controller(&devices, false).await;
    let microphone = controller
        .state()
        .capture_stream
        .track(TrackKind::Audio)
        .cloned()
        .unwrap();

    assert_eq!(
        controller.set_audio_muted(true).await.unwrap(),
        TrackChange::EnabledFlag
    );
    assert!(!controller.state().audio_enabled);
    assert!(!microphone.is_enabled());
    assert!(!microphone.is_ended());

    // Repeating is a no-op
    assert_eq!(
        controller.set_audio_muted(true).await.unwrap(),
        TrackChange::Unchanged
    );

    assert_eq!(
        controller.set_audio_muted(false).await.unwrap(),
        TrackChange::EnabledFlag
    );
    assert!(microphone.is_enabled());
    assert_eq!(devices.user_media_calls(), 1);
}

#[tokio::test]
async fn test_unmute_without_microphone_acquires_one() {
    let devices = MockDevices::builder().deny_microphone().build();
    let mut controller = controller(&devices, false).await;
    assert!(!controller.state().audio_enabled);

    devices.set_microphone_denied(false);
    assert_eq!(
        controller.set_audio_muted(false).await.unwrap(),
        TrackChange::Replaced
    );
    assert!(controller.state().audio_enabled);
}

#[tokio::test]
async fn test_unmute_with_denied_microphone_fails_cleanly() {
    let devices = MockDevices::builder().deny_microphone().build();
    let mut controller = controller(&devices, false).await;

    let result = controller.set_audio_muted(false).await;

    assert!(matches!(result, Err(DeviceError::PermissionDenied(_))));
    assert!(!controller.state().audio_enabled);
    assert!(controller.state().video_enabled);
}

#[tokio::test]
async fn test_video_off_flips_enabled_flag_only() {
    let devices = MockDevices::available();
    let mut controller = controller(&devices, false).await;

    assert_eq!(
        controller.set_video_off(true).await.unwrap(),
        TrackChange::EnabledFlag
    );
    assert!(!controller.state().video_enabled);
    assert_eq!(video_source(&controller), Some(TrackSource::Camera));

    assert_eq!(
        controller.set_video_off(false).await.unwrap(),
        TrackChange::EnabledFlag
    );
    assert!(controller.state().video_enabled);
}

#[tokio::test]
async fn test_set_track_enabled_without_track_is_unchanged() {
    let devices = MockDevices::builder().deny_camera().build();
    let mut controller = controller(&devices, false).await;

    assert_eq!(
        controller.set_track_enabled(TrackKind::Video, true),
        TrackChange::Unchanged
    );
    assert!(!controller.state().video_enabled);

    assert_eq!(
        controller.set_track_enabled(TrackKind::Audio, false),
        TrackChange::EnabledFlag
    );
    assert!(!controller.state().audio_enabled);
}

#[tokio::test]
async fn test_switch_track_keeps_old_track_when_device_fails() {
    let devices = MockDevices::available();
    let mut controller = controller(&devices, false).await;
    devices.set_camera_denied(true);

    let result = controller
        .switch_track(TrackKind::Video, TrackRequest::Device)
        .await;

    assert!(result.is_err());
    assert_eq!(video_source(&controller), Some(TrackSource::Camera));
    assert!(controller.state().video_enabled);
}

#[tokio::test]
async fn test_switch_track_rejects_screen_audio() {
    let devices = MockDevices::available();
    let mut controller = controller(&devices, false).await;

    let result = controller
        .switch_track(TrackKind::Audio, TrackRequest::Screen)
        .await;

    assert!(matches!(result, Err(DeviceError::Failed(_))));
    assert!(controller.state().audio_enabled);
}

// ============================================================================
// Screen sharing
// ============================================================================

#[tokio::test]
async fn test_screen_share_replaces_and_restores_live_camera() {
    let devices = MockDevices::available();
    let mut controller = controller(&devices, false).await;
    let camera = devices.live_track(TrackSource::Camera).unwrap();

    assert_eq!(
        controller.set_screen_sharing(true).await.unwrap(),
        TrackChange::Replaced
    );
    assert!(controller.state().screen_sharing);
    assert_eq!(video_source(&controller), Some(TrackSource::Screen));
    assert!(camera.is_ended());

    // Starting again is a no-op
    assert_eq!(
        controller.set_screen_sharing(true).await.unwrap(),
        TrackChange::Unchanged
    );

    let screen = devices.live_track(TrackSource::Screen).unwrap();
    assert_eq!(
        controller.set_screen_sharing(false).await.unwrap(),
        TrackChange::Replaced
    );
    assert!(screen.is_ended());
    assert!(!controller.state().screen_sharing);
    assert_eq!(video_source(&controller), Some(TrackSource::Camera));
    assert!(controller.state().video_enabled);
}

#[tokio::test]
async fn test_screen_share_restores_disabled_camera_as_disabled() {
    let devices = MockDevices::available();
    let mut controller = controller(&devices, false).await;
    controller.set_video_off(true).await.unwrap();

    controller.set_screen_sharing(true).await.unwrap();
    controller.set_screen_sharing(false).await.unwrap();

    assert_eq!(video_source(&controller), Some(TrackSource::Camera));
    assert!(!controller.state().video_enabled);
}

#[tokio::test]
async fn test_screen_share_without_camera_restores_nothing() {
    let devices = MockDevices::builder().deny_camera().build();
    let mut controller = controller(&devices, false).await;

    controller.set_screen_sharing(true).await.unwrap();
    assert!(controller.state().video_enabled);

    assert_eq!(
        controller.set_screen_sharing(false).await.unwrap(),
        TrackChange::Replaced
    );
    assert!(controller.state().capture_stream.track(TrackKind::Video).is_none());
    assert!(!controller.state().video_enabled);
    assert!(controller.state().audio_enabled);
}

#[tokio::test]
async fn test_camera_toggle_during_share_updates_restore_state() {
    let devices = MockDevices::available();
    let mut controller = controller(&devices, false).await;
    controller.set_screen_sharing(true).await.unwrap();

    assert_eq!(
        controller.set_video_off(true).await.unwrap(),
        TrackChange::Unchanged
    );
    // The screen track keeps flowing
    assert!(controller.state().video_enabled);
    assert_eq!(video_source(&controller), Some(TrackSource::Screen));

    controller.set_screen_sharing(false).await.unwrap();
    assert_eq!(video_source(&controller), Some(TrackSource::Camera));
    assert!(!controller.state().video_enabled);
}

#[tokio::test]
async fn test_denied_screen_share_leaves_camera_untouched() {
    let devices = MockDevices::builder().deny_screen().build();
    let mut controller = controller(&devices, false).await;
    let camera = devices.live_track(TrackSource::Camera).unwrap();

    let result = controller.set_screen_sharing(true).await;

    assert!(matches!(result, Err(DeviceError::PermissionDenied(_))));
    assert!(!controller.state().screen_sharing);
    assert!(!camera.is_ended());
    assert_eq!(video_source(&controller), Some(TrackSource::Camera));
}

// ============================================================================
// External track end
// ============================================================================

#[tokio::test]
async fn test_external_screen_end_restores_camera() {
    let devices = MockDevices::available();
    let mut controller = controller(&devices, false).await;
    controller.set_screen_sharing(true).await.unwrap();
    let screen = devices.live_track(TrackSource::Screen).unwrap();

    assert!(devices.end_screen_share());
    assert_eq!(
        controller.on_track_ended(screen.id()).await,
        TrackChange::Replaced
    );

    assert!(!controller.state().screen_sharing);
    assert_eq!(video_source(&controller), Some(TrackSource::Camera));
    assert!(controller.state().video_enabled);

    // A late duplicate notification changes nothing
    assert_eq!(
        controller.on_track_ended(screen.id()).await,
        TrackChange::Unchanged
    );
}

#[tokio::test]
async fn test_external_microphone_end_removes_track() {
    let devices = MockDevices::available();
    let mut controller = controller(&devices, false).await;
    let microphone = devices.live_track(TrackSource::Microphone).unwrap();

    assert!(devices.end_track(TrackSource::Microphone));
    assert_eq!(
        controller.on_track_ended(microphone.id()).await,
        TrackChange::Replaced
    );

    assert!(!controller.state().audio_enabled);
    assert!(controller.state().capture_stream.track(TrackKind::Audio).is_none());
    assert!(controller.state().video_enabled);
}

// ============================================================================
// Releasing devices
// ============================================================================

#[tokio::test]
async fn test_idle_devices_released_when_both_off() {
    let devices = MockDevices::available();
    let mut controller = controller(&devices, true).await;

    assert_eq!(
        controller.set_audio_muted(true).await.unwrap(),
        TrackChange::EnabledFlag
    );
    assert_eq!(
        controller.set_video_off(true).await.unwrap(),
        TrackChange::Replaced
    );
    assert!(controller.state().capture_stream.is_empty());
    assert!(devices.live_tracks().is_empty());

    assert_eq!(
        controller.set_audio_muted(false).await.unwrap(),
        TrackChange::Replaced
    );
    assert!(controller.state().audio_enabled);
    assert!(!controller.state().video_enabled);
}

#[tokio::test]
async fn test_idle_devices_kept_without_release() {
    let devices = MockDevices::available();
    let mut controller = controller(&devices, false).await;

    controller.set_audio_muted(true).await.unwrap();
    controller.set_video_off(true).await.unwrap();

    assert_eq!(controller.state().capture_stream.tracks().len(), 2);
    assert_eq!(devices.live_tracks().len(), 2);
}

#[tokio::test]
async fn test_stop_all_ends_every_track() {
    let devices = MockDevices::available();
    let mut controller = controller(&devices, false).await;
    controller.set_screen_sharing(true).await.unwrap();

    controller.stop_all();

    assert!(devices.live_tracks().is_empty());
    let state = controller.snapshot();
    assert!(state.capture_stream.is_empty());
    assert!(!state.screen_sharing);
    assert!(!state.audio_enabled);
    assert!(!state.video_enabled);
}
