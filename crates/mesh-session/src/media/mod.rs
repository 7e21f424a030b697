//! Local media: tracks, device access and the capture controller.

pub mod capture;
pub mod devices;
pub mod track;

pub use capture::{LocalMediaState, MediaCaptureController, TrackChange, TrackRequest};
pub use devices::{DeviceError, MediaDevices};
pub use track::{CaptureStream, MediaTrack, TrackKind, TrackSource};
