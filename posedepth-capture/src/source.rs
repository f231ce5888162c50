//! Common capture types: errors and sensor profiles.

use glam::Vec3;
use posedepth_core::ingest::{CameraExtrinsics, CameraIntrinsics, DistortionModel, StreamError};
use std::time::Duration;
use thiserror::Error;

/// Default stream width, pixels.
pub const DEFAULT_WIDTH: u32 = 1280;
/// Default stream height, pixels.
pub const DEFAULT_HEIGHT: u32 = 720;
/// Default frame rate for both streams.
pub const DEFAULT_FPS: u32 = 30;
/// Meters per raw Z16 unit.
pub const DEFAULT_DEPTH_UNITS: f32 = 0.001;

/// Errors that can occur during capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Stream not started")]
    NotStarted,

    #[error("No frame within {0:?}")]
    Timeout(Duration),

    #[error("Stream ended")]
    StreamEnded,
}

impl From<CaptureError> for StreamError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::Timeout(waited) => StreamError::Timeout(waited),
            CaptureError::StreamEnded => StreamError::StreamEnded,
            other @ CaptureError::NotStarted => StreamError::OpenFailed(other.to_string()),
        }
    }
}

/// Stream configuration and factory calibration of a depth+color rig.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigProfile {
    pub fps: u32,
    pub depth_units: f32,
    pub depth_intrinsics: CameraIntrinsics,
    pub color_intrinsics: CameraIntrinsics,
    pub depth_to_color: CameraExtrinsics,
}

impl Default for RigProfile {
    /// 1280x720 at 30 fps with a wide depth imager and a narrower color lens
    /// 15 mm to its side.
    fn default() -> Self {
        let (w, h) = (DEFAULT_WIDTH, DEFAULT_HEIGHT);
        let depth_intrinsics = CameraIntrinsics::pinhole(w, h, 640.0, 640.0, 640.0, 360.0)
            .with_distortion(DistortionModel::BrownConrady, [0.0; 5]);
        let color_intrinsics = CameraIntrinsics::pinhole(w, h, 910.0, 910.0, 640.0, 360.0)
            .with_distortion(DistortionModel::InverseBrownConrady, [0.0; 5]);

        Self {
            fps: DEFAULT_FPS,
            depth_units: DEFAULT_DEPTH_UNITS,
            depth_intrinsics,
            color_intrinsics,
            depth_to_color: CameraExtrinsics::from_translation(Vec3::new(0.015, 0.0, 0.0)),
        }
    }
}

impl RigProfile {
    /// Same optics at a different resolution; focal lengths and principal
    /// points scale with the image.
    pub fn scaled(width: u32, height: u32) -> Self {
        let base = Self::default();
        Self {
            depth_intrinsics: scale_intrinsics(&base.depth_intrinsics, width, height),
            color_intrinsics: scale_intrinsics(&base.color_intrinsics, width, height),
            ..base
        }
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps.max(1);
        self
    }

    pub fn with_depth_to_color(mut self, extrinsics: CameraExtrinsics) -> Self {
        self.depth_to_color = extrinsics;
        self
    }

    /// Time between frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }

    /// Timestamp of frame `n` on the stream clock, milliseconds.
    pub fn timestamp_ms(&self, frame_number: u64) -> f64 {
        frame_number as f64 * 1000.0 / self.fps.max(1) as f64
    }
}

fn scale_intrinsics(intrinsics: &CameraIntrinsics, width: u32, height: u32) -> CameraIntrinsics {
    let sx = width as f32 / intrinsics.width as f32;
    let sy = height as f32 / intrinsics.height as f32;
    CameraIntrinsics {
        width,
        height,
        ppx: intrinsics.ppx * sx,
        ppy: intrinsics.ppy * sy,
        fx: intrinsics.fx * sx,
        fy: intrinsics.fy * sy,
        ..*intrinsics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile() {
        let profile = RigProfile::default();
        assert_eq!(profile.fps, 30);
        assert_eq!(profile.color_intrinsics.width, 1280);
        assert_eq!(profile.color_intrinsics.height, 720);
        assert_eq!(profile.depth_units, 0.001);
        assert_eq!(profile.depth_to_color.translation, [0.015, 0.0, 0.0]);
    }

    #[test]
    fn test_scaled_profile_keeps_field_of_view() {
        let profile = RigProfile::scaled(320, 180);
        let c = profile.color_intrinsics;
        assert_eq!((c.width, c.height), (320, 180));
        assert!((c.fx - 227.5).abs() < 1e-4);
        assert!((c.ppx - 160.0).abs() < 1e-4);
        assert_eq!(c.model, DistortionModel::InverseBrownConrady);
    }

    #[test]
    fn test_timestamps_follow_frame_clock() {
        let profile = RigProfile::default();
        assert_eq!(profile.timestamp_ms(0), 0.0);
        assert!((profile.timestamp_ms(3) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_capture_error_into_stream_error() {
        let timeout: StreamError = CaptureError::Timeout(Duration::from_millis(5)).into();
        assert!(matches!(timeout, StreamError::Timeout(_)));
        let not_started: StreamError = CaptureError::NotStarted.into();
        assert!(matches!(
            not_started,
            StreamError::OpenFailed(ref msg) if msg == "Stream not started"
        ));
        let ended: StreamError = CaptureError::StreamEnded.into();
        assert!(matches!(ended, StreamError::StreamEnded));
    }
}
