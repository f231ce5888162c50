//! Sensor capability traits
//!
//! The engine never talks to a vendor SDK directly. A [`SensorRig`] covers the
//! short startup pass with both streams open; once calibration is done it is
//! consumed into a [`DepthStream`] with the color sensor released.

use crate::ingest::calibration::{CameraExtrinsics, CameraIntrinsics};
use crate::ingest::frames::{ColorFrame, DepthFrame};
use std::time::Duration;

/// Errors that can occur while reading from a sensor.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Failed to open device: {0}")]
    OpenFailed(String),
    #[error("No frame arrived within {0:?}")]
    Timeout(Duration),
    #[error("Stream ended unexpectedly")]
    StreamEnded,
}

/// A depth and color pair delivered together during calibration.
#[derive(Debug, Clone)]
pub struct CapturedFrameset {
    pub depth: DepthFrame,
    pub color: ColorFrame,
    pub depth_intrinsics: CameraIntrinsics,
    pub color_intrinsics: CameraIntrinsics,
    pub depth_to_color: CameraExtrinsics,
    /// Meters per raw depth unit.
    pub depth_units: f32,
}

/// A live depth-only stream.
pub trait DepthStream {
    /// Block until the next depth frame arrives or `timeout` elapses.
    fn wait_for_depth(&mut self, timeout: Duration) -> Result<DepthFrame, StreamError>;

    /// Intrinsics of the depth sensor.
    fn intrinsics(&self) -> CameraIntrinsics;

    /// Get the frame rate (frames per second), if known.
    fn frame_rate(&self) -> Option<f32>;

    /// Check if the stream is still active.
    fn is_active(&self) -> bool;

    /// Stop streaming.
    fn stop(&mut self);
}

/// A depth+color device used for the startup calibration pass.
pub trait SensorRig {
    type Depth: DepthStream;

    /// Open both streams.
    fn start(&mut self) -> Result<(), StreamError>;

    /// Block until the next matched depth+color frameset or `timeout` elapses.
    fn wait_for_frameset(&mut self, timeout: Duration) -> Result<CapturedFrameset, StreamError>;

    /// Close both streams.
    fn stop(&mut self);

    /// Reopen with depth only, leaving the color sensor free for another process.
    fn into_depth_stream(self) -> Result<Self::Depth, StreamError>;
}
