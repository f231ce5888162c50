//! Software device that replays externally supplied buffers as a sensor pair
//!
//! The device mirrors the real rig: a depth stream and a color stream, each with
//! a profile (resolution, pixel size, intrinsics), the depth-to-color extrinsics
//! and a matcher standing in for the hardware syncer. Frames enter through
//! [`FrameInjector`] handles and leave as decoded [`SoftwareFrameset`]s.

use crate::ingest::{CalibrationContext, CameraExtrinsics, CameraIntrinsics, StreamRole};
use crate::reconstruction::errors::ReconstructionError;
use crate::reconstruction::matcher::{FrameMatcher, InjectedFrame, MatchedPair};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Z16 depth: two bytes per pixel.
pub const DEPTH_BYTES_PER_PIXEL: usize = 2;
/// RGB8/BGR8 color: three bytes per pixel.
pub const COLOR_BYTES_PER_PIXEL: usize = 3;

/// Static description of one virtual stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamProfile {
    pub role: StreamRole,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bytes_per_pixel: usize,
    pub intrinsics: CameraIntrinsics,
}

impl StreamProfile {
    fn row_bytes(&self) -> usize {
        self.width as usize * self.bytes_per_pixel
    }

    fn validate(&self, frame: &InjectedFrame) -> Result<(), ReconstructionError> {
        let invalid = |reason: String| ReconstructionError::InvalidFrame {
            role: self.role,
            reason,
        };

        if frame.bytes_per_pixel != self.bytes_per_pixel {
            return Err(invalid(format!(
                "{} bytes per pixel, stream expects {}",
                frame.bytes_per_pixel, self.bytes_per_pixel
            )));
        }
        if frame.stride < self.row_bytes() {
            return Err(invalid(format!(
                "stride {} shorter than a {}-byte row",
                frame.stride,
                self.row_bytes()
            )));
        }
        let needed = frame.stride * (self.height as usize).saturating_sub(1) + self.row_bytes();
        if frame.pixels.len() < needed {
            return Err(invalid(format!(
                "{} bytes supplied, {} needed",
                frame.pixels.len(),
                needed
            )));
        }
        Ok(())
    }

    /// Copy rows out of a possibly padded buffer into a tight one.
    fn compact(&self, frame: &InjectedFrame) -> Vec<u8> {
        let row = self.row_bytes();
        if frame.stride == row {
            return frame.pixels[..row * self.height as usize].to_vec();
        }
        let mut out = Vec::with_capacity(row * self.height as usize);
        for y in 0..self.height as usize {
            let start = y * frame.stride;
            out.extend_from_slice(&frame.pixels[start..start + row]);
        }
        out
    }
}

/// A matched, decoded depth+color pair from the virtual device.
#[derive(Debug, Clone)]
pub struct SoftwareFrameset {
    pub sequence: u64,
    pub timestamp: f64,
    /// Raw depth in the depth sensor's own grid.
    pub depth: Vec<u16>,
    /// Tightly packed color pixels.
    pub color: Arc<[u8]>,
}

/// Cloneable handle that feeds frames into a [`VirtualDevice`].
#[derive(Debug, Clone)]
pub struct FrameInjector {
    depth: StreamProfile,
    color: StreamProfile,
    matcher: FrameMatcher,
}

impl FrameInjector {
    /// Validate a frame against its stream profile and hand it to the matcher.
    pub fn inject(&self, frame: InjectedFrame) -> Result<(), ReconstructionError> {
        let profile = match frame.role {
            StreamRole::Depth => &self.depth,
            StreamRole::Color => &self.color,
        };
        profile.validate(&frame)?;
        self.matcher.submit(frame);
        Ok(())
    }
}

/// Synthetic depth+color device.
#[derive(Debug)]
pub struct VirtualDevice {
    depth: StreamProfile,
    color: StreamProfile,
    depth_to_color: CameraExtrinsics,
    depth_units: f32,
    matcher: FrameMatcher,
}

impl VirtualDevice {
    /// Build a device whose streams mirror the calibrated sensors.
    pub fn new(calibration: &CalibrationContext, fps: u32) -> Self {
        let depth = StreamProfile {
            role: StreamRole::Depth,
            width: calibration.depth_intrinsics.width,
            height: calibration.depth_intrinsics.height,
            fps,
            bytes_per_pixel: DEPTH_BYTES_PER_PIXEL,
            intrinsics: calibration.depth_intrinsics,
        };
        let color = StreamProfile {
            role: StreamRole::Color,
            width: calibration.color_intrinsics.width,
            height: calibration.color_intrinsics.height,
            fps,
            bytes_per_pixel: COLOR_BYTES_PER_PIXEL,
            intrinsics: calibration.color_intrinsics,
        };
        debug!(
            "Virtual device: depth {}x{}, color {}x{} @ {} fps",
            depth.width, depth.height, color.width, color.height, fps
        );

        Self {
            depth,
            color,
            depth_to_color: calibration.depth_to_color,
            depth_units: calibration.depth_units,
            matcher: FrameMatcher::new(),
        }
    }

    pub fn depth_profile(&self) -> &StreamProfile {
        &self.depth
    }

    pub fn color_profile(&self) -> &StreamProfile {
        &self.color
    }

    pub fn depth_to_color(&self) -> &CameraExtrinsics {
        &self.depth_to_color
    }

    pub fn depth_units(&self) -> f32 {
        self.depth_units
    }

    /// A handle for injecting frames, possibly from another thread.
    pub fn injector(&self) -> FrameInjector {
        FrameInjector {
            depth: self.depth,
            color: self.color,
            matcher: self.matcher.clone(),
        }
    }

    /// Inject a frame directly.
    pub fn inject(&self, frame: InjectedFrame) -> Result<(), ReconstructionError> {
        self.injector().inject(frame)
    }

    /// Wait up to `timeout` for the syncer to release a matched pair.
    pub fn wait_for_frameset(&self, timeout: Duration) -> Option<SoftwareFrameset> {
        self.matcher
            .wait_for_pair(timeout)
            .map(|pair| self.decode(pair))
    }

    /// Frames the syncer has discarded so far.
    pub fn dropped_frames(&self) -> u64 {
        self.matcher.dropped_frames()
    }

    fn decode(&self, pair: MatchedPair) -> SoftwareFrameset {
        let depth_bytes = self.depth.compact(&pair.depth);
        let color = if pair.color.stride == self.color.row_bytes() {
            pair.color.pixels.clone()
        } else {
            self.color.compact(&pair.color).into()
        };

        SoftwareFrameset {
            sequence: pair.depth.sequence,
            timestamp: pair.depth.timestamp,
            depth: bytemuck::pod_collect_to_vec::<u8, u16>(&depth_bytes[..]),
            color,
        }
    }
}
