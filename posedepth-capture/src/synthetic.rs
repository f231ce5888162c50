//! Synthetic depth+color rig
//!
//! Renders a simple scene (a wall, optionally tilted, with an optional block in
//! front of it) through the rig's calibrated optics. Useful for running the whole
//! pipeline without hardware.

use crate::source::{CaptureError, RigProfile};
use glam::{Vec2, Vec3};
use image::{Rgb, RgbImage};
use posedepth_core::ingest::{
    CameraIntrinsics, CapturedFrameset, ColorFrame, DepthFrame, DepthStream, SensorRig,
    StreamError,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// An axis-aligned block in camera space, meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneBlock {
    pub center: Vec3,
    pub half_extents: Vec3,
}

/// What the synthetic sensors look at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticScene {
    /// Wall distance along the optical axis, meters.
    pub wall_distance: f32,
    /// Change in wall depth per meter of height.
    pub wall_tilt: f32,
    pub block: Option<SceneBlock>,
    /// Every n-th pixel reads no depth, like stereo dropouts.
    pub hole_stride: Option<u32>,
    /// Farthest depth the sensor reports.
    pub max_range: f32,
}

impl Default for SyntheticScene {
    fn default() -> Self {
        Self {
            wall_distance: 2.5,
            wall_tilt: 0.0,
            block: Some(SceneBlock {
                center: Vec3::new(0.0, 0.1, 1.8),
                half_extents: Vec3::new(0.25, 0.5, 0.1),
            }),
            hole_stride: None,
            max_range: 10.0,
        }
    }
}

impl SyntheticScene {
    /// A flat wall straight ahead and nothing else.
    pub fn wall(distance: f32) -> Self {
        Self {
            wall_distance: distance,
            block: None,
            ..Self::default()
        }
    }

    pub fn with_block(mut self, block: Option<SceneBlock>) -> Self {
        self.block = block;
        self
    }

    pub fn with_tilt(mut self, tilt: f32) -> Self {
        self.wall_tilt = tilt;
        self
    }

    pub fn with_holes(mut self, stride: Option<u32>) -> Self {
        self.hole_stride = stride.filter(|&s| s > 0);
        self
    }

    /// Distance along z to the nearest surface seen through `pixel`.
    pub fn depth_at(&self, intrinsics: &CameraIntrinsics, pixel: Vec2) -> Option<f32> {
        let ray = intrinsics.deproject(pixel, 1.0);

        let denom = 1.0 - self.wall_tilt * ray.y;
        let mut nearest = (denom > 0.0).then(|| self.wall_distance / denom);

        if let Some(block) = self.block {
            let front = block.center.z - block.half_extents.z;
            let hit = ray * front;
            let inside = (hit.x - block.center.x).abs() <= block.half_extents.x
                && (hit.y - block.center.y).abs() <= block.half_extents.y;
            if front > 0.0 && inside && nearest.is_none_or(|z| front < z) {
                nearest = Some(front);
            }
        }

        nearest.filter(|&z| z > 0.0 && z <= self.max_range)
    }

    /// Render a Z16 depth image.
    pub fn render_depth(&self, intrinsics: &CameraIntrinsics, depth_units: f32) -> Vec<u16> {
        let width = intrinsics.width;
        let mut depth = Vec::with_capacity(intrinsics.pixel_count());
        for y in 0..intrinsics.height {
            for x in 0..width {
                let index = y * width + x;
                if self.hole_stride.is_some_and(|s| index % s == 0) {
                    depth.push(0);
                    continue;
                }
                let raw = self
                    .depth_at(intrinsics, Vec2::new(x as f32, y as f32))
                    .map_or(0, |z| (z / depth_units).round().clamp(0.0, u16::MAX as f32) as u16);
                depth.push(raw);
            }
        }
        depth
    }

    /// Render the color view with brightness scaled by `exposure` in `[0, 1]`.
    pub fn render_color(&self, intrinsics: &CameraIntrinsics, exposure: f32) -> RgbImage {
        let exposure = exposure.clamp(0.0, 1.0);
        let (w, h) = (intrinsics.width.max(1), intrinsics.height.max(1));
        RgbImage::from_fn(intrinsics.width, intrinsics.height, |x, y| {
            let near = self
                .depth_at(intrinsics, Vec2::new(x as f32, y as f32))
                .is_some_and(|z| z < self.wall_distance);
            let base = if near {
                [200.0, 90.0, 60.0]
            } else {
                [80.0 + 120.0 * x as f32 / w as f32, 80.0 + 120.0 * y as f32 / h as f32, 160.0]
            };
            Rgb(base.map(|c| (c * exposure) as u8))
        })
    }
}

/// Sleep until frame `n` is due on a clock started at `start`.
fn pace(start: Instant, n: u64, interval: Duration, timeout: Duration) -> Result<(), CaptureError> {
    let due = start + interval.mul_f64(n as f64);
    let now = Instant::now();
    if due > now {
        let wait = due - now;
        if wait > timeout {
            std::thread::sleep(timeout);
            return Err(CaptureError::Timeout(timeout));
        }
        std::thread::sleep(wait);
    }
    Ok(())
}

/// Shared frame clock for the rig and the depth stream it turns into.
#[derive(Debug, Clone)]
struct FrameClock {
    start: Option<Instant>,
    next: u64,
    delivered: u64,
    realtime: bool,
    drop_every: Option<u64>,
    stall_after: Option<u64>,
}

impl FrameClock {
    /// Advance to the next frame number, honoring drops, stalls and pacing.
    fn tick(&mut self, interval: Duration, timeout: Duration) -> Result<u64, CaptureError> {
        if self.stall_after.is_some_and(|n| self.delivered >= n) {
            if self.realtime {
                std::thread::sleep(timeout);
            }
            return Err(CaptureError::Timeout(timeout));
        }

        if self.drop_every.is_some_and(|n| n > 1 && self.next % n == n - 1) {
            debug!(frame = self.next, "Dropping synthetic frame");
            self.next += 1;
        }

        let n = self.next;
        if self.realtime {
            let start = *self.start.get_or_insert_with(Instant::now);
            pace(start, n, interval, timeout)?;
        }
        self.next += 1;
        self.delivered += 1;
        Ok(n)
    }
}

/// A depth+color rig rendering [`SyntheticScene`].
#[derive(Debug)]
pub struct SyntheticRig {
    profile: RigProfile,
    scene: SyntheticScene,
    depth: Arc<[u16]>,
    exposure_ramp: u32,
    clock: FrameClock,
    started: bool,
}

impl SyntheticRig {
    pub fn new(profile: RigProfile, scene: SyntheticScene) -> Self {
        let depth = scene
            .render_depth(&profile.depth_intrinsics, profile.depth_units)
            .into();
        Self {
            profile,
            scene,
            depth,
            exposure_ramp: 15,
            clock: FrameClock {
                start: None,
                next: 0,
                delivered: 0,
                realtime: false,
                drop_every: None,
                stall_after: None,
            },
            started: false,
        }
    }

    /// Frames until auto-exposure reaches full brightness.
    pub fn with_exposure_ramp(mut self, frames: u32) -> Self {
        self.exposure_ramp = frames;
        self
    }

    /// Deliver frames on the wall clock at the profile's frame rate.
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.clock.realtime = realtime;
        self
    }

    /// Skip one frame number out of every `n`.
    pub fn with_drop_every(mut self, n: Option<u64>) -> Self {
        self.clock.drop_every = n;
        self
    }

    /// Stop delivering after `n` frames, as if the cable were pulled.
    pub fn with_stall_after(mut self, n: Option<u64>) -> Self {
        self.clock.stall_after = n;
        self
    }

    pub fn profile(&self) -> &RigProfile {
        &self.profile
    }

    pub fn scene(&self) -> &SyntheticScene {
        &self.scene
    }

    fn exposure(&self, frame: u64) -> f32 {
        if self.exposure_ramp == 0 {
            return 1.0;
        }
        ((frame + 1) as f32 / self.exposure_ramp as f32).min(1.0)
    }
}

impl SensorRig for SyntheticRig {
    type Depth = SyntheticDepthStream;

    fn start(&mut self) -> Result<(), StreamError> {
        let d = &self.profile.depth_intrinsics;
        let c = &self.profile.color_intrinsics;
        info!(
            "Synthetic rig started: depth {}x{}, color {}x{} @ {} fps",
            d.width, d.height, c.width, c.height, self.profile.fps
        );
        self.started = true;
        Ok(())
    }

    fn wait_for_frameset(&mut self, timeout: Duration) -> Result<CapturedFrameset, StreamError> {
        if !self.started {
            return Err(CaptureError::NotStarted.into());
        }
        let n = self.clock.tick(self.profile.frame_interval(), timeout)?;
        let timestamp = self.profile.timestamp_ms(n);
        let p = &self.profile;

        let depth = DepthFrame {
            width: p.depth_intrinsics.width,
            height: p.depth_intrinsics.height,
            data: Arc::clone(&self.depth),
            timestamp,
            frame_number: n,
        };
        let color = ColorFrame::new(
            self.scene.render_color(&p.color_intrinsics, self.exposure(n)),
            timestamp,
            n,
        );

        Ok(CapturedFrameset {
            depth,
            color,
            depth_intrinsics: p.depth_intrinsics,
            color_intrinsics: p.color_intrinsics,
            depth_to_color: p.depth_to_color,
            depth_units: p.depth_units,
        })
    }

    fn stop(&mut self) {
        self.started = false;
    }

    fn into_depth_stream(self) -> Result<SyntheticDepthStream, StreamError> {
        if !self.started {
            return Err(CaptureError::NotStarted.into());
        }
        debug!("Reopening synthetic rig with depth only");
        Ok(SyntheticDepthStream {
            profile: self.profile,
            depth: self.depth,
            clock: self.clock,
            active: true,
        })
    }
}

/// The depth-only stream left after the color sensor is released.
#[derive(Debug)]
pub struct SyntheticDepthStream {
    profile: RigProfile,
    depth: Arc<[u16]>,
    clock: FrameClock,
    active: bool,
}

impl DepthStream for SyntheticDepthStream {
    fn wait_for_depth(&mut self, timeout: Duration) -> Result<DepthFrame, StreamError> {
        if !self.active {
            return Err(CaptureError::StreamEnded.into());
        }
        let n = self.clock.tick(self.profile.frame_interval(), timeout)?;
        Ok(DepthFrame {
            width: self.profile.depth_intrinsics.width,
            height: self.profile.depth_intrinsics.height,
            data: Arc::clone(&self.depth),
            timestamp: self.profile.timestamp_ms(n),
            frame_number: n,
        })
    }

    fn intrinsics(&self) -> CameraIntrinsics {
        self.profile.depth_intrinsics
    }

    fn frame_rate(&self) -> Option<f32> {
        Some(self.profile.fps as f32)
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn stop(&mut self) {
        if self.active {
            self.active = false;
            info!("Synthetic depth stream stopped after {} frames", self.clock.delivered);
        }
    }
}
