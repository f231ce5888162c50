//! Per-tick frame reconstruction
//!
//! After a short calibration pass with both sensors open, the color sensor is
//! released and only depth keeps streaming. Every tick the frozen color image and
//! the live depth frame are pushed through a [`VirtualDevice`] as a matched pair,
//! aligned to the color grid and turned into a [`VertexMap`].

use crate::ingest::{
    CalibrationContext, DepthFrame, DepthStream, SensorRig, StreamError, StreamRole,
};
use crate::reconstruction::align::DepthAligner;
use crate::reconstruction::errors::ReconstructionError;
use crate::reconstruction::matcher::InjectedFrame;
use crate::reconstruction::vertex_map::VertexMap;
use crate::reconstruction::virtual_device::{FrameInjector, VirtualDevice};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Frame rate assumed when a stream cannot report its own.
pub const DEFAULT_FRAME_RATE: f32 = 30.0;

/// Reconstruction tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Framesets discarded at startup while auto-exposure settles.
    pub settle_frames: u32,
    /// How many frame intervals to wait for depth before declaring the device gone.
    pub frame_timeout_multiple: u32,
    /// Wait for the virtual device to release a matched pair.
    pub sync_timeout: Duration,
    /// Consecutive ticks without a matched pair before giving up.
    pub max_sync_misses: u32,
    /// Wait for each frameset during calibration.
    pub calibration_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settle_frames: 30,
            frame_timeout_multiple: 30,
            sync_timeout: Duration::from_millis(100),
            max_sync_misses: 150,
            calibration_timeout: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    pub fn with_settle_frames(mut self, frames: u32) -> Self {
        self.settle_frames = frames;
        self
    }

    pub fn with_frame_timeout_multiple(mut self, multiple: u32) -> Self {
        self.frame_timeout_multiple = multiple.max(1);
        self
    }

    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    pub fn with_max_sync_misses(mut self, misses: u32) -> Self {
        self.max_sync_misses = misses;
        self
    }

    pub fn with_calibration_timeout(mut self, timeout: Duration) -> Self {
        self.calibration_timeout = timeout;
        self
    }

    /// Expected time between frames at `fps`.
    pub fn frame_interval(fps: f32) -> Duration {
        let fps = if fps.is_finite() && fps > 0.0 {
            fps
        } else {
            DEFAULT_FRAME_RATE
        };
        Duration::from_secs_f32(1.0 / fps)
    }

    /// Longest wait for a live depth frame before the device counts as stalled.
    pub fn depth_timeout(&self, fps: f32) -> Duration {
        Self::frame_interval(fps) * self.frame_timeout_multiple
    }
}

/// Run the startup pass and capture everything later ticks depend on.
///
/// Both streams are opened, `settle_frames` framesets are thrown away, and the
/// next one provides the calibration and the baseline color image.
#[tracing::instrument(skip_all, fields(settle = config.settle_frames))]
pub fn calibrate<R: SensorRig>(
    rig: &mut R,
    config: &EngineConfig,
) -> Result<CalibrationContext, ReconstructionError> {
    rig.start()?;

    for _ in 0..config.settle_frames {
        rig.wait_for_frameset(config.calibration_timeout)?;
    }
    debug!("Discarded {} settling framesets", config.settle_frames);

    let frameset = rig.wait_for_frameset(config.calibration_timeout)?;

    let color_in = frameset.color_intrinsics;
    if frameset.color.dimensions() != (color_in.width, color_in.height) {
        let (w, h) = frameset.color.dimensions();
        return Err(ReconstructionError::CalibrationFailed(format!(
            "color frame is {}x{} but intrinsics describe {}x{}",
            w, h, color_in.width, color_in.height
        )));
    }
    let depth_in = frameset.depth_intrinsics;
    if (frameset.depth.width, frameset.depth.height) != (depth_in.width, depth_in.height) {
        return Err(ReconstructionError::CalibrationFailed(format!(
            "depth frame is {}x{} but intrinsics describe {}x{}",
            frameset.depth.width, frameset.depth.height, depth_in.width, depth_in.height
        )));
    }
    if !(frameset.depth_units.is_finite() && frameset.depth_units > 0.0) {
        return Err(ReconstructionError::CalibrationFailed(format!(
            "invalid depth units {}",
            frameset.depth_units
        )));
    }

    info!(
        "Baseline color frame captured ({}x{}, frame {})",
        color_in.width, color_in.height, frameset.color.frame_number
    );

    Ok(CalibrationContext {
        depth_intrinsics: depth_in,
        color_intrinsics: color_in,
        depth_to_color: frameset.depth_to_color,
        depth_units: frameset.depth_units,
        baseline: Arc::new(frameset.color),
    })
}

/// Whether a tick produced a new vertex map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A matched pair arrived and the vertex map was rebuilt.
    Fresh,
    /// No pair arrived in time; the previous vertex map still stands.
    Stale,
}

/// Owns the live depth stream and produces one vertex map per tick.
pub struct ReconstructionEngine<S: DepthStream> {
    config: EngineConfig,
    calibration: Arc<CalibrationContext>,
    stream: S,
    device: VirtualDevice,
    aligner: DepthAligner,
    /// Baseline color pixels, shared by every injected color frame.
    baseline: Arc<[u8]>,
    baseline_stride: usize,
    fps: f32,
    sequence: u64,
    sync_misses: u32,
    latest: VertexMap,
}

impl<S: DepthStream> ReconstructionEngine<S> {
    /// Build an engine around an already calibrated depth stream.
    pub fn new(
        calibration: CalibrationContext,
        stream: S,
        config: EngineConfig,
    ) -> Result<Self, ReconstructionError> {
        let live = stream.intrinsics();
        let expected = calibration.depth_intrinsics;
        if (live.width, live.height) != (expected.width, expected.height) {
            return Err(ReconstructionError::CalibrationFailed(format!(
                "depth stream is {}x{} but was calibrated at {}x{}",
                live.width, live.height, expected.width, expected.height
            )));
        }

        let fps = stream.frame_rate().unwrap_or(DEFAULT_FRAME_RATE);
        let device = VirtualDevice::new(&calibration, fps.round().max(1.0) as u32);
        let aligner = DepthAligner::new(&calibration);
        let baseline: Arc<[u8]> = Arc::from(calibration.baseline.as_bytes());
        let baseline_stride = calibration.baseline.stride_in_bytes();
        let (width, height) = calibration.color_resolution();

        Ok(Self {
            config,
            calibration: Arc::new(calibration),
            stream,
            device,
            aligner,
            baseline,
            baseline_stride,
            fps,
            sequence: 0,
            sync_misses: 0,
            latest: VertexMap::empty(width, height),
        })
    }

    /// Calibrate with both sensors, release color, and start on depth alone.
    pub fn from_rig<R>(mut rig: R, config: EngineConfig) -> Result<Self, ReconstructionError>
    where
        R: SensorRig<Depth = S>,
    {
        let calibration = match calibrate(&mut rig, &config) {
            Ok(calibration) => calibration,
            Err(e) => {
                rig.stop();
                return Err(e);
            }
        };
        let stream = rig.into_depth_stream()?;
        info!("Color sensor released, streaming depth only");
        Self::new(calibration, stream, config)
    }

    /// Advance one tick: read depth, pair it with the baseline, rebuild the map.
    ///
    /// A missed pair leaves the previous map in place and returns
    /// [`TickOutcome::Stale`]. Losing the depth stream, or missing pairs for
    /// longer than `max_sync_misses` ticks in a row, is an error.
    pub fn tick(&mut self) -> Result<TickOutcome, ReconstructionError> {
        self.tick_with(|injector, frame| injector.inject(frame))
    }

    /// [`tick`](Self::tick) with the hand-off to the virtual device made explicit.
    /// `deliver` receives the baseline color frame, then the depth frame.
    pub(crate) fn tick_with<F>(&mut self, deliver: F) -> Result<TickOutcome, ReconstructionError>
    where
        F: FnMut(&FrameInjector, InjectedFrame) -> Result<(), ReconstructionError>,
    {
        let timeout = self.config.depth_timeout(self.fps);
        let depth = match self.stream.wait_for_depth(timeout) {
            Ok(frame) => frame,
            Err(StreamError::Timeout(_)) => {
                return Err(ReconstructionError::DeviceStalled { waited: timeout });
            }
            Err(e) => return Err(e.into()),
        };

        let sequence = self.sequence;
        self.sequence += 1;
        self.inject_pair(&depth, sequence, deliver)?;

        match self.device.wait_for_frameset(self.config.sync_timeout) {
            Some(frameset) => {
                self.sync_misses = 0;
                let aligned = self.aligner.process(frameset)?;
                self.latest = VertexMap::from_aligned(
                    &aligned,
                    &self.calibration.color_intrinsics,
                    self.calibration.depth_units,
                )?;
                debug!(
                    sequence,
                    valid = self.latest.valid_count(),
                    "Vertex map rebuilt"
                );
                Ok(TickOutcome::Fresh)
            }
            None => {
                self.sync_misses += 1;
                warn!(
                    sequence,
                    misses = self.sync_misses,
                    "No synchronized frameset, reusing previous vertex map"
                );
                if self.sync_misses > self.config.max_sync_misses {
                    return Err(ReconstructionError::SyncStalled {
                        misses: self.sync_misses,
                    });
                }
                Ok(TickOutcome::Stale)
            }
        }
    }

    fn inject_pair<F>(
        &self,
        depth: &DepthFrame,
        sequence: u64,
        mut deliver: F,
    ) -> Result<(), ReconstructionError>
    where
        F: FnMut(&FrameInjector, InjectedFrame) -> Result<(), ReconstructionError>,
    {
        let expected = self.calibration.depth_intrinsics;
        if (depth.width, depth.height) != (expected.width, expected.height) {
            return Err(ReconstructionError::InvalidFrame {
                role: StreamRole::Depth,
                reason: format!(
                    "{}x{} frame from a {}x{} stream",
                    depth.width, depth.height, expected.width, expected.height
                ),
            });
        }

        let injector = self.device.injector();
        deliver(
            &injector,
            InjectedFrame {
                role: StreamRole::Color,
                pixels: Arc::clone(&self.baseline),
                stride: self.baseline_stride,
                bytes_per_pixel: self.calibration.baseline.bytes_per_pixel(),
                timestamp: depth.timestamp,
                sequence,
            },
        )?;
        deliver(
            &injector,
            InjectedFrame {
                role: StreamRole::Depth,
                pixels: Arc::from(depth.as_bytes()),
                stride: depth.stride_in_bytes(),
                bytes_per_pixel: depth.bytes_per_pixel(),
                timestamp: depth.timestamp,
                sequence,
            },
        )
    }

    /// The most recent vertex map. All zeros until the first fresh tick.
    pub fn vertex_map(&self) -> &VertexMap {
        &self.latest
    }

    pub fn calibration(&self) -> &Arc<CalibrationContext> {
        &self.calibration
    }

    /// Ticks attempted so far.
    pub fn ticks(&self) -> u64 {
        self.sequence
    }

    /// Frames the virtual device's syncer has discarded.
    pub fn dropped_frames(&self) -> u64 {
        self.device.dropped_frames()
    }

    /// Stop the depth stream.
    pub fn stop(&mut self) {
        self.stream.stop();
        info!("Depth stream stopped after {} ticks", self.sequence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{CameraExtrinsics, CameraIntrinsics, CapturedFrameset, ColorFrame};
    use image::RgbImage;

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics::pinhole(8, 6, 16.0, 16.0, 4.0, 3.0)
    }

    /// Flat wall one meter away; optionally stops delivering after a few frames.
    struct WallStream {
        delivered: u64,
        stall_after: Option<u64>,
        stopped: bool,
    }

    impl DepthStream for WallStream {
        fn wait_for_depth(&mut self, timeout: Duration) -> Result<DepthFrame, StreamError> {
            if self.stall_after.is_some_and(|n| self.delivered >= n) {
                return Err(StreamError::Timeout(timeout));
            }
            let n = self.delivered;
            self.delivered += 1;
            Ok(DepthFrame::new(8, 6, vec![1000; 48], n as f64 * 33.3, n))
        }

        fn intrinsics(&self) -> CameraIntrinsics {
            intrinsics()
        }

        fn frame_rate(&self) -> Option<f32> {
            Some(30.0)
        }

        fn is_active(&self) -> bool {
            !self.stopped
        }

        fn stop(&mut self) {
            self.stopped = true;
        }
    }

    struct WallRig {
        framesets: u64,
        started: bool,
    }

    impl SensorRig for WallRig {
        type Depth = WallStream;

        fn start(&mut self) -> Result<(), StreamError> {
            self.started = true;
            Ok(())
        }

        fn wait_for_frameset(
            &mut self,
            _timeout: Duration,
        ) -> Result<CapturedFrameset, StreamError> {
            if !self.started {
                return Err(StreamError::StreamEnded);
            }
            let n = self.framesets;
            self.framesets += 1;
            Ok(CapturedFrameset {
                depth: DepthFrame::new(8, 6, vec![1000; 48], n as f64, n),
                color: ColorFrame::new(
                    RgbImage::from_pixel(8, 6, image::Rgb([n as u8, 0, 0])),
                    n as f64,
                    n,
                ),
                depth_intrinsics: intrinsics(),
                color_intrinsics: intrinsics(),
                depth_to_color: CameraExtrinsics::identity(),
                depth_units: 0.001,
            })
        }

        fn stop(&mut self) {
            self.started = false;
        }

        fn into_depth_stream(self) -> Result<WallStream, StreamError> {
            Ok(WallStream {
                delivered: 0,
                stall_after: None,
                stopped: false,
            })
        }
    }

    fn rig() -> WallRig {
        WallRig {
            framesets: 0,
            started: false,
        }
    }

    #[test]
    fn test_calibrate_discards_settling_frames() {
        let mut rig = rig();
        let config = EngineConfig::default().with_settle_frames(5);
        let calibration = calibrate(&mut rig, &config).unwrap();

        assert_eq!(rig.framesets, 6);
        assert_eq!(calibration.baseline.frame_number, 5);
        assert_eq!(calibration.baseline.image.get_pixel(0, 0)[0], 5);
        assert_eq!(calibration.color_resolution(), (8, 6));
    }

    #[test]
    fn test_tick_builds_vertex_map() {
        let config = EngineConfig::default().with_settle_frames(2);
        let mut engine = ReconstructionEngine::from_rig(rig(), config).unwrap();
        assert_eq!(engine.vertex_map().valid_count(), 0);

        assert_eq!(engine.tick().unwrap(), TickOutcome::Fresh);
        let map = engine.vertex_map();
        assert_eq!(map.version(), 0);

        let center = map.get(4, 3).unwrap();
        assert!((center - glam::Vec3::new(0.0, 0.0, 1.0)).length() < 1e-6);
        let corner = map.get(0, 0).unwrap();
        assert!((corner - glam::Vec3::new(-0.25, -0.1875, 1.0)).length() < 1e-6);
    }

    #[test]
    fn test_sequence_advances_each_tick() {
        let config = EngineConfig::default().with_settle_frames(0);
        let mut engine = ReconstructionEngine::from_rig(rig(), config).unwrap();
        for _ in 0..3 {
            engine.tick().unwrap();
        }
        assert_eq!(engine.ticks(), 3);
        assert_eq!(engine.vertex_map().version(), 2);
        assert_eq!(engine.dropped_frames(), 0);
    }

    #[test]
    fn test_depth_timeout_means_device_stalled() {
        let mut rig = rig();
        let calibration =
            calibrate(&mut rig, &EngineConfig::default().with_settle_frames(0)).unwrap();
        let stream = WallStream {
            delivered: 0,
            stall_after: Some(1),
            stopped: false,
        };
        let mut engine =
            ReconstructionEngine::new(calibration, stream, EngineConfig::default()).unwrap();

        assert!(engine.tick().is_ok());
        let held = engine.vertex_map().clone();
        assert!(matches!(
            engine.tick(),
            Err(ReconstructionError::DeviceStalled { .. })
        ));
        assert_eq!(engine.vertex_map().version(), held.version());
    }

    #[test]
    fn test_depth_timeout_scales_with_frame_rate() {
        let config = EngineConfig::default();
        let timeout = config.depth_timeout(30.0);
        assert!((timeout.as_secs_f32() - 1.0).abs() < 1e-3);
        assert_eq!(
            EngineConfig::frame_interval(0.0),
            EngineConfig::frame_interval(DEFAULT_FRAME_RATE)
        );
    }

    #[test]
    fn test_stream_resolution_must_match_calibration() {
        let mut rig = rig();
        let mut calibration =
            calibrate(&mut rig, &EngineConfig::default().with_settle_frames(0)).unwrap();
        calibration.depth_intrinsics = CameraIntrinsics::pinhole(16, 12, 16.0, 16.0, 8.0, 6.0);
        let stream = WallStream {
            delivered: 0,
            stall_after: None,
            stopped: false,
        };
        assert!(matches!(
            ReconstructionEngine::new(calibration, stream, EngineConfig::default()),
            Err(ReconstructionError::CalibrationFailed(_))
        ));
    }

    fn drop_color(
        injector: &FrameInjector,
        frame: InjectedFrame,
    ) -> Result<(), ReconstructionError> {
        match frame.role {
            StreamRole::Color => Ok(()),
            StreamRole::Depth => injector.inject(frame),
        }
    }

    #[test]
    fn test_missed_pair_keeps_previous_map() {
        let config = EngineConfig::default()
            .with_settle_frames(0)
            .with_sync_timeout(Duration::from_millis(5));
        let mut engine = ReconstructionEngine::from_rig(rig(), config).unwrap();

        assert_eq!(engine.tick().unwrap(), TickOutcome::Fresh);
        let held = engine.vertex_map().clone();

        assert_eq!(engine.tick_with(drop_color).unwrap(), TickOutcome::Stale);
        assert_eq!(engine.vertex_map().version(), held.version());
        assert_eq!(engine.vertex_map().valid_count(), held.valid_count());

        assert_eq!(engine.tick().unwrap(), TickOutcome::Fresh);
        assert_eq!(engine.vertex_map().version(), 2);
        assert_eq!(engine.dropped_frames(), 1);
    }

    #[test]
    fn test_late_color_frame_misses_its_tick() {
        let config = EngineConfig::default()
            .with_settle_frames(0)
            .with_sync_timeout(Duration::from_millis(5));
        let mut engine = ReconstructionEngine::from_rig(rig(), config).unwrap();
        engine.tick().unwrap();

        let mut late = Vec::new();
        let outcome = engine
            .tick_with(|injector, frame| match frame.role {
                StreamRole::Color => {
                    let injector = injector.clone();
                    late.push(std::thread::spawn(move || {
                        std::thread::sleep(Duration::from_millis(50));
                        injector.inject(frame)
                    }));
                    Ok(())
                }
                StreamRole::Depth => injector.inject(frame),
            })
            .unwrap();
        assert_eq!(outcome, TickOutcome::Stale);
        assert_eq!(engine.vertex_map().version(), 0);

        for handle in late {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(engine.tick().unwrap(), TickOutcome::Fresh);
        assert_eq!(engine.vertex_map().version(), 2);
    }

    #[test]
    fn test_consecutive_misses_stall_sync() {
        let config = EngineConfig::default()
            .with_settle_frames(0)
            .with_sync_timeout(Duration::ZERO)
            .with_max_sync_misses(2);
        let mut engine = ReconstructionEngine::from_rig(rig(), config).unwrap();

        assert_eq!(engine.tick_with(drop_color).unwrap(), TickOutcome::Stale);
        assert_eq!(engine.tick_with(drop_color).unwrap(), TickOutcome::Stale);
        assert!(matches!(
            engine.tick_with(drop_color),
            Err(ReconstructionError::SyncStalled { misses: 3 })
        ));
        assert_eq!(engine.vertex_map().valid_count(), 0);
    }

    #[test]
    fn test_fresh_pair_resets_miss_count() {
        let config = EngineConfig::default()
            .with_settle_frames(0)
            .with_sync_timeout(Duration::ZERO)
            .with_max_sync_misses(1);
        let mut engine = ReconstructionEngine::from_rig(rig(), config).unwrap();

        for _ in 0..3 {
            assert_eq!(engine.tick_with(drop_color).unwrap(), TickOutcome::Stale);
            assert_eq!(engine.tick().unwrap(), TickOutcome::Fresh);
        }
    }

    #[test]
    fn test_stop_stops_stream() {
        let config = EngineConfig::default().with_settle_frames(0);
        let mut engine = ReconstructionEngine::from_rig(rig(), config).unwrap();
        engine.stop();
        assert!(!engine.stream.is_active());
    }
}
