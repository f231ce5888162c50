//! Posedepth Capture - depth+color sensor backends
//!
//! This crate provides implementations of the `SensorRig` and `DepthStream`
//! traits from posedepth-core:
//!
//! - A synthetic rig that renders a simple scene through calibrated optics
//! - Rig profiles describing resolution, frame rate and factory calibration
//!
//! ## Example
//!
//! ```ignore
//! use posedepth_capture::{RigProfile, SyntheticRig, SyntheticScene};
//! use posedepth_core::{EngineConfig, ReconstructionEngine};
//!
//! let rig = SyntheticRig::new(RigProfile::default(), SyntheticScene::default());
//! let mut engine = ReconstructionEngine::from_rig(rig, EngineConfig::default())?;
//! engine.tick()?;
//! ```

mod source;
mod synthetic;

pub use source::{
    CaptureError, DEFAULT_DEPTH_UNITS, DEFAULT_FPS, DEFAULT_HEIGHT, DEFAULT_WIDTH, RigProfile,
};
pub use synthetic::{SceneBlock, SyntheticDepthStream, SyntheticRig, SyntheticScene};

// Re-export the sensor traits for convenience
pub use posedepth_core::ingest::{DepthStream, SensorRig, StreamError};
