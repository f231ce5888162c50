//! Posedepth Core Crate
//!
//! Depth reconstruction and keypoint fusion. The color sensor is read once at
//! startup; afterwards every tick rebuilds a per-pixel vertex map from live
//! depth and the frozen color frame, and the fusion watcher lifts the pose
//! estimator's 2D keypoints onto it.
//!
//! ## Modules
//!
//! - [`ingest`]: Calibration, frame types and sensor traits
//! - [`reconstruction`]: Virtual device, alignment and vertex maps
//! - [`fusion`]: Keypoint lifting and the file watcher
//! - [`geometry`]: Pixel rounding and bounds helpers

pub mod fusion;
pub mod geometry;
pub mod ingest;
pub mod reconstruction;

pub use fusion::{FusionError, KeypointWatcher};
pub use reconstruction::{EngineConfig, ReconstructionEngine, ReconstructionError, VertexMap};
