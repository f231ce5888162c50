//! Frame reconstruction
//!
//! Turns the live depth stream plus the frozen baseline color image into a
//! per-pixel vertex map in the color camera's frame.

pub mod align;
pub mod engine;
pub mod errors;
pub mod matcher;
pub mod vertex_map;
pub mod virtual_device;

pub use align::{AlignedFrameset, DepthAligner};
pub use engine::{EngineConfig, ReconstructionEngine, TickOutcome, calibrate};
pub use errors::ReconstructionError;
pub use matcher::{FrameMatcher, InjectedFrame, MatchedPair};
pub use vertex_map::VertexMap;
pub use virtual_device::{FrameInjector, SoftwareFrameset, StreamProfile, VirtualDevice};
