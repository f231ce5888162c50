//! Posedepth
//!
//! Lifts a 2D pose estimator's keypoints into 3D using a depth camera whose color
//! sensor has been handed to the estimator. Re-exports the workspace crates:
//!
//! - [`data`]: keypoint files, naming protocol, directory store, readiness flag
//! - [`ingest`], [`reconstruction`], [`fusion`]: calibration, the per-tick
//!   reconstruction engine and keypoint fusion
//! - [`capture`]: sensor backends

pub use posedepth_capture as capture;
pub use posedepth_core::{fusion, geometry, ingest, reconstruction};
pub use posedepth_data as data;
