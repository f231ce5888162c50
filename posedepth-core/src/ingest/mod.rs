//! Sensor ingest
//!
//! Calibration values, frame types and the capability traits a sensor backend
//! implements:
//! - Intrinsics, extrinsics and the immutable calibration context
//! - Depth and color frames
//! - `SensorRig` for the startup pass, `DepthStream` for the live loop

pub mod calibration;
pub mod frames;
pub mod sensor;

pub use calibration::{CalibrationContext, CameraExtrinsics, CameraIntrinsics, DistortionModel};
pub use frames::{BaselineColorFrame, ColorFrame, DepthFrame, StreamRole};
pub use sensor::{CapturedFrameset, DepthStream, SensorRig, StreamError};
