//! Error types for frame reconstruction.

use crate::ingest::{StreamError, StreamRole};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while rebuilding framesets.
#[derive(Debug, Error)]
pub enum ReconstructionError {
    #[error("Sensor error: {0}")]
    Stream(#[from] StreamError),

    #[error("Calibration failed: {0}")]
    CalibrationFailed(String),

    #[error("No depth frame for {waited:?}, device assumed disconnected")]
    DeviceStalled { waited: Duration },

    #[error("No synchronized frameset for {misses} consecutive ticks")]
    SyncStalled { misses: u32 },

    #[error("Invalid {role} frame: {reason}")]
    InvalidFrame { role: StreamRole, reason: String },

    #[error("Dimension mismatch: expected {expected} values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}
