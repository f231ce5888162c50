//! Error types for the application.

use posedepth_core::{FusionError, ReconstructionError};
use posedepth_data::HandshakeError;
use thiserror::Error;

/// Errors that end the run.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Readiness handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Reconstruction failed: {0}")]
    Reconstruction(#[from] ReconstructionError),

    #[error("Fusion failed: {0}")]
    Fusion(#[from] FusionError),

    #[error("Could not install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),
}
