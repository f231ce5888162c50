//! Readiness handshake with the pose estimator
//!
//! A one-word text file in the output directory: `false` while the color sensor is
//! still held by us, `true` once it has been released and may be claimed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Name of the readiness file inside the output directory.
pub const READY_FILE_NAME: &str = "ready.txt";

/// Errors raised by the readiness file.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error(
        "The directory \"{}\" could not be written to. Check permissions and that the path is correct: {source}",
        .dir.display()
    )]
    NotWritable { dir: PathBuf, source: io::Error },

    #[error("Could not read readiness file: {0}")]
    Read(#[from] io::Error),

    #[error("Unexpected readiness value: {0:?}")]
    InvalidValue(String),
}

/// The readiness flag persisted in the output directory.
#[derive(Debug)]
pub struct ReadinessFlag {
    path: PathBuf,
    ready: bool,
}

impl ReadinessFlag {
    /// Write `false` into the readiness file, creating or truncating it.
    ///
    /// This doubles as the startup writability check for the output directory.
    pub fn reset(dir: &Path) -> Result<Self, HandshakeError> {
        let path = dir.join(READY_FILE_NAME);
        fs::write(&path, "false").map_err(|source| HandshakeError::NotWritable {
            dir: dir.to_path_buf(),
            source,
        })?;
        Ok(Self { path, ready: false })
    }

    /// Flip the flag to `true`. Only the first call writes.
    pub fn mark_ready(&mut self) -> Result<(), HandshakeError> {
        if self.ready {
            return Ok(());
        }
        fs::write(&self.path, "true").map_err(|source| HandshakeError::NotWritable {
            dir: self
                .path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
            source,
        })?;
        self.ready = true;
        info!("Signalled ready: color sensor may now be claimed");
        Ok(())
    }

    /// Whether this process has signalled ready.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Location of the readiness file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the flag as another process would see it.
    pub fn read(dir: &Path) -> Result<bool, HandshakeError> {
        let contents = fs::read_to_string(dir.join(READY_FILE_NAME))?;
        match contents.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(HandshakeError::InvalidValue(other.to_string())),
        }
    }
}
