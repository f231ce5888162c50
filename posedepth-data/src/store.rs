//! Keypoint file discovery and commit
//!
//! The pose estimator and the fusion stage share nothing but a directory. This
//! module hides that behind [`KeypointStore`] so discovery could move to a real
//! notification mechanism without touching the fusion logic.

use crate::naming::{processed_file_name, raw_file_name};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// What the store found for a frame index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileState {
    /// Nothing has been produced for this index yet.
    Missing,
    /// The raw file exists; its full contents at the time of the poll.
    Present(String),
    /// The file exists but could not be read (locked, permission, bad UTF-8).
    Unreadable(String),
}

/// Storage for raw and processed keypoint files, addressed by frame index.
pub trait KeypointStore {
    /// Non-blocking check for the raw file at `index`.
    fn poll(&self, index: u64) -> FileState;

    /// Publish the processed file for `index`. Returns where it was written.
    fn commit(&self, index: u64, contents: &str) -> io::Result<PathBuf>;

    /// Drop raw and processed files for `index`. Missing files are not an error.
    fn retire(&self, index: u64) -> io::Result<()>;
}

/// A [`KeypointStore`] backed by a pose-estimator output directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
}

impl DirectoryStore {
    /// Create a store over `dir`. The directory is not touched until first use.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The watched directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the raw file for `index`.
    pub fn raw_path(&self, index: u64) -> PathBuf {
        self.dir.join(raw_file_name(index))
    }

    /// Path of the processed file for `index`.
    pub fn processed_path(&self, index: u64) -> PathBuf {
        self.dir.join(processed_file_name(index))
    }
}

impl KeypointStore for DirectoryStore {
    fn poll(&self, index: u64) -> FileState {
        let path = self.raw_path(index);
        match fs::read_to_string(&path) {
            Ok(contents) => FileState::Present(contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!(frame = index, "Keypoint file not produced yet");
                FileState::Missing
            }
            Err(e) => FileState::Unreadable(format!("{}: {}", path.display(), e)),
        }
    }

    #[tracing::instrument(skip_all, fields(frame = index))]
    fn commit(&self, index: u64, contents: &str) -> io::Result<PathBuf> {
        let target = self.processed_path(index);
        let mut staging = target.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        fs::write(&staging, contents)?;
        if let Err(e) = fs::rename(&staging, &target) {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }

        debug!("Committed {}", target.display());
        Ok(target)
    }

    fn retire(&self, index: u64) -> io::Result<()> {
        for path in [self.raw_path(index), self.processed_path(index)] {
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
