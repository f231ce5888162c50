//! Keypoint file watcher
//!
//! Walks the pose estimator's output one frame index at a time. Each call checks
//! for exactly one file name, fuses it if it parses, and only then moves on.

use crate::fusion::lift::{FusionSummary, fuse_document};
use crate::reconstruction::VertexMap;
use posedepth_data::{FileState, KeypointDocument, KeypointStore};
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// What to do once an index has failed to parse too many times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryExhausted {
    /// Log and move on to the next index.
    #[default]
    Skip,
    /// Stop with [`FusionError::RetriesExhausted`].
    Abort,
}

/// Bound on how long one unreadable file can hold up the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseRetryPolicy {
    /// Attempts per index; zero retries forever.
    pub max_attempts: u32,
    pub on_exhausted: RetryExhausted,
}

impl Default for ParseRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 90,
            on_exhausted: RetryExhausted::Skip,
        }
    }
}

impl ParseRetryPolicy {
    /// Retry forever.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: 0,
            on_exhausted: RetryExhausted::Skip,
        }
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts > 0 && attempts >= self.max_attempts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatcherConfig {
    pub retry: ParseRetryPolicy,
    /// Keep only the last N fused frames on disk; `None` keeps everything.
    /// `Some(0)` behaves like `Some(1)`: the frame just committed always stays.
    pub keep_frames: Option<u64>,
    /// First index to look for.
    pub start_index: u64,
}

impl WatcherConfig {
    pub fn with_retry(mut self, retry: ParseRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_keep_frames(mut self, keep: Option<u64>) -> Self {
        self.keep_frames = keep;
        self
    }

    pub fn with_start_index(mut self, index: u64) -> Self {
        self.start_index = index;
        self
    }
}

/// Result of one watcher step.
#[derive(Debug, Clone, PartialEq)]
pub enum FuseOutcome {
    /// No file for the current index yet.
    NotYetProduced,
    /// The file exists but could not be read or parsed; retried next call.
    Deferred { attempts: u32 },
    /// The file was fused and committed.
    Fused {
        index: u64,
        path: PathBuf,
        summary: FusionSummary,
    },
    /// The file never parsed and the watcher gave up on it.
    Skipped { index: u64 },
}

/// Fatal watcher errors.
#[derive(Debug, Error)]
pub enum FusionError {
    #[error("Failed to write fused frame {index}: {source}")]
    Commit {
        index: u64,
        #[source]
        source: io::Error,
    },

    #[error("Frame {index} still unreadable after {attempts} attempts")]
    RetriesExhausted { index: u64, attempts: u32 },
}

/// Fuses keypoint files in index order against the latest vertex map.
#[derive(Debug)]
pub struct KeypointWatcher<S: KeypointStore> {
    store: S,
    config: WatcherConfig,
    next_index: u64,
    attempts: u32,
    fused: u64,
}

impl<S: KeypointStore> KeypointWatcher<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, WatcherConfig::default())
    }

    pub fn with_config(store: S, config: WatcherConfig) -> Self {
        Self {
            store,
            next_index: config.start_index,
            config,
            attempts: 0,
            fused: 0,
        }
    }

    /// The frame index this watcher is waiting for.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Frames fused so far.
    pub fn fused_count(&self) -> u64 {
        self.fused
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Check for the current index and fuse it if possible.
    ///
    /// Never blocks. A missing file is not an error; an unparsable one is retried
    /// on later calls until the retry policy runs out.
    pub fn poll_and_fuse(&mut self, map: &VertexMap) -> Result<FuseOutcome, FusionError> {
        let index = self.next_index;

        let text = match self.store.poll(index) {
            FileState::Missing => return Ok(FuseOutcome::NotYetProduced),
            FileState::Unreadable(reason) => {
                warn!(frame = index, "Keypoint file unreadable: {}", reason);
                return self.defer(index);
            }
            FileState::Present(text) => text,
        };

        let mut document = match KeypointDocument::parse(&text) {
            Ok(document) => document,
            Err(e) => {
                warn!(frame = index, "Keypoint file not parsable yet: {}", e);
                return self.defer(index);
            }
        };

        let fused = fuse_document(&mut document, map).and_then(|summary| {
            document.to_pretty_json().map(|json| (summary, json))
        });
        let (summary, json) = match fused {
            Ok(fused) => fused,
            Err(e) => {
                warn!(frame = index, "Could not fuse keypoint file: {}", e);
                return self.defer(index);
            }
        };

        let path = self
            .store
            .commit(index, &json)
            .map_err(|source| FusionError::Commit { index, source })?;

        info!(
            frame = index,
            people = summary.people,
            with_depth = summary.points_with_depth,
            "Fused keypoints"
        );
        self.fused += 1;
        self.advance();
        self.retire_behind(index);

        Ok(FuseOutcome::Fused {
            index,
            path,
            summary,
        })
    }

    fn defer(&mut self, index: u64) -> Result<FuseOutcome, FusionError> {
        self.attempts += 1;
        if !self.config.retry.exhausted(self.attempts) {
            return Ok(FuseOutcome::Deferred {
                attempts: self.attempts,
            });
        }

        let attempts = self.attempts;
        match self.config.retry.on_exhausted {
            RetryExhausted::Abort => Err(FusionError::RetriesExhausted { index, attempts }),
            RetryExhausted::Skip => {
                error!(frame = index, attempts, "Giving up on keypoint file");
                self.advance();
                Ok(FuseOutcome::Skipped { index })
            }
        }
    }

    fn advance(&mut self) {
        self.next_index += 1;
        self.attempts = 0;
    }

    fn retire_behind(&self, index: u64) {
        let Some(keep) = self.config.keep_frames else {
            return;
        };
        let Some(old) = index.checked_sub(keep.max(1)) else {
            return;
        };
        match self.store.retire(old) {
            Ok(()) => debug!(frame = old, "Retired old frame"),
            Err(e) => warn!(frame = old, "Failed to retire old frame: {}", e),
        }
    }
}
