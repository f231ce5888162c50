//! Keypoint fusion
//!
//! Attaches camera-space coordinates to the pose estimator's 2D keypoints and
//! publishes the augmented files.

pub mod lift;
pub mod watcher;

pub use lift::{FusionSummary, fuse_document, lift_group, lift_keypoint};
pub use watcher::{
    FuseOutcome, FusionError, KeypointWatcher, ParseRetryPolicy, RetryExhausted, WatcherConfig,
};
