//! Pose-estimator keypoint files
//!
//! Each file holds a `people` array; each person carries flat 2D arrays per
//! keypoint group (`pose_keypoints_2d`, `face_keypoints_2d`, ...). Fusion adds the
//! matching `*_keypoints_3d` arrays next to them.

mod document;
mod group;

pub use document::{KeypointDocument, KeypointError};
pub use group::{GroupLookup, KeypointGroup};
