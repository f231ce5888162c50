//! Posedepth Data Crate
//!
//! File formats and filesystem conventions shared with the external pose
//! estimator: keypoint documents, the frame filename protocol, the directory
//! store used for discovery and commit, and the readiness handshake.
//! This crate knows nothing about sensors or depth.

pub mod handshake;
pub mod keypoints;
pub mod naming;
pub mod store;
pub mod types;

pub use handshake::{HandshakeError, ReadinessFlag};
pub use keypoints::{GroupLookup, KeypointDocument, KeypointError, KeypointGroup};
pub use naming::{FrameName, parse_frame_index, processed_file_name, raw_file_name};
pub use store::{DirectoryStore, FileState, KeypointStore};
pub use types::{Keypoint2D, Keypoint3D};
