//! Core keypoint types shared by the file format and the fusion stage.
//!
//! These are plain CPU-side values. The JSON wire layout (flat `[x, y, c, ...]`
//! arrays) is handled in [`crate::keypoints`].

use glam::Vec3;

/// A 2D keypoint as written by the pose estimator, in color-image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint2D {
    /// Horizontal pixel coordinate.
    pub x: f64,
    /// Vertical pixel coordinate.
    pub y: f64,
    /// Detection confidence (0 means "not detected").
    pub confidence: f64,
}

impl Keypoint2D {
    /// Create a new 2D keypoint.
    pub fn new(x: f64, y: f64, confidence: f64) -> Self {
        Self { x, y, confidence }
    }

    /// Build a keypoint from a `[x, y, confidence]` triple.
    pub fn from_triple(triple: [f64; 3]) -> Self {
        Self::new(triple[0], triple[1], triple[2])
    }
}

/// A keypoint lifted into camera space.
///
/// A confidence of exactly zero is the "no 3D data" sentinel and always comes
/// with a zero position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint3D {
    /// Position in meters, color camera frame.
    pub position: Vec3,
    /// Confidence carried over from the 2D detection.
    pub confidence: f64,
}

impl Keypoint3D {
    /// Create a new 3D keypoint.
    pub fn new(position: Vec3, confidence: f64) -> Self {
        Self {
            position,
            confidence,
        }
    }

    /// The all-zero sentinel for a keypoint without depth.
    pub fn absent() -> Self {
        Self {
            position: Vec3::ZERO,
            confidence: 0.0,
        }
    }

    /// True when this is the "no 3D data" sentinel.
    pub fn is_absent(&self) -> bool {
        self.confidence == 0.0 && self.position == Vec3::ZERO
    }

    /// Flatten into the `[x, y, z, confidence]` layout used on disk.
    pub fn to_quad(&self) -> [f64; 4] {
        [
            self.position.x as f64,
            self.position.y as f64,
            self.position.z as f64,
            self.confidence,
        ]
    }
}

impl Default for Keypoint3D {
    fn default() -> Self {
        Self::absent()
    }
}
