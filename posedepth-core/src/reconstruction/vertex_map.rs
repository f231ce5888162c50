//! Per-pixel 3D points in the color camera frame

use crate::geometry::pixel_index;
use crate::ingest::CameraIntrinsics;
use crate::reconstruction::align::AlignedFrameset;
use crate::reconstruction::errors::ReconstructionError;
use glam::{Vec2, Vec3};
use std::sync::Arc;

/// Dense grid of camera-space points, one per color pixel.
///
/// Pixels without depth hold [`Vec3::ZERO`]. The buffer is shared and immutable,
/// so handing a map to a consumer is a reference-count bump and stays valid after
/// the engine has moved on to the next tick.
#[derive(Debug, Clone)]
pub struct VertexMap {
    width: u32,
    height: u32,
    version: u64,
    vertices: Arc<[Vec3]>,
}

impl VertexMap {
    /// Wrap an existing row-major vertex buffer.
    pub fn from_vertices(
        width: u32,
        height: u32,
        version: u64,
        vertices: Vec<Vec3>,
    ) -> Result<Self, ReconstructionError> {
        let expected = width as usize * height as usize;
        if vertices.len() != expected {
            return Err(ReconstructionError::DimensionMismatch {
                expected,
                actual: vertices.len(),
            });
        }
        Ok(Self {
            width,
            height,
            version,
            vertices: vertices.into(),
        })
    }

    /// A map with no valid depth anywhere.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            version: 0,
            vertices: vec![Vec3::ZERO; width as usize * height as usize].into(),
        }
    }

    /// Deproject an aligned depth image with the color intrinsics.
    pub fn from_aligned(
        aligned: &AlignedFrameset,
        intrinsics: &CameraIntrinsics,
        depth_units: f32,
    ) -> Result<Self, ReconstructionError> {
        if aligned.width != intrinsics.width || aligned.height != intrinsics.height {
            return Err(ReconstructionError::DimensionMismatch {
                expected: intrinsics.pixel_count(),
                actual: aligned.width as usize * aligned.height as usize,
            });
        }
        let vertices = deproject_depth(&aligned.depth, intrinsics, depth_units)?;
        Self::from_vertices(aligned.width, aligned.height, aligned.sequence, vertices)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Tick sequence this map was built from.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Point at `(x, y)`, or `None` outside the grid.
    pub fn get(&self, x: u32, y: u32) -> Option<Vec3> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.vertices.get(pixel_index(x, y, self.width)).copied()
    }

    /// Number of pixels carrying real depth.
    pub fn valid_count(&self) -> usize {
        self.vertices.iter().filter(|v| v.z > 0.0).count()
    }

    pub fn as_slice(&self) -> &[Vec3] {
        &self.vertices
    }
}

/// Lift every pixel of a depth image to camera space.
///
/// Non-positive or non-finite depth yields the origin.
pub fn deproject_depth(
    depth: &[u16],
    intrinsics: &CameraIntrinsics,
    depth_units: f32,
) -> Result<Vec<Vec3>, ReconstructionError> {
    if depth.len() != intrinsics.pixel_count() {
        return Err(ReconstructionError::DimensionMismatch {
            expected: intrinsics.pixel_count(),
            actual: depth.len(),
        });
    }

    let width = intrinsics.width as usize;
    let vertices = depth
        .iter()
        .enumerate()
        .map(|(i, &raw)| {
            let z = raw as f32 * depth_units;
            if !(z.is_finite() && z > 0.0) {
                return Vec3::ZERO;
            }
            let pixel = Vec2::new((i % width) as f32, (i / width) as f32);
            intrinsics.deproject(pixel, z)
        })
        .collect();

    Ok(vertices)
}
