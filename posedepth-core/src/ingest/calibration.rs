//! Camera calibration captured once at startup
//!
//! Intrinsics follow the usual depth-camera layout: resolution, principal point,
//! focal lengths in pixels, a distortion model and five coefficients
//! `[k1, k2, p1, p2, k3]`. Extrinsics are a column-major rotation plus a
//! translation in meters.

use crate::ingest::frames::BaselineColorFrame;
use glam::{Mat3, Vec2, Vec3};

/// Lens distortion model attached to a set of intrinsics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistortionModel {
    /// Rectified image, plain pinhole.
    #[default]
    None,
    /// Coefficients describe distortion; deprojection undistorts iteratively.
    BrownConrady,
    /// Brown-Conrady with the radial term applied before the tangential term.
    ModifiedBrownConrady,
    /// Coefficients describe undistortion; deprojection is closed form.
    InverseBrownConrady,
}

/// Optical parameters of one sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub width: u32,
    pub height: u32,
    /// Principal point, pixels.
    pub ppx: f32,
    pub ppy: f32,
    /// Focal lengths, pixels.
    pub fx: f32,
    pub fy: f32,
    pub model: DistortionModel,
    pub coeffs: [f32; 5],
}

impl CameraIntrinsics {
    /// Undistorted pinhole intrinsics.
    pub fn pinhole(width: u32, height: u32, fx: f32, fy: f32, ppx: f32, ppy: f32) -> Self {
        Self {
            width,
            height,
            ppx,
            ppy,
            fx,
            fy,
            model: DistortionModel::None,
            coeffs: [0.0; 5],
        }
    }

    /// Attach a distortion model.
    pub fn with_distortion(mut self, model: DistortionModel, coeffs: [f32; 5]) -> Self {
        self.model = model;
        self.coeffs = coeffs;
        self
    }

    /// Number of pixels in one image.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Lift a pixel at the given depth (meters) to a camera-space point.
    pub fn deproject(&self, pixel: Vec2, depth: f32) -> Vec3 {
        let mut x = (pixel.x - self.ppx) / self.fx;
        let mut y = (pixel.y - self.ppy) / self.fy;
        let c = &self.coeffs;

        match self.model {
            DistortionModel::None | DistortionModel::ModifiedBrownConrady => {}
            DistortionModel::InverseBrownConrady => {
                let r2 = x * x + y * y;
                let f = 1.0 + c[0] * r2 + c[1] * r2 * r2 + c[4] * r2 * r2 * r2;
                let ux = x * f + 2.0 * c[2] * x * y + c[3] * (r2 + 2.0 * x * x);
                let uy = y * f + 2.0 * c[3] * x * y + c[2] * (r2 + 2.0 * y * y);
                x = ux;
                y = uy;
            }
            DistortionModel::BrownConrady => {
                let (xo, yo) = (x, y);
                for _ in 0..10 {
                    let r2 = x * x + y * y;
                    let icdist = 1.0 / (1.0 + ((c[4] * r2 + c[1]) * r2 + c[0]) * r2);
                    let xq = x / icdist;
                    let yq = y / icdist;
                    let delta_x = 2.0 * c[2] * xq * yq + c[3] * (r2 + 2.0 * xq * xq);
                    let delta_y = 2.0 * c[3] * xq * yq + c[2] * (r2 + 2.0 * yq * yq);
                    x = (xo - delta_x) * icdist;
                    y = (yo - delta_y) * icdist;
                }
            }
        }

        Vec3::new(depth * x, depth * y, depth)
    }

    /// Project a camera-space point onto the image plane.
    pub fn project(&self, point: Vec3) -> Vec2 {
        let mut x = point.x / point.z;
        let mut y = point.y / point.z;
        let c = &self.coeffs;

        match self.model {
            DistortionModel::None | DistortionModel::InverseBrownConrady => {}
            DistortionModel::ModifiedBrownConrady | DistortionModel::BrownConrady => {
                let r2 = x * x + y * y;
                let f = 1.0 + c[0] * r2 + c[1] * r2 * r2 + c[4] * r2 * r2 * r2;
                let xf = x * f;
                let yf = y * f;
                // Modified variant feeds the radially scaled point into the tangential term.
                let (tx, ty) = match self.model {
                    DistortionModel::ModifiedBrownConrady => (xf, yf),
                    _ => (x, y),
                };
                let dx = xf + 2.0 * c[2] * tx * ty + c[3] * (r2 + 2.0 * tx * tx);
                let dy = yf + 2.0 * c[3] * tx * ty + c[2] * (r2 + 2.0 * ty * ty);
                x = dx;
                y = dy;
            }
        }

        Vec2::new(x * self.fx + self.ppx, y * self.fy + self.ppy)
    }
}

/// Rigid transform from one sensor's frame into another's.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraExtrinsics {
    /// Column-major 3x3 rotation.
    pub rotation: [f32; 9],
    /// Translation in meters.
    pub translation: [f32; 3],
}

impl CameraExtrinsics {
    pub fn identity() -> Self {
        Self {
            rotation: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            translation: [0.0; 3],
        }
    }

    /// A pure translation, e.g. the stereo baseline between two sensors.
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation: translation.to_array(),
            ..Self::identity()
        }
    }

    /// Apply the transform to a point.
    pub fn transform(&self, point: Vec3) -> Vec3 {
        Mat3::from_cols_array(&self.rotation) * point + Vec3::from_array(self.translation)
    }
}

impl Default for CameraExtrinsics {
    fn default() -> Self {
        Self::identity()
    }
}

/// Everything captured during the startup calibration pass.
///
/// Built once, never mutated, shared by reference with every stage that needs
/// camera geometry.
#[derive(Debug, Clone)]
pub struct CalibrationContext {
    pub depth_intrinsics: CameraIntrinsics,
    pub color_intrinsics: CameraIntrinsics,
    pub depth_to_color: CameraExtrinsics,
    /// Meters per raw depth unit.
    pub depth_units: f32,
    /// The frozen color image replayed on every tick.
    pub baseline: BaselineColorFrame,
}

impl CalibrationContext {
    /// Resolution of the keypoint coordinate space (the color image).
    pub fn color_resolution(&self) -> (u32, u32) {
        (self.color_intrinsics.width, self.color_intrinsics.height)
    }
}
