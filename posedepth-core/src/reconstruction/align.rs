//! Depth-to-color alignment
//!
//! Reprojects a depth image into the color camera's pixel grid. Each depth pixel
//! is treated as a small square: its two opposite corners are lifted to 3D at the
//! pixel's depth, moved into the color frame and projected, and the covered
//! color pixels take that depth. Overlaps keep the nearest surface.

use crate::ingest::{CalibrationContext, CameraExtrinsics, CameraIntrinsics};
use crate::reconstruction::errors::ReconstructionError;
use crate::reconstruction::virtual_device::SoftwareFrameset;
use glam::Vec2;
use std::sync::Arc;
use tracing::trace;

/// Depth and color expressed in the color sensor's pixel grid.
#[derive(Debug, Clone)]
pub struct AlignedFrameset {
    pub sequence: u64,
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    /// Raw depth per color pixel, zero where nothing projected.
    pub depth: Vec<u16>,
    pub color: Arc<[u8]>,
}

/// Aligns depth frames to the color grid using fixed calibration.
#[derive(Debug, Clone)]
pub struct DepthAligner {
    depth_intrinsics: CameraIntrinsics,
    color_intrinsics: CameraIntrinsics,
    depth_to_color: CameraExtrinsics,
    depth_units: f32,
}

impl DepthAligner {
    pub fn new(calibration: &CalibrationContext) -> Self {
        Self {
            depth_intrinsics: calibration.depth_intrinsics,
            color_intrinsics: calibration.color_intrinsics,
            depth_to_color: calibration.depth_to_color,
            depth_units: calibration.depth_units,
        }
    }

    /// Align a matched frameset from the virtual device.
    pub fn process(
        &self,
        frameset: SoftwareFrameset,
    ) -> Result<AlignedFrameset, ReconstructionError> {
        let depth = self.align(&frameset.depth)?;
        Ok(AlignedFrameset {
            sequence: frameset.sequence,
            timestamp: frameset.timestamp,
            width: self.color_intrinsics.width,
            height: self.color_intrinsics.height,
            depth,
            color: frameset.color,
        })
    }

    /// Reproject a raw depth image (depth grid) into the color grid.
    pub fn align(&self, depth: &[u16]) -> Result<Vec<u16>, ReconstructionError> {
        let din = &self.depth_intrinsics;
        let cin = &self.color_intrinsics;

        if depth.len() != din.pixel_count() {
            return Err(ReconstructionError::DimensionMismatch {
                expected: din.pixel_count(),
                actual: depth.len(),
            });
        }

        let (cw, ch) = (cin.width as i32, cin.height as i32);
        let mut aligned = vec![0u16; cin.pixel_count()];
        let mut skipped = 0usize;

        for dy in 0..din.height {
            for dx in 0..din.width {
                let raw = depth[(dy * din.width + dx) as usize];
                if raw == 0 {
                    continue;
                }
                let z = raw as f32 * self.depth_units;

                let corner0 = Vec2::new(dx as f32 - 0.5, dy as f32 - 0.5);
                let corner1 = Vec2::new(dx as f32 + 0.5, dy as f32 + 0.5);
                let c0 = cin.project(self.depth_to_color.transform(din.deproject(corner0, z)));
                let c1 = cin.project(self.depth_to_color.transform(din.deproject(corner1, z)));

                let x0 = (c0.x + 0.5) as i32;
                let y0 = (c0.y + 0.5) as i32;
                let x1 = (c1.x + 0.5) as i32;
                let y1 = (c1.y + 0.5) as i32;

                if x0 < 0 || y0 < 0 || x1 >= cw || y1 >= ch {
                    skipped += 1;
                    continue;
                }

                for y in y0..=y1 {
                    for x in x0..=x1 {
                        let slot = &mut aligned[(y * cw + x) as usize];
                        *slot = if *slot == 0 { raw } else { (*slot).min(raw) };
                    }
                }
            }
        }

        trace!(skipped, "Aligned depth to color grid");
        Ok(aligned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ColorFrame;
    use glam::Vec3;
    use image::RgbImage;

    fn calibration(
        depth: CameraIntrinsics,
        color: CameraIntrinsics,
        ext: CameraExtrinsics,
    ) -> CalibrationContext {
        CalibrationContext {
            depth_intrinsics: depth,
            color_intrinsics: color,
            depth_to_color: ext,
            depth_units: 0.001,
            baseline: Arc::new(ColorFrame::new(RgbImage::new(color.width, color.height), 0.0, 0)),
        }
    }

    #[test]
    fn test_identical_sensors_align_in_place() {
        let intrin = CameraIntrinsics::pinhole(8, 6, 16.0, 16.0, 4.0, 3.0);
        let aligner = DepthAligner::new(&calibration(intrin, intrin, CameraExtrinsics::identity()));

        let mut depth = vec![0u16; 48];
        depth[3 * 8 + 4] = 1500;
        let aligned = aligner.align(&depth).unwrap();

        // Pixel footprint corners round onto the next pixel, so the hit covers 2x2.
        assert_eq!(aligned[3 * 8 + 4], 1500);
        assert_eq!(aligned[4 * 8 + 5], 1500);
        assert_eq!(aligned.iter().filter(|&&d| d != 0).count(), 4);
    }

    #[test]
    fn test_translation_shifts_pixels() {
        // 12.5 cm sideways at 1 m with fx = 16 moves the image by two pixels.
        let intrin = CameraIntrinsics::pinhole(8, 6, 16.0, 16.0, 4.0, 3.0);
        let ext = CameraExtrinsics::from_translation(Vec3::new(0.125, 0.0, 0.0));
        let aligner = DepthAligner::new(&calibration(intrin, intrin, ext));

        let mut depth = vec![0u16; 48];
        depth[3 * 8 + 3] = 1000;
        let aligned = aligner.align(&depth).unwrap();

        assert_eq!(aligned[3 * 8 + 5], 1000);
        assert_eq!(aligned[3 * 8 + 3], 0);
    }

    #[test]
    fn test_nearest_surface_wins_on_overlap() {
        // Half-resolution color grid: two depth pixels land on one color pixel.
        let depth_in = CameraIntrinsics::pinhole(8, 6, 16.0, 16.0, 4.0, 3.0);
        let color_in = CameraIntrinsics::pinhole(4, 3, 8.0, 8.0, 2.0, 1.5);
        let aligner =
            DepthAligner::new(&calibration(depth_in, color_in, CameraExtrinsics::identity()));

        let mut depth = vec![0u16; 48];
        depth[2 * 8 + 4] = 1200;
        depth[2 * 8 + 5] = 900;
        let aligned = aligner.align(&depth).unwrap();

        assert_eq!(aligned.len(), 12);
        assert_eq!(aligned[4 + 2], 900);
        assert_eq!(aligned[4 + 3], 900);
    }

    #[test]
    fn test_out_of_grid_projection_is_skipped() {
        let intrin = CameraIntrinsics::pinhole(8, 6, 16.0, 16.0, 4.0, 3.0);
        let ext = CameraExtrinsics::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let aligner = DepthAligner::new(&calibration(intrin, intrin, ext));

        let mut depth = vec![0u16; 48];
        depth[3 * 8 + 6] = 1000;
        let aligned = aligner.align(&depth).unwrap();
        assert!(aligned.iter().all(|&d| d == 0));
    }

    #[test]
    fn test_wrong_size_depth_is_rejected() {
        let intrin = CameraIntrinsics::pinhole(8, 6, 16.0, 16.0, 4.0, 3.0);
        let aligner = DepthAligner::new(&calibration(intrin, intrin, CameraExtrinsics::identity()));
        assert!(matches!(
            aligner.align(&[0u16; 10]),
            Err(ReconstructionError::DimensionMismatch {
                expected: 48,
                actual: 10
            })
        ));
    }
}
