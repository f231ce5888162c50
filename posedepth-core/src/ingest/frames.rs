//! Frame types produced by sensors

use image::RgbImage;
use std::sync::Arc;

/// Which physical stream a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamRole {
    Depth,
    Color,
}

impl std::fmt::Display for StreamRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamRole::Depth => f.write_str("depth"),
            StreamRole::Color => f.write_str("color"),
        }
    }
}

/// One Z16 depth image from the live sensor.
#[derive(Debug, Clone)]
pub struct DepthFrame {
    pub width: u32,
    pub height: u32,
    /// Raw depth in sensor units, row-major, zero means no reading.
    pub data: Arc<[u16]>,
    /// Sensor timestamp in milliseconds.
    pub timestamp: f64,
    /// Sensor frame counter.
    pub frame_number: u64,
}

impl DepthFrame {
    pub fn new(width: u32, height: u32, data: Vec<u16>, timestamp: f64, frame_number: u64) -> Self {
        Self {
            width,
            height,
            data: data.into(),
            timestamp,
            frame_number,
        }
    }

    /// Depth pixels viewed as bytes, tightly packed.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data[..])
    }

    pub fn bytes_per_pixel(&self) -> usize {
        std::mem::size_of::<u16>()
    }

    pub fn stride_in_bytes(&self) -> usize {
        self.width as usize * self.bytes_per_pixel()
    }
}

/// One RGB8 color image.
#[derive(Debug, Clone)]
pub struct ColorFrame {
    pub image: RgbImage,
    /// Sensor timestamp in milliseconds.
    pub timestamp: f64,
    pub frame_number: u64,
}

impl ColorFrame {
    pub fn new(image: RgbImage, timestamp: f64, frame_number: u64) -> Self {
        Self {
            image,
            timestamp,
            frame_number,
        }
    }

    /// Get image dimensions (width, height).
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn bytes_per_pixel(&self) -> usize {
        3
    }

    pub fn stride_in_bytes(&self) -> usize {
        self.image.width() as usize * self.bytes_per_pixel()
    }
}

/// The color image captured at startup and replayed on every tick.
pub type BaselineColorFrame = Arc<ColorFrame>;
