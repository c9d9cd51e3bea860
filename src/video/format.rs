//! Pixel format and resolution definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported pixel formats for decoded frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PixelFormat {
    /// BGR24 format (3 bytes per pixel), the layout detection backends consume
    Bgr24,
    /// RGB24 format (3 bytes per pixel)
    Rgb24,
    /// Grayscale format (1 byte per pixel)
    Grey,
}

impl PixelFormat {
    /// Bytes per pixel for this format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Bgr24 | PixelFormat::Rgb24 => 3,
            PixelFormat::Grey => 1,
        }
    }

    /// Expected buffer size for a frame of the given resolution
    pub fn buffer_size(&self, resolution: Resolution) -> usize {
        self.bytes_per_pixel() * resolution.pixels()
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Bgr24 => write!(f, "BGR24"),
            PixelFormat::Rgb24 => write!(f, "RGB24"),
            PixelFormat::Grey => write!(f, "GREY"),
        }
    }
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total pixel count
    pub fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
