//! Video frame data structures

use bytes::Bytes;

use super::format::{PixelFormat, Resolution};

/// Rational time base of a media stream (e.g. 1/90000 for video)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub num: u32,
    pub den: u32,
}

impl TimeBase {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// The 90 kHz clock used by RTP video
    pub const VIDEO_90KHZ: TimeBase = TimeBase::new(1, 90_000);

    /// Duration in seconds of `ticks` units of this time base
    pub fn ticks_to_secs(&self, ticks: i64) -> f64 {
        ticks as f64 * self.num as f64 / self.den as f64
    }
}

/// A decoded video frame with presentation timing metadata
///
/// The pixel buffer is reference-counted (`Bytes`), so cloning a frame is
/// cheap. Timing fields travel with the frame: any stage that replaces the
/// pixel content must carry `pts` and `time_base` over unchanged, otherwise
/// downstream playback drifts.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Raw pixel data
    data: Bytes,
    /// Frame resolution
    pub resolution: Resolution,
    /// Pixel format
    pub format: PixelFormat,
    /// Presentation timestamp in `time_base` units
    pub pts: i64,
    /// Time base of `pts`
    pub time_base: TimeBase,
}

impl VideoFrame {
    /// Create a new video frame
    pub fn new(
        data: Bytes,
        resolution: Resolution,
        format: PixelFormat,
        pts: i64,
        time_base: TimeBase,
    ) -> Self {
        Self {
            data,
            resolution,
            format,
            pts,
            time_base,
        }
    }

    /// Create a frame from a `Vec<u8>`
    pub fn from_vec(
        data: Vec<u8>,
        resolution: Resolution,
        format: PixelFormat,
        pts: i64,
        time_base: TimeBase,
    ) -> Self {
        Self::new(Bytes::from(data), resolution, format, pts, time_base)
    }

    /// Produce a frame with new pixel content and identical metadata.
    ///
    /// This is the re-wrap step of the frame transformer: the returned frame
    /// keeps this frame's resolution, format, `pts` and `time_base`.
    pub fn with_data(&self, data: Bytes) -> Self {
        Self {
            data,
            resolution: self.resolution,
            format: self.format,
            pts: self.pts,
            time_base: self.time_base,
        }
    }

    /// Get frame data as a byte slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get frame data as `Bytes` (cheap clone)
    pub fn data_bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Get data length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if frame is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_data_preserves_timing() {
        let frame = VideoFrame::from_vec(
            vec![0u8; 12],
            Resolution::new(2, 2),
            PixelFormat::Bgr24,
            9_000,
            TimeBase::VIDEO_90KHZ,
        );

        let rewrapped = frame.with_data(Bytes::from(vec![255u8; 12]));
        assert_eq!(rewrapped.pts, frame.pts);
        assert_eq!(rewrapped.time_base, frame.time_base);
        assert_eq!(rewrapped.resolution, frame.resolution);
        assert_ne!(rewrapped.data(), frame.data());
    }

    #[test]
    fn time_base_converts_ticks() {
        let tb = TimeBase::VIDEO_90KHZ;
        assert!((tb.ticks_to_secs(90_000) - 1.0).abs() < f64::EPSILON);
        assert!((tb.ticks_to_secs(3_000) - 1.0 / 30.0).abs() < 1e-9);
    }
}
