//! Motion-region annotator
//!
//! Splits each frame into a grid, hashes every cell's pixel content and
//! compares the hashes against the previous frame. Cells whose content
//! changed get a rectangle drawn around them in the output buffer. Hash
//! comparison makes the per-frame cost linear in the buffer size with no
//! allocation besides the output copy.

use bytes::Bytes;
use parking_lot::Mutex;
use xxhash_rust::xxh64::Xxh64;

use super::{Detector, ExecDevice};
use crate::error::{AppError, Result};
use crate::video::{PixelFormat, Resolution, VideoFrame};

/// Annotation color, one byte per channel in frame pixel order
const BOX_COLOR: [u8; 3] = [0, 255, 0];

struct GridState {
    resolution: Resolution,
    hashes: Vec<u64>,
}

/// Frame-differencing detector with per-cell content hashes
pub struct MotionDetector {
    grid: u32,
    #[allow(dead_code)]
    device: ExecDevice,
    prev: Mutex<Option<GridState>>,
}

impl MotionDetector {
    pub fn new(grid: u32, device: ExecDevice) -> Self {
        Self {
            grid,
            device,
            prev: Mutex::new(None),
        }
    }

    /// Hash every grid cell of the frame
    fn cell_hashes(&self, frame: &VideoFrame) -> Vec<u64> {
        let bpp = frame.format.bytes_per_pixel();
        let width = frame.width() as usize;
        let height = frame.height() as usize;
        let grid = self.grid as usize;
        let data = frame.data();

        let mut hashes = Vec::with_capacity(grid * grid);
        for cy in 0..grid {
            let y0 = cy * height / grid;
            let y1 = (cy + 1) * height / grid;
            for cx in 0..grid {
                let x0 = cx * width / grid;
                let x1 = (cx + 1) * width / grid;

                let mut hasher = Xxh64::new(0);
                for y in y0..y1 {
                    let row = y * width * bpp;
                    hasher.update(&data[row + x0 * bpp..row + x1 * bpp]);
                }
                hashes.push(hasher.digest());
            }
        }
        hashes
    }

    /// Draw a rectangle outline for the given cell into `out`
    fn draw_cell_box(&self, out: &mut [u8], frame: &VideoFrame, cx: usize, cy: usize) {
        let bpp = frame.format.bytes_per_pixel();
        let width = frame.width() as usize;
        let height = frame.height() as usize;
        let grid = self.grid as usize;

        let x0 = cx * width / grid;
        let x1 = ((cx + 1) * width / grid).max(x0 + 1).min(width);
        let y0 = cy * height / grid;
        let y1 = ((cy + 1) * height / grid).max(y0 + 1).min(height);

        let mut put = |x: usize, y: usize| {
            let base = (y * width + x) * bpp;
            for c in 0..bpp {
                out[base + c] = BOX_COLOR[c.min(2)];
            }
        };

        for x in x0..x1 {
            put(x, y0);
            put(x, y1 - 1);
        }
        for y in y0..y1 {
            put(x0, y);
            put(x1 - 1, y);
        }
    }
}

impl Detector for MotionDetector {
    fn name(&self) -> &'static str {
        "motion"
    }

    fn annotate(&self, frame: &VideoFrame) -> Result<Bytes> {
        let expected = frame.format.buffer_size(frame.resolution);
        if frame.len() != expected {
            return Err(AppError::Detect(format!(
                "Frame buffer size {} does not match {} {} (expected {})",
                frame.len(),
                frame.resolution,
                frame.format,
                expected
            )));
        }
        if frame.format == PixelFormat::Grey {
            return Err(AppError::Detect(
                "Motion backend requires a 3-byte pixel format".to_string(),
            ));
        }

        let hashes = self.cell_hashes(frame);
        let grid = self.grid as usize;

        let changed: Vec<usize> = {
            let mut prev = self.prev.lock();
            let changed = match prev.as_ref() {
                Some(state) if state.resolution == frame.resolution => hashes
                    .iter()
                    .zip(state.hashes.iter())
                    .enumerate()
                    .filter(|(_, (now, before))| now != before)
                    .map(|(i, _)| i)
                    .collect(),
                // First frame, or resolution changed: nothing to compare yet
                _ => Vec::new(),
            };
            *prev = Some(GridState {
                resolution: frame.resolution,
                hashes,
            });
            changed
        };

        if changed.is_empty() {
            return Ok(frame.data_bytes());
        }

        let mut out = frame.data().to_vec();
        for idx in &changed {
            self.draw_cell_box(&mut out, frame, idx % grid, idx / grid);
        }
        Ok(Bytes::from(out))
    }
}
