//! Detection capability applied to decoded video frames
//!
//! A [`Detector`] takes one decoded frame and returns an annotated pixel
//! buffer of the same geometry. The server treats the capability as
//! optional: if loading fails at startup the video path degrades to
//! pass-through instead of refusing connections.

pub mod motion;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::video::VideoFrame;

pub use motion::MotionDetector;

/// Execution device requested for the detection backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecDevice {
    #[default]
    Cpu,
    Cuda,
}

impl fmt::Display for ExecDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecDevice::Cpu => write!(f, "cpu"),
            ExecDevice::Cuda => write!(f, "cuda"),
        }
    }
}

/// Detection backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorBackend {
    /// Motion-region annotator (pure Rust, grid hash differencing)
    #[default]
    Motion,
    /// No detection; frames pass through unchanged
    None,
}

/// Detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Which backend to load
    pub backend: DetectorBackend,
    /// Execution device
    pub device: ExecDevice,
    /// Grid cells per axis for the motion backend
    pub grid: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            backend: DetectorBackend::Motion,
            device: ExecDevice::Cpu,
            grid: 16,
        }
    }
}

/// Image-analysis function applied to each decoded frame
pub trait Detector: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Analyze one frame and return annotated pixel data.
    ///
    /// The returned buffer has the same resolution and pixel format as the
    /// input frame; callers re-wrap it with the input's timing metadata.
    fn annotate(&self, frame: &VideoFrame) -> Result<Bytes>;
}

/// Load the configured detection backend.
///
/// Returns `Ok(None)` when detection is explicitly disabled. Errors are
/// reported to the caller, which is expected to degrade to pass-through
/// rather than abort.
pub fn load(config: &DetectorConfig) -> Result<Option<Arc<dyn Detector>>> {
    match config.backend {
        DetectorBackend::None => Ok(None),
        DetectorBackend::Motion => {
            if config.grid == 0 || config.grid > 64 {
                return Err(AppError::Detect(format!(
                    "Motion grid must be in 1..=64, got {}",
                    config.grid
                )));
            }

            let device = match config.device {
                ExecDevice::Cpu => ExecDevice::Cpu,
                ExecDevice::Cuda => {
                    warn!("Motion backend has no CUDA path, falling back to CPU");
                    ExecDevice::Cpu
                }
            };

            let detector = MotionDetector::new(config.grid, device);
            info!(backend = detector.name(), %device, grid = config.grid, "Detector loaded");
            Ok(Some(Arc::new(detector)))
        }
    }
}
