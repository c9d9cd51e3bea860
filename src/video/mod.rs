//! Video frame model shared by the detection and WebRTC layers

pub mod format;
pub mod frame;

pub use format::{PixelFormat, Resolution};
pub use frame::{TimeBase, VideoFrame};
