//! rtc-vision - WebRTC video server with per-frame detection annotations
//!
//! Accepts a WebRTC offer over HTTP, intercepts the caller's video track,
//! runs each decoded frame through an optional detection capability and
//! streams the annotated frames back on an outbound track.

pub mod config;
pub mod detect;
pub mod error;
pub mod state;
pub mod video;
pub mod web;
pub mod webrtc;

pub use error::{AppError, Result};
