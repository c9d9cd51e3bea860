//! Codec seam between RTP packets and decoded frames
//!
//! Decode/encode is a collaborator injected through these traits; the
//! shipped backend is OpenH264 (see [`super::h264`]). When no factory is
//! configured the track plumbing falls back to forwarding RTP unchanged.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use clap::ValueEnum;
use rtp::packet::Packet;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::video::VideoFrame;

/// One encoded output unit ready to be written as a track sample
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    pub data: Bytes,
    pub duration: Duration,
}

/// Turns inbound RTP packets into decoded frames.
///
/// `decode` may buffer: it returns `Ok(None)` until enough packets have
/// arrived to produce a frame. Produced frames must carry `pts` derived
/// from the RTP timestamp and the codec's time base.
pub trait VideoDecoder: Send {
    fn decode(&mut self, packet: &Packet) -> Result<Option<VideoFrame>>;
}

/// Turns decoded frames into encoded samples
pub trait VideoEncoder: Send {
    fn encode(&mut self, frame: &VideoFrame) -> Result<Vec<EncodedChunk>>;
}

/// Creates a decoder/encoder pair per intercepted track
pub trait CodecFactory: Send + Sync {
    /// Mime type of the encoded output track (e.g. "video/VP8")
    fn mime_type(&self) -> String;

    /// RTP clock rate of the output track
    fn clock_rate(&self) -> u32;

    fn new_decoder(&self) -> Box<dyn VideoDecoder>;

    fn new_encoder(&self) -> Box<dyn VideoEncoder>;
}

/// Codec backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecBackend {
    /// Software H.264 decode and re-encode (OpenH264)
    #[default]
    H264,
    /// No codec; inbound RTP is forwarded unchanged
    None,
}

/// Instantiate the configured codec backend.
///
/// `None` selects the RTP loopback path: frames are never decoded, so the
/// detection capability stays idle for those connections.
pub fn load(backend: CodecBackend) -> Option<Arc<dyn CodecFactory>> {
    match backend {
        CodecBackend::H264 => {
            let factory = super::h264::H264CodecFactory;
            info!(mime = %factory.mime_type(), "Codec loaded");
            Some(Arc::new(factory))
        }
        CodecBackend::None => {
            info!("Codec disabled, inbound RTP will be forwarded unchanged");
            None
        }
    }
}
