//! Software H.264 codec backed by OpenH264
//!
//! The decoder side reassembles access units from depacketized RTP payloads
//! and hands them to OpenH264, producing RGB frames stamped with the RTP
//! timestamp on the 90 kHz clock. The encoder side converts RGB frames to
//! I420 and emits one Annex-B bitstream per frame; RTP packetization of the
//! result is left to the outbound track.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use openh264::decoder::Decoder;
use openh264::encoder::{Encoder, EncoderConfig};
use openh264::formats::YUVBuffer;
use rtp::codecs::h264::H264Packet;
use rtp::packet::Packet;
use rtp::packetizer::Depacketizer;
use tracing::{debug, warn};
use webrtc::api::media_engine::MIME_TYPE_H264;

use super::codec::{CodecFactory, EncodedChunk, VideoDecoder, VideoEncoder};
use crate::error::{AppError, Result};
use crate::video::{PixelFormat, Resolution, TimeBase, VideoFrame};

/// Factory for the OpenH264 decode/encode pair
#[derive(Debug, Default)]
pub struct H264CodecFactory;

impl CodecFactory for H264CodecFactory {
    fn mime_type(&self) -> String {
        MIME_TYPE_H264.to_string()
    }

    fn clock_rate(&self) -> u32 {
        90_000
    }

    fn new_decoder(&self) -> Box<dyn VideoDecoder> {
        Box::new(H264FrameDecoder::new())
    }

    fn new_encoder(&self) -> Box<dyn VideoEncoder> {
        Box::new(H264FrameEncoder::new())
    }
}

/// Collects depacketized NAL units until the marker bit closes an access unit
#[derive(Default)]
struct AccessUnitAssembler {
    depacketizer: H264Packet,
    buffer: BytesMut,
    timestamp: Option<u32>,
}

impl AccessUnitAssembler {
    /// Feed one RTP packet; returns a complete Annex-B access unit and its
    /// RTP timestamp when the packet carried the marker bit.
    ///
    /// A timestamp change with data still buffered means the previous access
    /// unit lost its tail (packet loss); the partial unit is dropped rather
    /// than handed to the decoder.
    fn push(&mut self, packet: &Packet) -> Option<(Bytes, i64)> {
        if !self.buffer.is_empty() && self.timestamp != Some(packet.header.timestamp) {
            debug!("Incomplete access unit dropped");
            self.buffer.clear();
        }
        self.timestamp = Some(packet.header.timestamp);

        match self.depacketizer.depacketize(&packet.payload) {
            Ok(nal) => self.buffer.extend_from_slice(&nal),
            Err(e) => {
                warn!("H264 depacketize failed, dropping access unit: {}", e);
                self.buffer.clear();
                return None;
            }
        }

        if packet.header.marker && !self.buffer.is_empty() {
            let unit = self.buffer.split().freeze();
            return Some((unit, packet.header.timestamp as i64));
        }
        None
    }
}

/// RTP-to-frame decoder; one instance per intercepted track
pub struct H264FrameDecoder {
    assembler: AccessUnitAssembler,
    decoder: Option<Decoder>,
}

impl H264FrameDecoder {
    pub fn new() -> Self {
        Self {
            assembler: AccessUnitAssembler::default(),
            decoder: None,
        }
    }

    fn decode_access_unit(&mut self, unit: &[u8], pts: i64) -> Result<Option<VideoFrame>> {
        if self.decoder.is_none() {
            let decoder = Decoder::new()
                .map_err(|e| AppError::Video(format!("Failed to create H264 decoder: {}", e)))?;
            self.decoder = Some(decoder);
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(None);
        };

        match decoder.decode(unit) {
            Ok(Some(yuv)) => {
                let (width, height) = yuv.dimension_rgb();
                let mut rgb = vec![0u8; width * height * 3];
                yuv.write_rgb8(&mut rgb);

                Ok(Some(VideoFrame::from_vec(
                    rgb,
                    Resolution::new(width as u32, height as u32),
                    PixelFormat::Rgb24,
                    pts,
                    TimeBase::VIDEO_90KHZ,
                )))
            }
            Ok(None) => Ok(None),
            // Undecodable units (e.g. deltas before the first keyframe) are
            // skipped; the stream recovers at the next keyframe.
            Err(e) => {
                warn!("H264 decode failed, skipping access unit: {}", e);
                Ok(None)
            }
        }
    }
}

impl Default for H264FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoDecoder for H264FrameDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<Option<VideoFrame>> {
        match self.assembler.push(packet) {
            Some((unit, pts)) => self.decode_access_unit(&unit, pts),
            None => Ok(None),
        }
    }
}

/// Frame-to-bitstream encoder; recreated state when the resolution changes
pub struct H264FrameEncoder {
    encoder: Option<(Encoder, Resolution)>,
}

impl H264FrameEncoder {
    pub fn new() -> Self {
        Self { encoder: None }
    }
}

impl Default for H264FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoEncoder for H264FrameEncoder {
    fn encode(&mut self, frame: &VideoFrame) -> Result<Vec<EncodedChunk>> {
        if frame.format.bytes_per_pixel() != 3 {
            return Err(AppError::Video(format!(
                "H264 encoder requires a 3-byte pixel format, got {}",
                frame.format
            )));
        }
        let expected = frame.format.buffer_size(frame.resolution);
        if frame.len() != expected {
            return Err(AppError::Video(format!(
                "Frame buffer size {} does not match {} (expected {})",
                frame.len(),
                frame.resolution,
                expected
            )));
        }

        let matches_current = matches!(&self.encoder, Some((_, res)) if *res == frame.resolution);
        if !matches_current {
            let config = EncoderConfig::new(frame.width(), frame.height());
            let encoder = Encoder::with_config(config)
                .map_err(|e| AppError::Video(format!("Failed to create H264 encoder: {}", e)))?;
            self.encoder = Some((encoder, frame.resolution));
        }
        let Some((encoder, _)) = self.encoder.as_mut() else {
            return Ok(vec![]);
        };

        let width = frame.width() as usize;
        let height = frame.height() as usize;
        let yuv = YUVBuffer::with_rgb(width, height, frame.data());

        let bitstream = encoder
            .encode(&yuv)
            .map_err(|e| AppError::Video(format!("H264 encode failed: {}", e)))?;
        let data = bitstream.to_vec();
        if data.is_empty() {
            return Ok(vec![]);
        }

        // Duration 0 defers to the pump's pts-derived frame duration
        Ok(vec![EncodedChunk {
            data: Bytes::from(data),
            duration: Duration::ZERO,
        }])
    }
}
