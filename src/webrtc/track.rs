//! Track plumbing: inbound frame source, processed outbound track, RTP loopback

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocalWriter;
use webrtc::track::track_remote::TrackRemote;

use super::codec::{CodecFactory, VideoDecoder, VideoEncoder};
use super::transform::{FrameSource, FrameTransformer};
use crate::detect::Detector;
use crate::error::{AppError, Result};
use crate::video::{TimeBase, VideoFrame};

/// Stream id announced on outbound tracks
pub const STREAM_ID: &str = "rtc-vision";

/// Fallback frame duration before two pts values are known (30 fps)
const DEFAULT_FRAME_DURATION: Duration = Duration::from_micros(33_333);

/// Pulls decoded frames out of a remote track.
///
/// Each `recv` awaits RTP packets until the decoder assembles one frame;
/// the read loop ends when the connection closes and `read_rtp` errors.
pub struct RemoteFrameSource {
    track: Arc<TrackRemote>,
    decoder: Box<dyn VideoDecoder>,
}

impl RemoteFrameSource {
    pub fn new(track: Arc<TrackRemote>, decoder: Box<dyn VideoDecoder>) -> Self {
        Self { track, decoder }
    }
}

#[async_trait]
impl FrameSource for RemoteFrameSource {
    async fn recv(&mut self) -> Result<VideoFrame> {
        loop {
            let (packet, _) = self
                .track
                .read_rtp()
                .await
                .map_err(|e| AppError::WebRtc(format!("RTP read failed: {}", e)))?;

            if let Some(frame) = self.decoder.decode(&packet)? {
                return Ok(frame);
            }
        }
    }
}

/// Outbound track carrying re-encoded, annotated frames
pub struct ProcessedVideoTrack {
    track: Arc<TrackLocalStaticSample>,
    encoder: Box<dyn VideoEncoder>,
}

impl ProcessedVideoTrack {
    /// Create an output track whose codec comes from the factory
    pub fn new(factory: &dyn CodecFactory, track_id: impl Into<String>) -> Self {
        let capability = RTCRtpCodecCapability {
            mime_type: factory.mime_type(),
            clock_rate: factory.clock_rate(),
            ..Default::default()
        };

        Self {
            track: Arc::new(TrackLocalStaticSample::new(
                capability,
                track_id.into(),
                STREAM_ID.to_string(),
            )),
            encoder: factory.new_encoder(),
        }
    }

    /// The underlying local track, for `RTCPeerConnection::add_track`
    pub fn local_track(&self) -> Arc<TrackLocalStaticSample> {
        self.track.clone()
    }

    /// Drive the track: pull the source once per outbound frame until the
    /// source ends, encoding and writing each produced frame.
    pub fn spawn_pump(mut self, mut source: Box<dyn FrameSource>, connection_id: String) {
        tokio::spawn(async move {
            let mut prev_pts: Option<(i64, TimeBase)> = None;

            loop {
                let frame = match source.recv().await {
                    Ok(frame) => frame,
                    Err(e) => {
                        debug!(connection_id = %connection_id, "Frame source ended: {}", e);
                        break;
                    }
                };

                let duration = frame_duration(&frame, prev_pts);
                prev_pts = Some((frame.pts, frame.time_base));

                let chunks = match self.encoder.encode(&frame) {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        warn!(connection_id = %connection_id, "Encode failed, frame dropped: {}", e);
                        continue;
                    }
                };

                for chunk in chunks {
                    let sample = Sample {
                        data: chunk.data,
                        duration: if chunk.duration.is_zero() {
                            duration
                        } else {
                            chunk.duration
                        },
                        ..Default::default()
                    };
                    if let Err(e) = self.track.write_sample(&sample).await {
                        debug!(connection_id = %connection_id, "Sample write failed: {}", e);
                        return;
                    }
                }
            }

            info!(connection_id = %connection_id, "Processed video pump stopped");
        });
    }
}

/// Wall-clock duration of a frame from successive pts values
fn frame_duration(frame: &VideoFrame, prev: Option<(i64, TimeBase)>) -> Duration {
    match prev {
        Some((prev_pts, tb)) if tb == frame.time_base && frame.pts > prev_pts => {
            Duration::from_secs_f64(tb.ticks_to_secs(frame.pts - prev_pts))
        }
        _ => DEFAULT_FRAME_DURATION,
    }
}

/// Outbound video wiring for one connection, created before negotiation so
/// the track is announced in the answer SDP.
///
/// With a codec factory the outbound track carries re-encoded annotated
/// frames; without one it is a raw RTP loopback of the inbound track.
pub enum OutboundVideo {
    Processed {
        track: ProcessedVideoTrack,
        factory: Arc<dyn CodecFactory>,
        detector: Option<Arc<dyn Detector>>,
    },
    Loopback(Arc<TrackLocalStaticRTP>),
}

impl OutboundVideo {
    /// Wire the inbound track into the outbound one. Consumes self: the
    /// first arriving video track claims the outbound slot.
    pub fn attach(self, remote: Arc<TrackRemote>, connection_id: String) {
        match self {
            OutboundVideo::Processed {
                track,
                factory,
                detector,
            } => {
                if detector.is_none() {
                    info!(connection_id = %connection_id, "No detector loaded, frames pass through unannotated");
                }
                let source = RemoteFrameSource::new(remote, factory.new_decoder());
                let transformer = FrameTransformer::new(Box::new(source), detector);
                track.spawn_pump(Box::new(transformer), connection_id);
            }
            OutboundVideo::Loopback(local) => {
                info!(connection_id = %connection_id, "No codec configured, forwarding RTP unchanged");
                spawn_rtp_forward(remote, local, connection_id);
            }
        }
    }
}

/// Loopback output track for the codec-less degraded mode
pub fn loopback_track(mime_type: impl Into<String>, track_id: impl Into<String>) -> Arc<TrackLocalStaticRTP> {
    Arc::new(TrackLocalStaticRTP::new(
        RTCRtpCodecCapability {
            mime_type: mime_type.into(),
            clock_rate: 90_000,
            ..Default::default()
        },
        track_id.into(),
        STREAM_ID.to_string(),
    ))
}

/// Degraded mode: copy RTP packets from the inbound track to a loopback
/// output track without touching payloads. Timing is preserved because the
/// packets themselves are unchanged.
pub fn spawn_rtp_forward(
    remote: Arc<TrackRemote>,
    local: Arc<TrackLocalStaticRTP>,
    connection_id: String,
) {
    tokio::spawn(async move {
        loop {
            let (packet, _) = match remote.read_rtp().await {
                Ok(read) => read,
                Err(e) => {
                    debug!(connection_id = %connection_id, "RTP forward ended: {}", e);
                    break;
                }
            };
            if let Err(e) = local.write_rtp(&packet).await {
                debug!(connection_id = %connection_id, "RTP write failed: {}", e);
                break;
            }
        }
        info!(connection_id = %connection_id, "RTP loopback stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::{PixelFormat, Resolution};

    fn frame(pts: i64) -> VideoFrame {
        VideoFrame::from_vec(
            vec![0u8; 3],
            Resolution::new(1, 1),
            PixelFormat::Bgr24,
            pts,
            TimeBase::VIDEO_90KHZ,
        )
    }

    #[test]
    fn first_frame_uses_default_duration() {
        assert_eq!(frame_duration(&frame(0), None), DEFAULT_FRAME_DURATION);
    }

    #[test]
    fn duration_follows_pts_delta() {
        let d = frame_duration(&frame(3000), Some((0, TimeBase::VIDEO_90KHZ)));
        let expected = Duration::from_secs_f64(3000.0 / 90_000.0);
        assert!((d.as_secs_f64() - expected.as_secs_f64()).abs() < 1e-9);
    }

    #[test]
    fn non_monotonic_pts_falls_back() {
        let d = frame_duration(&frame(100), Some((200, TimeBase::VIDEO_90KHZ)));
        assert_eq!(d, DEFAULT_FRAME_DURATION);
    }

    #[test]
    fn time_base_change_falls_back() {
        let d = frame_duration(&frame(3000), Some((0, TimeBase::new(1, 1000))));
        assert_eq!(d, DEFAULT_FRAME_DURATION);
    }
}
