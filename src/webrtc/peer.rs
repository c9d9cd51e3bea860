//! Peer connection setup, lifecycle hooks and offer negotiation

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCPFeedback;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use super::codec::CodecFactory;
use super::config::WebRtcConfig;
use super::registry::ConnectionRegistry;
use super::signaling::{ConnectionState, SessionDescription};
use super::track::{loopback_track, OutboundVideo, ProcessedVideoTrack};
use crate::detect::Detector;
use crate::error::{AppError, Result};

/// One peer connection being negotiated and served
pub struct PeerSession {
    /// Connection id, used as the registry key
    pub connection_id: String,
    pc: Arc<RTCPeerConnection>,
}

impl PeerSession {
    /// Create a new peer connection from the WebRTC configuration.
    ///
    /// `codec_mime` is the mime type of the configured codec factory, if
    /// any; negotiation is then restricted to that codec so the inbound
    /// track is something the decoder understands.
    pub async fn new(config: &WebRtcConfig, codec_mime: Option<&str>) -> Result<Self> {
        let mut media_engine = build_media_engine(codec_mime)?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| AppError::WebRtc(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let mut ice_servers = vec![];
        for stun_url in &config.stun_servers {
            ice_servers.push(RTCIceServer {
                urls: vec![stun_url.clone()],
                ..Default::default()
            });
        }
        for turn in &config.turn_servers {
            ice_servers.push(RTCIceServer {
                urls: turn.urls.clone(),
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            });
        }

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = api
            .new_peer_connection(rtc_config)
            .await
            .map_err(|e| AppError::WebRtc(format!("Failed to create peer connection: {}", e)))?;

        let connection_id = uuid::Uuid::new_v4().to_string();
        info!(connection_id = %connection_id, "Peer connection created");

        Ok(Self {
            connection_id,
            pc: Arc::new(pc),
        })
    }

    /// Handle to the underlying connection
    pub fn pc(&self) -> Arc<RTCPeerConnection> {
        self.pc.clone()
    }

    /// Add the outbound video track before negotiation so it appears in the
    /// answer SDP. Returns the wiring the track-arrival hook later attaches
    /// to the inbound track.
    pub async fn add_outbound_video(
        &self,
        factory: Option<Arc<dyn CodecFactory>>,
        detector: Option<Arc<dyn Detector>>,
    ) -> Result<OutboundVideo> {
        let outbound = match factory {
            Some(factory) => {
                let track = ProcessedVideoTrack::new(factory.as_ref(), "video-processed");
                let sender = self
                    .pc
                    .add_track(track.local_track() as Arc<dyn TrackLocal + Send + Sync>)
                    .await?;
                spawn_rtcp_drain(sender);
                OutboundVideo::Processed {
                    track,
                    factory,
                    detector,
                }
            }
            None => {
                let local = loopback_track(MIME_TYPE_VP8, "video-loopback");
                let sender = self
                    .pc
                    .add_track(local.clone() as Arc<dyn TrackLocal + Send + Sync>)
                    .await?;
                spawn_rtcp_drain(sender);
                OutboundVideo::Loopback(local)
            }
        };

        debug!(connection_id = %self.connection_id, "Outbound video track added");
        Ok(outbound)
    }

    /// Negotiate: apply the remote offer, produce a local answer and wait
    /// for ICE gathering so the returned SDP is self-contained.
    pub async fn handle_offer(&self, offer: SessionDescription) -> Result<SessionDescription> {
        let sdp = RTCSessionDescription::offer(offer.sdp)
            .map_err(|e| AppError::BadRequest(format!("Invalid SDP offer: {}", e)))?;

        self.pc
            .set_remote_description(sdp)
            .await
            .map_err(|e| AppError::WebRtc(format!("Failed to set remote description: {}", e)))?;

        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| AppError::WebRtc(format!("Failed to create answer: {}", e)))?;

        let mut gather_complete = self.pc.gathering_complete_promise().await;

        self.pc
            .set_local_description(answer)
            .await
            .map_err(|e| AppError::WebRtc(format!("Failed to set local description: {}", e)))?;

        let _ = gather_complete.recv().await;

        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| AppError::WebRtc("No local description after negotiation".to_string()))?;

        info!(connection_id = %self.connection_id, "Answer created");
        Ok(SessionDescription {
            sdp: local.sdp,
            sdp_type: local.sdp_type.to_string(),
        })
    }
}

/// Assemble the media engine for one connection.
///
/// With no codec configured every default codec is offered and the loopback
/// path forwards whatever the browser picked. With a codec factory the
/// video section is narrowed to that codec alone, which forces the browser
/// to send it.
fn build_media_engine(codec_mime: Option<&str>) -> Result<MediaEngine> {
    let mut media_engine = MediaEngine::default();

    let Some(mime) = codec_mime else {
        media_engine
            .register_default_codecs()
            .map_err(|e| AppError::WebRtc(format!("Failed to register codecs: {}", e)))?;
        return Ok(media_engine);
    };

    if !mime.eq_ignore_ascii_case(MIME_TYPE_H264) {
        return Err(AppError::WebRtc(format!(
            "No negotiation profile for codec {}",
            mime
        )));
    }

    media_engine
        .register_codec(
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_owned(),
                    clock_rate: 48_000,
                    channels: 2,
                    sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                    rtcp_feedback: vec![],
                },
                payload_type: 111,
                ..Default::default()
            },
            RTPCodecType::Audio,
        )
        .map_err(|e| AppError::WebRtc(format!("Failed to register Opus codec: {}", e)))?;

    let video_rtcp_feedback = vec![
        RTCPFeedback {
            typ: "goog-remb".to_owned(),
            parameter: "".to_owned(),
        },
        RTCPFeedback {
            typ: "ccm".to_owned(),
            parameter: "fir".to_owned(),
        },
        RTCPFeedback {
            typ: "nack".to_owned(),
            parameter: "".to_owned(),
        },
        RTCPFeedback {
            typ: "nack".to_owned(),
            parameter: "pli".to_owned(),
        },
    ];

    // Baseline profiles browsers commonly offer
    for (fmtp, payload_type) in [
        (
            "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42001f",
            102u8,
        ),
        (
            "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f",
            108u8,
        ),
    ] {
        media_engine
            .register_codec(
                RTCRtpCodecParameters {
                    capability: RTCRtpCodecCapability {
                        mime_type: MIME_TYPE_H264.to_owned(),
                        clock_rate: 90_000,
                        channels: 0,
                        sdp_fmtp_line: fmtp.to_owned(),
                        rtcp_feedback: video_rtcp_feedback.clone(),
                    },
                    payload_type,
                    ..Default::default()
                },
                RTPCodecType::Video,
            )
            .map_err(|e| AppError::WebRtc(format!("Failed to register H264 codec: {}", e)))?;
    }

    Ok(media_engine)
}

/// Reads RTCP reports from a sender so the interceptors keep running
fn spawn_rtcp_drain(sender: Arc<RTCRtpSender>) {
    tokio::spawn(async move {
        let mut rtcp_buf = vec![0u8; 1500];
        while let Ok((_, _)) = sender.read(&mut rtcp_buf).await {}
    });
}

/// Reactive callbacks registered against one peer connection.
///
/// Holds the connection identity and its collaborators as explicit state
/// instead of capturing them ad hoc in closures. The connection's own event
/// dispatch invokes the hooks; nothing here drives them.
pub struct LifecycleHooks {
    connection_id: String,
    registry: Arc<ConnectionRegistry>,
    outbound: Arc<Mutex<Option<OutboundVideo>>>,
}

impl LifecycleHooks {
    pub fn new(
        connection_id: impl Into<String>,
        registry: Arc<ConnectionRegistry>,
        outbound: OutboundVideo,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            registry,
            outbound: Arc::new(Mutex::new(Some(outbound))),
        }
    }

    /// Register both hooks on the connection
    pub fn register(&self, pc: &Arc<RTCPeerConnection>) {
        self.register_state_hook(pc);
        self.register_track_hook(pc);
    }

    /// State-change hook: log every transition; on `failed`, close the
    /// connection and remove it from the registry. `discard` yields the
    /// handle at most once, so the close cannot run twice.
    fn register_state_hook(&self, pc: &Arc<RTCPeerConnection>) {
        let connection_id = self.connection_id.clone();
        let registry = self.registry.clone();

        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            let connection_id = connection_id.clone();
            let registry = registry.clone();
            let state = ConnectionState::from(s);

            Box::pin(async move {
                info!(connection_id = %connection_id, state = %state, "Connection state changed");

                if state == ConnectionState::Failed {
                    if let Some(pc) = registry.discard(&connection_id).await {
                        if let Err(e) = pc.close().await {
                            warn!(connection_id = %connection_id, "Close after failure: {}", e);
                        }
                        info!(connection_id = %connection_id, "Failed connection closed and deregistered");
                    }
                }
            })
        }));
    }

    /// Track-arrival hook: the first inbound video track claims the
    /// outbound wiring; audio and any further tracks are ignored.
    fn register_track_hook(&self, pc: &Arc<RTCPeerConnection>) {
        let connection_id = self.connection_id.clone();
        let outbound = self.outbound.clone();

        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>, _receiver, _transceiver| {
                let connection_id = connection_id.clone();
                let outbound = outbound.clone();

                Box::pin(async move {
                    let kind = track.kind();
                    info!(
                        connection_id = %connection_id,
                        kind = %kind,
                        codec = %track.codec().capability.mime_type,
                        "Track received"
                    );

                    if kind != RTPCodecType::Video {
                        return;
                    }

                    match outbound.lock().await.take() {
                        Some(wiring) => wiring.attach(track, connection_id),
                        None => {
                            debug!(connection_id = %connection_id, "Outbound video already attached, ignoring extra track");
                        }
                    }
                })
            },
        ));
    }
}
