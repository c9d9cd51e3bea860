//! End-to-end tests for the HTTP layer: index page and offer negotiation

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use rtc_vision::config::AppConfig;
use rtc_vision::state::AppState;
use rtc_vision::web::create_router;
use rtc_vision::webrtc::{H264CodecFactory, SessionDescription};

use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

fn test_state(static_dir: &std::path::Path) -> Arc<AppState> {
    let config = AppConfig {
        static_dir: static_dir.to_path_buf(),
        ..Default::default()
    };
    AppState::new(config, None, None)
}

/// Build a browser-like SDP offer with one outgoing video track
async fn client_video_offer() -> (
    Arc<webrtc::peer_connection::RTCPeerConnection>,
    SessionDescription,
) {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs().unwrap();
    let api = APIBuilder::new().with_media_engine(media_engine).build();

    let pc = Arc::new(
        api.new_peer_connection(RTCConfiguration::default())
            .await
            .unwrap(),
    );

    let track = Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_string(),
            clock_rate: 90_000,
            ..Default::default()
        },
        "client-video".to_string(),
        "client-stream".to_string(),
    ));
    pc.add_track(track as Arc<dyn TrackLocal + Send + Sync>)
        .await
        .unwrap();

    let offer = pc.create_offer(None).await.unwrap();
    let mut gather_complete = pc.gathering_complete_promise().await;
    pc.set_local_description(offer).await.unwrap();
    let _ = gather_complete.recv().await;

    let local = pc.local_description().await.unwrap();
    (pc, SessionDescription::offer(local.sdp))
}

#[tokio::test]
async fn index_serves_on_disk_file_byte_for_byte() {
    let dir = tempfile::tempdir().unwrap();
    let html = b"<!DOCTYPE html><html><body>rtc-vision test page</body></html>";
    std::fs::write(dir.path().join("index.html"), html).unwrap();

    let app = create_router(test_state(dir.path()));
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/html"));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], html);
}

#[tokio::test]
async fn index_missing_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_router(test_state(dir.path()));

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn static_mount_serves_files_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("client.js"), b"console.log('hi');").unwrap();

    let app = create_router(test_state(dir.path()));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/static/client.js")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"console.log('hi');");
}

#[tokio::test]
async fn offer_returns_answer_and_registers_connection() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let app = create_router(state.clone());

    let (_client_pc, offer) = client_video_offer().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/offer")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&offer).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let answer: SessionDescription = serde_json::from_slice(&body).unwrap();

    assert_eq!(answer.sdp_type, "answer");
    assert!(!answer.sdp.is_empty());
    assert_eq!(state.registry.len().await, 1);
}

#[tokio::test]
async fn offer_with_codec_negotiates_h264() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig {
        static_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let state = AppState::new(config, None, Some(Arc::new(H264CodecFactory)));
    let app = create_router(state.clone());

    let (_client_pc, offer) = client_video_offer().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/offer")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&offer).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let answer: SessionDescription = serde_json::from_slice(&body).unwrap();

    assert_eq!(answer.sdp_type, "answer");
    // The media engine is narrowed to H.264 when a codec is configured
    assert!(answer.sdp.contains("H264"));
    assert_eq!(state.registry.len().await, 1);
}

#[tokio::test]
async fn offer_with_wrong_type_tag_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let app = create_router(state.clone());

    let req = SessionDescription::answer("v=0\r\n");
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/offer")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&req).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(state.registry.is_empty().await);
}

#[tokio::test]
async fn malformed_sdp_does_not_leak_a_connection() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let app = create_router(state.clone());

    let req = SessionDescription::offer("this is not sdp");
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/offer")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&req).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_ne!(response.status(), StatusCode::OK);
    assert!(state.registry.is_empty().await);
}

#[tokio::test]
async fn shutdown_closes_all_negotiated_connections() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    for _ in 0..3 {
        let app = create_router(state.clone());
        let (_client_pc, offer) = client_video_offer().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/offer")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::to_vec(&offer).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(state.registry.len().await, 3);
    state.registry.close_all().await;
    assert!(state.registry.is_empty().await);
}
