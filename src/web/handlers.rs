//! Request handlers for the signaling endpoint and the index page

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::webrtc::{LifecycleHooks, PeerSession, SessionDescription};

/// `GET /` — the demo page, read from disk on every request
pub async fn index(State(state): State<Arc<AppState>>) -> Result<Response> {
    let path = state.config.index_path();
    let html = tokio::fs::read(&path)
        .await
        .map_err(|e| AppError::NotFound(format!("{}: {}", path.display(), e)))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
        .into_response())
}

/// `POST /offer` — negotiate one peer connection and return the answer
pub async fn offer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionDescription>,
) -> Result<Json<SessionDescription>> {
    if !req.is_offer() {
        return Err(AppError::BadRequest(format!(
            "Expected session type \"offer\", got \"{}\"",
            req.sdp_type
        )));
    }

    let codec_mime = state.codec.as_ref().map(|factory| factory.mime_type());
    let session = PeerSession::new(&state.config.webrtc, codec_mime.as_deref()).await?;
    let connection_id = session.connection_id.clone();
    let pc = session.pc();

    state.registry.add(&connection_id, pc.clone()).await;

    match negotiate(&state, &session, req).await {
        Ok(answer) => {
            info!(connection_id = %connection_id, "Offer handled");
            Ok(Json(answer))
        }
        Err(e) => {
            // Negotiation failed: the connection must not leak from the registry
            if let Some(pc) = state.registry.discard(&connection_id).await {
                let _ = pc.close().await;
            }
            Err(e)
        }
    }
}

async fn negotiate(
    state: &AppState,
    session: &PeerSession,
    offer: SessionDescription,
) -> Result<SessionDescription> {
    let outbound = session
        .add_outbound_video(state.codec.clone(), state.detector.clone())
        .await?;

    let hooks = LifecycleHooks::new(
        &session.connection_id,
        state.registry.clone(),
        outbound,
    );
    hooks.register(&session.pc());

    session.handle_offer(offer).await
}
