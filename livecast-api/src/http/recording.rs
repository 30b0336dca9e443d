//! Segment upload and recording retention endpoints

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use bytes::Bytes;
use livecast_core::{
    hls::IngestedSegment,
    models::{HlsRecording, StreamSession, Transport},
    service::SessionService,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::http::{middleware::AuthUser, AppError, AppResult, AppState};

/// Optional uploader-side sequence number of a segment
pub const SEGMENT_SEQUENCE_HEADER: &str = "x-segment-sequence";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub save_permanently: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    pub show_save_prompt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary_url: Option<String>,
}

async fn owned_session(state: &AppState, id: &str, auth: &AuthUser) -> AppResult<StreamSession> {
    let session = state.sessions.resolve(id).await?;
    SessionService::ensure_owner(&session, &auth.user_id)?;
    Ok(session)
}

/// POST /api/streams/{id}/segments
pub async fn upload_segment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthUser,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(StatusCode, Json<IngestedSegment>)> {
    let session = owned_session(&state, &id, &auth).await?;
    if session.transport != Transport::SegmentedPull {
        return Err(AppError::bad_request("Stream does not use segmented pull"));
    }
    if !session.is_live {
        return Err(AppError::bad_request("Stream has ended"));
    }

    let sequence_hint = headers
        .get(SEGMENT_SEQUENCE_HEADER)
        .map(|value| {
            value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .ok_or_else(|| AppError::bad_request("Invalid segment sequence header"))
        })
        .transpose()?;

    let segment = state
        .hls
        .ingest_segment(&session.public_id, &auth.user_id, sequence_hint, body)
        .await?;
    Ok((StatusCode::CREATED, Json(segment)))
}

/// GET /api/streams/{id}/recording
pub async fn get_recording(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthUser,
) -> AppResult<Json<HlsRecording>> {
    let session = owned_session(&state, &id, &auth).await?;
    match state.recordings.get(&session.public_id).await {
        Some(recording) => Ok(Json(recording)),
        None if state.recordings.was_expired(&session.public_id) => {
            Err(AppError::gone("Recording has expired"))
        }
        None => Err(AppError::not_found("No recording for this stream")),
    }
}

/// POST /api/streams/{id}/recording/finalize
///
/// Saving promotes the recording; declining leaves it temporary until it
/// expires, and the owner gets the temporary playlist URL back.
pub async fn finalize_recording(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthUser,
    Json(request): Json<FinalizeRequest>,
) -> AppResult<Json<FinalizeResponse>> {
    let session = owned_session(&state, &id, &auth).await?;

    if request.save_permanently {
        if !state.recordings.finalize(&session.public_id, true).await? {
            return Err(AppError::not_found("No recording for this stream"));
        }
        info!(public_id = %session.public_id, "Recording kept permanently");
        return Ok(Json(FinalizeResponse {
            show_save_prompt: false,
            temporary_url: None,
        }));
    }

    if state.recordings.get(&session.public_id).await.is_none() {
        return Err(AppError::not_found("No recording for this stream"));
    }
    Ok(Json(FinalizeResponse {
        show_save_prompt: true,
        temporary_url: Some(state.hls.playlist_url(&session.public_id)),
    }))
}

/// DELETE /api/streams/{id}/recording
pub async fn discard_recording(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthUser,
) -> AppResult<StatusCode> {
    let session = owned_session(&state, &id, &auth).await?;
    if state.recordings.finalize(&session.public_id, false).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("No recording for this stream"))
    }
}
