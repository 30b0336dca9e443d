//! Stream session endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use livecast_core::{
    models::{CreateSessionRequest, CreatedSession, StreamSession},
    service::SessionService,
    signaling::RelayStats,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::http::{middleware::AuthUser, AppResult, AppState};

/// Session as returned to clients; the key is only present for its owner
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamView {
    #[serde(flatten)]
    pub session: StreamSession,
    pub share_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

impl StreamView {
    fn new(state: &AppState, session: StreamSession, viewer: Option<&AuthUser>) -> Self {
        let private_key = viewer
            .filter(|user| session.is_owned_by(&user.user_id))
            .map(|_| session.private_key.clone());
        Self {
            share_url: state.sessions.share_url(&session.public_id),
            session,
            private_key,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRequest {
    pub private_key: String,
}

#[derive(Debug, Serialize)]
pub struct KeyCheckResponse {
    pub valid: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotatedKeyResponse {
    pub private_key: String,
}

/// POST /api/streams
pub async fn create_stream(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<CreateSessionRequest>,
) -> AppResult<(StatusCode, Json<CreatedSession>)> {
    let created = state.sessions.create_session(&auth.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/streams/live
pub async fn list_live(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<StreamView>>> {
    let sessions = state.sessions.list_live(query.limit.unwrap_or(20)).await?;
    Ok(Json(
        sessions
            .into_iter()
            .map(|session| StreamView::new(&state, session, None))
            .collect(),
    ))
}

/// GET /api/streams/stats
pub async fn relay_stats(State(state): State<AppState>) -> Json<RelayStats> {
    Json(state.relay.stats())
}

/// GET /api/streams/{id}, by internal or public id
pub async fn get_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: Option<AuthUser>,
) -> AppResult<Json<StreamView>> {
    let session = state.sessions.resolve(&id).await?;
    Ok(Json(StreamView::new(&state, session, auth.as_ref())))
}

/// POST /api/streams/{id}/end
///
/// Ends the durable session whether or not anyone is connected, then tells
/// connected peers.
pub async fn end_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthUser,
) -> AppResult<Json<StreamView>> {
    let session = state.sessions.resolve(&id).await?;
    SessionService::ensure_owner(&session, &auth.user_id)?;

    let ended = state.sessions.end_session(session.internal_id).await?;
    state.relay.close_stream(&ended.public_id);
    state.sessions.record_viewer_count(&ended.public_id, 0).await;
    info!(public_id = %ended.public_id, owner = %auth.user_id, "Stream ended over HTTP");

    Ok(Json(StreamView::new(&state, ended, Some(&auth))))
}

/// POST /api/streams/{id}/key/verify
pub async fn verify_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<KeyRequest>,
) -> AppResult<Json<KeyCheckResponse>> {
    let valid = state.sessions.verify_key(&id, &request.private_key).await?;
    Ok(Json(KeyCheckResponse { valid }))
}

/// POST /api/keys/validate, against the caller's own live session
pub async fn validate_key(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<KeyRequest>,
) -> AppResult<Json<KeyCheckResponse>> {
    let valid = state
        .sessions
        .validate_key(&request.private_key, &auth.user_id)
        .await?;
    Ok(Json(KeyCheckResponse { valid }))
}

/// POST /api/streams/{id}/key/rotate
pub async fn rotate_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthUser,
) -> AppResult<Json<RotatedKeyResponse>> {
    let session = state.sessions.resolve(&id).await?;
    SessionService::ensure_owner(&session, &auth.user_id)?;

    let private_key = state.sessions.rotate_key(session.internal_id).await?;
    Ok(Json(RotatedKeyResponse { private_key }))
}
