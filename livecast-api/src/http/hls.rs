//! HLS playlist and segment serving

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use livecast_core::hls::PLAYLIST_CONTENT_TYPE;

use crate::http::{AppResult, AppState};

/// GET /hls/{id}/{file}
pub async fn serve_file(
    State(state): State<AppState>,
    Path((id, file)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    let file = state.hls.read(&id, &file).await?;

    // The playlist changes with every segment; segments never change
    let cache_control = if file.content_type == PLAYLIST_CONTENT_TYPE {
        "no-cache"
    } else {
        "public, max-age=3600"
    };

    Ok((
        [
            (header::CONTENT_TYPE, file.content_type),
            (header::CACHE_CONTROL, cache_control),
        ],
        file.data,
    ))
}
