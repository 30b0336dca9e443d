// Module: http
// REST endpoints, HLS file serving and the signaling WebSocket

pub mod error;
pub mod health;
pub mod hls;
pub mod middleware;
pub mod recording;
pub mod stream;
pub mod websocket;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use livecast_core::{
    bootstrap::Services,
    hls::HlsAssembler,
    service::{RecordingManager, SessionService},
    signaling::SignalingRelay,
    Config,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionService>,
    pub relay: Arc<SignalingRelay>,
    pub hls: Arc<HlsAssembler>,
    pub recordings: Arc<RecordingManager>,
    pub config: Arc<Config>,
}

impl AppState {
    #[must_use]
    pub fn new(services: Services, config: Arc<Config>) -> Self {
        Self {
            sessions: services.sessions,
            relay: services.relay,
            hls: services.hls,
            recordings: services.recordings,
            config,
        }
    }
}

/// Build the full HTTP router
pub fn create_router(state: AppState) -> Router {
    let segment_limit = DefaultBodyLimit::max(state.config.streaming.max_segment_bytes);

    Router::new()
        .merge(health::create_health_router())
        // Sessions
        .route("/api/streams", post(stream::create_stream))
        .route("/api/streams/live", get(stream::list_live))
        .route("/api/streams/stats", get(stream::relay_stats))
        .route("/api/streams/{id}", get(stream::get_stream))
        .route("/api/streams/{id}/end", post(stream::end_stream))
        // Keys
        .route("/api/streams/{id}/key/verify", post(stream::verify_key))
        .route("/api/streams/{id}/key/rotate", post(stream::rotate_key))
        .route("/api/keys/validate", post(stream::validate_key))
        // Segmented pull
        .route(
            "/api/streams/{id}/segments",
            post(recording::upload_segment).layer(segment_limit),
        )
        .route(
            "/api/streams/{id}/recording",
            get(recording::get_recording).delete(recording::discard_recording),
        )
        .route(
            "/api/streams/{id}/recording/finalize",
            post(recording::finalize_recording),
        )
        .route("/hls/{id}/{file}", get(hls::serve_file))
        // Signaling
        .route("/ws", get(websocket::websocket_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
