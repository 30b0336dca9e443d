//! Health check endpoint

use axum::{response::IntoResponse, routing::get, Router};

use crate::http::AppState;

pub fn create_health_router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Always `OK` while the server is running
pub async fn health_check() -> impl IntoResponse {
    "OK"
}
