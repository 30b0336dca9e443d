//! Test helpers and fixtures for livecast-core tests

use chrono::Utc;
use std::sync::Arc;

use crate::{
    config::StreamingConfig,
    models::{MediaKind, NewStreamSession, Transport, UserId},
    repository::MemorySessionStore,
    hls::HlsAssembler,
    service::{RecordingManager, SessionService, SessionSettings},
};

pub const BASE_URL: &str = "https://live.example.com";

/// Build an insertable peer-relay session row
pub fn new_session(owner: &str, public_id: &str) -> NewStreamSession {
    NewStreamSession {
        public_id: public_id.to_string(),
        owner_user_id: UserId::from(owner),
        title: format!("{owner}'s stream"),
        transport: Transport::PeerRelay,
        media_kind: MediaKind::Video,
        private_key: format!("key-{public_id}"),
        started_at: Utc::now(),
        overlay_image: None,
        playlist_url: None,
        cdn_publish_url: None,
    }
}

/// Streaming settings rooted in a temporary directory
pub fn streaming_config(root: &std::path::Path) -> StreamingConfig {
    StreamingConfig {
        hls_root: root.to_path_buf(),
        ..StreamingConfig::default()
    }
}

/// Assembler writing under `root`
pub fn hls_assembler(root: &std::path::Path) -> Arc<HlsAssembler> {
    let config = streaming_config(root);
    Arc::new(HlsAssembler::new(
        Arc::new(RecordingManager::new(&config)),
        &config,
        BASE_URL,
    ))
}

/// Session service over an in-memory store, with recordings under `root`
pub fn session_service(root: &std::path::Path) -> (Arc<SessionService>, MemorySessionStore) {
    let store = MemorySessionStore::new();
    let service = Arc::new(SessionService::new(
        Arc::new(store.clone()),
        hls_assembler(root),
        SessionSettings {
            base_url: BASE_URL.to_string(),
            cdn_publish_endpoint: "rtmps://cdn.example.com/live".to_string(),
        },
    ));
    (service, store)
}
