//! Service construction and dependency injection

use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    hls::HlsAssembler,
    repository::{MemorySessionStore, PgSessionStore, SessionStore},
    service::{RecordingManager, SessionService, SessionSettings},
    signaling::SignalingRelay,
    Config,
};

/// Shared services handed to the HTTP layer
#[derive(Clone)]
pub struct Services {
    pub sessions: Arc<SessionService>,
    pub relay: Arc<SignalingRelay>,
    pub hls: Arc<HlsAssembler>,
    pub recordings: Arc<RecordingManager>,
}

/// Build every service; `pool = None` selects the in-memory session store
pub fn init_services(pool: Option<PgPool>, config: &Config) -> Services {
    let store: Arc<dyn SessionStore> = if let Some(pool) = pool {
        info!("Using PostgreSQL session store");
        Arc::new(PgSessionStore::new(pool))
    } else {
        warn!("No database configured, sessions are kept in memory only");
        Arc::new(MemorySessionStore::new())
    };

    let recordings = Arc::new(RecordingManager::new(&config.streaming));
    info!(root = %recordings.root().display(), "Recording storage ready");

    let hls = Arc::new(HlsAssembler::new(
        recordings.clone(),
        &config.streaming,
        config.base_url(),
    ));

    let sessions = Arc::new(SessionService::new(
        store,
        hls.clone(),
        SessionSettings {
            base_url: config.base_url().to_string(),
            cdn_publish_endpoint: config.cdn.publish_endpoint.clone(),
        },
    ));

    let relay = Arc::new(SignalingRelay::new(
        sessions.clone(),
        config.signaling.outbound_buffer,
    ));

    info!("Services initialized");
    Services {
        sessions,
        relay,
        hls,
        recordings,
    }
}
