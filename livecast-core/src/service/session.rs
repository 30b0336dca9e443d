//! Session lifecycle and private key issuance
//!
//! The durable row is the source of truth for whether a stream exists and is
//! live. The signaling registry only tracks who is currently connected.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::keys::{decode_key_owner, mint_private_key};
use crate::{
    hls::HlsAssembler,
    models::{
        generate_public_id, CreateSessionRequest, CreatedSession, MediaKind, NewStreamSession,
        StreamSession, Transport, UserId,
    },
    repository::SessionStore,
    Error, Result,
};

const MAX_TITLE_CHARS: usize = 200;

/// Deployment values needed to build client-facing URLs
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub base_url: String,
    pub cdn_publish_endpoint: String,
}

pub struct SessionService {
    store: Arc<dyn SessionStore>,
    hls: Arc<HlsAssembler>,
    settings: SessionSettings,
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SessionService {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, hls: Arc<HlsAssembler>, settings: SessionSettings) -> Self {
        Self {
            store,
            hls,
            settings: SessionSettings {
                base_url: settings.base_url.trim_end_matches('/').to_string(),
                cdn_publish_endpoint: settings.cdn_publish_endpoint.trim_end_matches('/').to_string(),
            },
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    #[must_use]
    pub fn share_url(&self, public_id: &str) -> String {
        format!("{}/watch/{public_id}", self.settings.base_url)
    }

    /// Start a new live session for `owner`
    ///
    /// An owner may have at most one live session. The row is written with
    /// `is_live = true` before any host connects.
    pub async fn create_session(&self, owner: &UserId, request: CreateSessionRequest) -> Result<CreatedSession> {
        let title = request.title.trim();
        if title.is_empty() || title.chars().count() > MAX_TITLE_CHARS {
            return Err(Error::InvalidInput(format!(
                "Title must be between 1 and {MAX_TITLE_CHARS} characters"
            )));
        }
        if request.overlay_image.is_some() && request.media_kind != MediaKind::Audio {
            return Err(Error::InvalidInput(
                "Overlay images are only supported for audio streams".to_string(),
            ));
        }

        if let Some(existing) = self.store.find_live_by_owner(owner).await? {
            warn!(owner = %owner, public_id = %existing.public_id, "Refusing second live session");
            return Err(Error::AlreadyExists(format!(
                "Already live with stream {}",
                existing.public_id
            )));
        }

        let public_id = generate_public_id();
        let private_key = mint_private_key(owner);
        let (playlist_url, cdn_publish_url) = match request.transport {
            Transport::PeerRelay => (None, None),
            Transport::SegmentedPull => (Some(self.hls.playlist_url(&public_id)), None),
            Transport::CdnRelay => (
                None,
                Some(format!("{}/{public_id}", self.settings.cdn_publish_endpoint)),
            ),
        };

        let session = self
            .store
            .insert(NewStreamSession {
                public_id,
                owner_user_id: owner.clone(),
                title: title.to_string(),
                transport: request.transport,
                media_kind: request.media_kind,
                private_key,
                started_at: Utc::now(),
                overlay_image: request.overlay_image,
                playlist_url,
                cdn_publish_url,
            })
            .await?;

        info!(
            internal_id = session.internal_id,
            public_id = %session.public_id,
            owner = %owner,
            transport = session.transport.as_str(),
            "Stream session created"
        );

        Ok(CreatedSession {
            internal_id: session.internal_id,
            share_url: self.share_url(&session.public_id),
            public_id: session.public_id,
            private_key: session.private_key,
            playlist_url: session.playlist_url,
            cdn_publish_url: session.cdn_publish_url,
        })
    }

    pub async fn get(&self, internal_id: i64) -> Result<StreamSession> {
        self.store
            .get(internal_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Stream session {internal_id} not found")))
    }

    pub async fn find_by_public_id(&self, public_id: &str) -> Result<Option<StreamSession>> {
        self.store.find_by_public_id(public_id).await
    }

    /// Look up a session by internal id (all digits) or public id
    pub async fn resolve(&self, id: &str) -> Result<StreamSession> {
        if let Ok(internal_id) = id.parse::<i64>() {
            if let Some(session) = self.store.get(internal_id).await? {
                return Ok(session);
            }
        }
        self.store
            .find_by_public_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Stream {id} not found")))
    }

    /// Reject callers that do not own `session`
    pub fn ensure_owner(session: &StreamSession, user: &UserId) -> Result<()> {
        if session.is_owned_by(user) {
            Ok(())
        } else {
            Err(Error::Authorization("Not the owner of this stream".to_string()))
        }
    }

    /// Persist `is_live = false` and `ended_at`; works without any registry entry
    pub async fn end_session(&self, internal_id: i64) -> Result<StreamSession> {
        let session = self.store.mark_ended(internal_id, Utc::now()).await?;

        if session.transport == Transport::SegmentedPull {
            if let Err(e) = self.hls.complete(&session.public_id).await {
                error!(public_id = %session.public_id, error = %e, "Failed to complete recording");
            }
        }

        info!(internal_id, public_id = %session.public_id, "Stream session ended");
        Ok(session)
    }

    /// End by public id; `None` when the store has no such session
    pub async fn end_by_public_id(&self, public_id: &str) -> Result<Option<StreamSession>> {
        match self.store.find_by_public_id(public_id).await? {
            Some(session) if session.is_live => self.end_session(session.internal_id).await.map(Some),
            Some(session) => Ok(Some(session)),
            None => Ok(None),
        }
    }

    /// Exact match against the stored key, or a well-formed key whose
    /// decoded owner equals `claimed_owner`
    #[must_use]
    pub fn key_matches(session: &StreamSession, provided: &str, claimed_owner: &UserId) -> bool {
        if !session.private_key.is_empty() && provided == session.private_key {
            return true;
        }
        session.is_owned_by(claimed_owner)
            && decode_key_owner(provided).is_some_and(|owner| &owner == claimed_owner)
    }

    /// Check a key presented by a reconnecting broadcaster against their live session
    pub async fn validate_key(&self, provided: &str, claimed_owner: &UserId) -> Result<bool> {
        let Some(session) = self.store.find_live_by_owner(claimed_owner).await? else {
            return Ok(false);
        };
        Ok(Self::key_matches(&session, provided, claimed_owner))
    }

    /// Check a key against a specific session's owner
    pub async fn verify_key(&self, id: &str, provided: &str) -> Result<bool> {
        let session = self.resolve(id).await?;
        let valid = Self::key_matches(&session, provided, &session.owner_user_id);
        if !valid {
            warn!(public_id = %session.public_id, "Private key verification failed");
        }
        Ok(valid)
    }

    /// Mint and store a replacement key; older keys keep passing the owner check
    pub async fn rotate_key(&self, internal_id: i64) -> Result<String> {
        let session = self.get(internal_id).await?;
        let key = mint_private_key(&session.owner_user_id);
        self.store.update_private_key(internal_id, &key).await?;

        info!(internal_id, public_id = %session.public_id, "Private key rotated");
        Ok(key)
    }

    /// Persist the current audience size; failures are only logged
    pub async fn record_viewer_count(&self, public_id: &str, count: usize) {
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        if let Err(e) = self.store.update_viewer_count(public_id, count).await {
            error!(public_id = %public_id, error = %e, "Failed to persist viewer count");
        }
    }

    pub async fn list_live(&self, limit: i64) -> Result<Vec<StreamSession>> {
        self.store.list_live(limit).await
    }
}
