// In-memory SessionStore for single-node deployments without PostgreSQL and for tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::SessionStore;
use crate::{
    models::{NewStreamSession, StreamSession, UserId},
    Error, Result,
};

#[derive(Default)]
struct Inner {
    next_id: i64,
    sessions: HashMap<i64, StreamSession>,
}

/// Session store keeping every row in process memory
///
/// Rows are lost on restart, which matches the registry's own lifetime.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: NewStreamSession) -> Result<StreamSession> {
        let mut inner = self.inner.write();

        if inner
            .sessions
            .values()
            .any(|s| s.is_live && s.owner_user_id == session.owner_user_id)
        {
            return Err(Error::AlreadyExists("Owner already has a live session".to_string()));
        }
        if inner.sessions.values().any(|s| s.public_id == session.public_id) {
            return Err(Error::AlreadyExists("Public id already in use".to_string()));
        }

        inner.next_id += 1;
        let session = session.into_session(inner.next_id);
        inner.sessions.insert(session.internal_id, session.clone());

        Ok(session)
    }

    async fn get(&self, internal_id: i64) -> Result<Option<StreamSession>> {
        Ok(self.inner.read().sessions.get(&internal_id).cloned())
    }

    async fn find_by_public_id(&self, public_id: &str) -> Result<Option<StreamSession>> {
        Ok(self
            .inner
            .read()
            .sessions
            .values()
            .find(|s| s.public_id == public_id)
            .cloned())
    }

    async fn find_live_by_owner(&self, owner: &UserId) -> Result<Option<StreamSession>> {
        Ok(self
            .inner
            .read()
            .sessions
            .values()
            .find(|s| s.is_live && &s.owner_user_id == owner)
            .cloned())
    }

    async fn list_live(&self, limit: i64) -> Result<Vec<StreamSession>> {
        let limit = usize::try_from(limit.clamp(1, 100)).unwrap_or(100);

        let mut live: Vec<StreamSession> = self
            .inner
            .read()
            .sessions
            .values()
            .filter(|s| s.is_live)
            .cloned()
            .collect();
        live.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        live.truncate(limit);

        Ok(live)
    }

    async fn mark_ended(&self, internal_id: i64, ended_at: DateTime<Utc>) -> Result<StreamSession> {
        let mut inner = self.inner.write();
        let session = inner
            .sessions
            .get_mut(&internal_id)
            .ok_or_else(|| Error::NotFound(format!("Stream session {internal_id} not found")))?;

        session.is_live = false;
        session.ended_at.get_or_insert(ended_at);

        Ok(session.clone())
    }

    async fn update_viewer_count(&self, public_id: &str, count: i64) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(session) = inner.sessions.values_mut().find(|s| s.public_id == public_id) {
            session.viewer_count = count;
            session.peak_viewer_count = session.peak_viewer_count.max(count);
        }
        Ok(())
    }

    async fn update_private_key(&self, internal_id: i64, private_key: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let session = inner
            .sessions
            .get_mut(&internal_id)
            .ok_or_else(|| Error::NotFound(format!("Stream session {internal_id} not found")))?;
        session.private_key = private_key.to_string();
        Ok(())
    }
}
