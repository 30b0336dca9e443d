use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};

use super::SessionStore;
use crate::{
    models::{NewStreamSession, StreamSession, UserId},
    Error, Result,
};

const SESSION_COLUMNS: &str = "internal_id, public_id, owner_user_id, title, transport, media_kind, \
     is_live, viewer_count, peak_viewer_count, private_key, started_at, ended_at, \
     overlay_image, playlist_url, cdn_publish_url";

/// Stream session repository backed by `PostgreSQL`
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_session(row: &PgRow) -> Result<StreamSession> {
        let transport: String = row.try_get("transport")?;
        let media_kind: String = row.try_get("media_kind")?;

        Ok(StreamSession {
            internal_id: row.try_get("internal_id")?,
            public_id: row.try_get("public_id")?,
            owner_user_id: UserId::from_string(row.try_get("owner_user_id")?),
            title: row.try_get("title")?,
            transport: transport.parse().map_err(Error::Internal)?,
            media_kind: media_kind.parse().map_err(Error::Internal)?,
            is_live: row.try_get("is_live")?,
            viewer_count: row.try_get("viewer_count")?,
            peak_viewer_count: row.try_get("peak_viewer_count")?,
            private_key: row.try_get("private_key")?,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
            overlay_image: row.try_get("overlay_image")?,
            playlist_url: row.try_get("playlist_url")?,
            cdn_publish_url: row.try_get("cdn_publish_url")?,
        })
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: NewStreamSession) -> Result<StreamSession> {
        // The partial unique index on (owner_user_id) WHERE is_live backs up
        // the one-live-session check done by the service.
        let row = sqlx::query(&format!(
            r"
            INSERT INTO stream_sessions
                (public_id, owner_user_id, title, transport, media_kind, is_live,
                 private_key, started_at, overlay_image, playlist_url, cdn_publish_url)
            VALUES ($1, $2, $3, $4, $5, TRUE, $6, $7, $8, $9, $10)
            RETURNING {SESSION_COLUMNS}
            "
        ))
        .bind(&session.public_id)
        .bind(&session.owner_user_id)
        .bind(&session.title)
        .bind(session.transport.as_str())
        .bind(session.media_kind.as_str())
        .bind(&session.private_key)
        .bind(session.started_at)
        .bind(&session.overlay_image)
        .bind(&session.playlist_url)
        .bind(&session.cdn_publish_url)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_session(&row)
    }

    async fn get(&self, internal_id: i64) -> Result<Option<StreamSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM stream_sessions WHERE internal_id = $1"
        ))
        .bind(internal_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn find_by_public_id(&self, public_id: &str) -> Result<Option<StreamSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM stream_sessions WHERE public_id = $1"
        ))
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn find_live_by_owner(&self, owner: &UserId) -> Result<Option<StreamSession>> {
        let row = sqlx::query(&format!(
            r"
            SELECT {SESSION_COLUMNS} FROM stream_sessions
            WHERE owner_user_id = $1 AND is_live
            ORDER BY started_at DESC
            LIMIT 1
            "
        ))
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn list_live(&self, limit: i64) -> Result<Vec<StreamSession>> {
        let limit = limit.clamp(1, 100);

        let rows = sqlx::query(&format!(
            r"
            SELECT {SESSION_COLUMNS} FROM stream_sessions
            WHERE is_live
            ORDER BY started_at DESC
            LIMIT $1
            "
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_session).collect()
    }

    async fn mark_ended(&self, internal_id: i64, ended_at: DateTime<Utc>) -> Result<StreamSession> {
        let row = sqlx::query(&format!(
            r"
            UPDATE stream_sessions
            SET is_live = FALSE,
                ended_at = COALESCE(ended_at, $2)
            WHERE internal_id = $1
            RETURNING {SESSION_COLUMNS}
            "
        ))
        .bind(internal_id)
        .bind(ended_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Stream session {internal_id} not found")))?;

        Self::row_to_session(&row)
    }

    async fn update_viewer_count(&self, public_id: &str, count: i64) -> Result<()> {
        sqlx::query(
            r"
            UPDATE stream_sessions
            SET viewer_count = $2,
                peak_viewer_count = GREATEST(peak_viewer_count, $2)
            WHERE public_id = $1
            ",
        )
        .bind(public_id)
        .bind(count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_private_key(&self, internal_id: i64, private_key: &str) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE stream_sessions
            SET private_key = $2
            WHERE internal_id = $1
            ",
        )
        .bind(internal_id)
        .bind(private_key)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Stream session {internal_id} not found")));
        }

        Ok(())
    }
}
