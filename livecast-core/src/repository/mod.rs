pub mod memory;
pub mod session;

pub use memory::MemorySessionStore;
pub use session::PgSessionStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    models::{NewStreamSession, StreamSession, UserId},
    Result,
};

/// Durable record of stream sessions
///
/// The row, not the signaling registry, decides whether a stream exists.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new live session; fails with `AlreadyExists` when the owner
    /// already has a live one
    async fn insert(&self, session: NewStreamSession) -> Result<StreamSession>;

    async fn get(&self, internal_id: i64) -> Result<Option<StreamSession>>;

    async fn find_by_public_id(&self, public_id: &str) -> Result<Option<StreamSession>>;

    async fn find_live_by_owner(&self, owner: &UserId) -> Result<Option<StreamSession>>;

    /// Live sessions, newest first
    async fn list_live(&self, limit: i64) -> Result<Vec<StreamSession>>;

    /// Set `is_live = false` and `ended_at`; ending twice keeps the first `ended_at`
    async fn mark_ended(&self, internal_id: i64, ended_at: DateTime<Utc>) -> Result<StreamSession>;

    /// Store the current viewer count and raise the peak if exceeded
    async fn update_viewer_count(&self, public_id: &str, count: i64) -> Result<()>;

    async fn update_private_key(&self, internal_id: i64, private_key: &str) -> Result<()>;
}
