//! Recording retention
//!
//! Every HLS recording starts temporary with a time-to-live. The owner either
//! promotes it to permanent (metadata only, files stay where they are) or it
//! is discarded, removing the whole per-stream directory.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::StreamingConfig,
    models::{HlsRecording, UserId},
    Result,
};

/// Shared handle to one recording; writers of the same stream serialize on it
pub type RecordingSlot = Arc<Mutex<HlsRecording>>;

pub const PLAYLIST_FILE: &str = "playlist.m3u8";

pub struct RecordingManager {
    root: PathBuf,
    ttl: chrono::Duration,
    recordings: DashMap<String, RecordingSlot>,
    /// Ids removed by the expiry sweep, with the time they were swept
    expired: DashMap<String, DateTime<Utc>>,
}

impl std::fmt::Debug for RecordingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingManager")
            .field("root", &self.root)
            .field("ttl", &self.ttl)
            .field("recordings", &self.recordings.len())
            .field("expired", &self.expired.len())
            .finish()
    }
}

impl RecordingManager {
    #[must_use]
    pub fn new(config: &StreamingConfig) -> Self {
        Self {
            root: config.hls_root.clone(),
            ttl: config.retention(),
            recordings: DashMap::new(),
            expired: DashMap::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn stream_dir(&self, stream_id: &str) -> PathBuf {
        self.root.join(stream_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.recordings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recordings.is_empty()
    }

    pub(crate) fn slot(&self, stream_id: &str) -> Option<RecordingSlot> {
        self.recordings.get(stream_id).map(|slot| slot.value().clone())
    }

    pub(crate) fn slot_or_create(&self, stream_id: &str, owner: &UserId) -> RecordingSlot {
        self.recordings
            .entry(stream_id.to_string())
            .or_insert_with(|| {
                self.expired.remove(stream_id);
                info!(stream_id = %stream_id, owner = %owner, "Recording started");
                Arc::new(Mutex::new(HlsRecording::new(
                    stream_id.to_string(),
                    owner.clone(),
                    self.stream_dir(stream_id).join(PLAYLIST_FILE),
                    Utc::now(),
                    self.ttl,
                )))
            })
            .value()
            .clone()
    }

    /// Drop `slot` from the map unless it was already replaced
    pub(crate) fn forget_slot(&self, stream_id: &str, slot: &RecordingSlot) {
        self.recordings
            .remove_if(stream_id, |_, current| Arc::ptr_eq(current, slot));
    }

    /// Whether the sweep removed this recording for outliving its TTL
    #[must_use]
    pub fn was_expired(&self, stream_id: &str) -> bool {
        self.expired.contains_key(stream_id)
    }

    /// Snapshot of a recording's metadata
    pub async fn get(&self, stream_id: &str) -> Option<HlsRecording> {
        let slot = self.slot(stream_id)?;
        let recording = slot.lock().await;
        (!recording.discarded).then(|| recording.clone())
    }

    /// Promote (`permanent = true`) or discard (`permanent = false`) a recording
    ///
    /// Returns `false` when no recording exists for `stream_id`.
    pub async fn finalize(&self, stream_id: &str, permanent: bool) -> Result<bool> {
        if permanent {
            let Some(slot) = self.slot(stream_id) else {
                return Ok(false);
            };
            let mut recording = slot.lock().await;
            if recording.discarded {
                return Ok(false);
            }
            if recording.is_temporary {
                recording.make_permanent();
                info!(stream_id = %stream_id, "Recording saved permanently");
            }
            return Ok(true);
        }

        self.discard_if(stream_id, |_| true).await
    }

    /// Discard every temporary recording whose expiry has passed
    pub async fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now()).await
    }

    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let candidates: Vec<String> = self.recordings.iter().map(|e| e.key().clone()).collect();
        let mut removed = 0;

        for stream_id in candidates {
            match self.discard_if(&stream_id, |rec| rec.is_expired(now)).await {
                Ok(true) => {
                    self.expired.insert(stream_id.clone(), now);
                    removed += 1;
                }
                Ok(false) => {}
                Err(e) => error!(stream_id = %stream_id, error = %e, "Failed to remove expired recording"),
            }
        }
        // Tombstones only need to outlive the link a viewer might still hold
        self.expired.retain(|_, swept_at| now - *swept_at < self.ttl);

        if removed > 0 {
            info!(removed, "Expired recordings swept");
        } else {
            debug!("No expired recordings");
        }
        removed
    }

    /// Remove files and metadata while holding the recording's lock, so a
    /// concurrent writer either finishes first or observes the discard
    async fn discard_if<F>(&self, stream_id: &str, predicate: F) -> Result<bool>
    where
        F: FnOnce(&HlsRecording) -> bool,
    {
        let Some(slot) = self.slot(stream_id) else {
            return Ok(false);
        };

        let mut recording = slot.lock().await;
        if recording.discarded || !predicate(&recording) {
            return Ok(false);
        }

        match tokio::fs::remove_dir_all(self.stream_dir(stream_id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(stream_id = %stream_id, "Recording directory already gone");
            }
            Err(e) => return Err(e.into()),
        }

        recording.discarded = true;
        drop(recording);
        self.forget_slot(stream_id, &slot);

        info!(stream_id = %stream_id, "Recording discarded");
        Ok(true)
    }

    /// Spawn the periodic expiry sweep; stops when `cancel` fires
    pub fn start_sweeper(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("Recording sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.sweep_expired().await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::streaming_config;

    async fn seeded(manager: &RecordingManager, stream_id: &str) {
        let slot = manager.slot_or_create(stream_id, &UserId::from("owner"));
        let dir = manager.stream_dir(stream_id);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("segment_1.ts"), b"ts").await.unwrap();
        slot.lock().await.push_segment("segment_1.ts".to_string(), 2, 2.0);
    }

    #[tokio::test]
    async fn test_finalize_missing_recording_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RecordingManager::new(&streaming_config(dir.path()));

        assert!(!manager.finalize("nope", true).await.unwrap());
        assert!(!manager.finalize("nope", false).await.unwrap());
    }

    #[tokio::test]
    async fn test_finalize_permanent_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RecordingManager::new(&streaming_config(dir.path()));
        seeded(&manager, "42").await;

        assert!(manager.finalize("42", true).await.unwrap());
        assert!(manager.finalize("42", true).await.unwrap());

        let recording = manager.get("42").await.unwrap();
        assert!(!recording.is_temporary);
        assert!(recording.expires_at.is_none());
        assert!(manager.stream_dir("42").join("segment_1.ts").exists());
    }

    #[tokio::test]
    async fn test_discard_removes_files_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RecordingManager::new(&streaming_config(dir.path()));
        seeded(&manager, "42").await;

        assert!(manager.finalize("42", false).await.unwrap());
        assert!(manager.get("42").await.is_none());
        assert!(!manager.stream_dir("42").exists());
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_only_removes_expired_temporary_recordings() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RecordingManager::new(&streaming_config(dir.path()));
        seeded(&manager, "temp").await;
        seeded(&manager, "kept").await;
        manager.finalize("kept", true).await.unwrap();

        assert_eq!(manager.sweep_expired().await, 0);

        let later = Utc::now() + chrono::Duration::hours(25);
        assert_eq!(manager.sweep_expired_at(later).await, 1);
        assert!(manager.get("temp").await.is_none());
        assert!(manager.get("kept").await.is_some());
    }

    #[tokio::test]
    async fn test_sweep_remembers_expired_ids() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RecordingManager::new(&streaming_config(dir.path()));
        seeded(&manager, "swept").await;
        seeded(&manager, "dropped").await;
        manager.finalize("dropped", false).await.unwrap();

        let later = Utc::now() + chrono::Duration::hours(25);
        assert_eq!(manager.sweep_expired_at(later).await, 1);
        assert!(manager.was_expired("swept"));
        assert!(!manager.was_expired("dropped"));

        // Forgotten once a full TTL has passed since the sweep
        manager.sweep_expired_at(later + chrono::Duration::hours(25)).await;
        assert!(!manager.was_expired("swept"));
    }

    #[tokio::test]
    async fn test_new_recording_clears_expired_mark() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RecordingManager::new(&streaming_config(dir.path()));
        seeded(&manager, "42").await;
        manager.sweep_expired_at(Utc::now() + chrono::Duration::hours(25)).await;
        assert!(manager.was_expired("42"));

        seeded(&manager, "42").await;
        assert!(!manager.was_expired("42"));
        assert!(manager.get("42").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(RecordingManager::new(&streaming_config(dir.path())));
        let cancel = CancellationToken::new();

        let handle = manager.clone().start_sweeper(Duration::from_secs(60), cancel.clone());
        tokio::time::advance(Duration::from_secs(120)).await;
        cancel.cancel();

        assert!(handle.await.is_ok());
    }
}
