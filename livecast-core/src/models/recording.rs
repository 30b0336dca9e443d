use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use super::id::UserId;

/// Assembled HLS recording of one stream
///
/// Segment names follow arrival order (`segment_1.ts`, `segment_2.ts`, ...).
/// `expires_at` is only present while the recording is temporary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HlsRecording {
    pub stream_id: String,
    pub owner_user_id: UserId,
    pub segment_names: Vec<String>,
    #[serde(skip)]
    pub playlist_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub size_bytes: u64,
    pub approx_duration_seconds: f64,
    pub is_temporary: bool,
    /// Set once the broadcast ended; the playlist then carries an end marker
    pub is_complete: bool,
    /// Set when the recording was discarded while a writer still held it
    #[serde(skip)]
    pub(crate) discarded: bool,
}

impl HlsRecording {
    #[must_use]
    pub fn new(
        stream_id: String,
        owner_user_id: UserId,
        playlist_path: PathBuf,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            stream_id,
            owner_user_id,
            segment_names: Vec::new(),
            playlist_path,
            created_at: now,
            expires_at: Some(now + ttl),
            size_bytes: 0,
            approx_duration_seconds: 0.0,
            is_temporary: true,
            is_complete: false,
            discarded: false,
        }
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segment_names.len()
    }

    /// File name the next arriving segment will be stored under
    #[must_use]
    pub fn next_segment_name(&self) -> String {
        format!("segment_{}.ts", self.segment_names.len() + 1)
    }

    /// Record a segment that has already been written to disk
    ///
    /// Duration is `count * segment_duration`, never measured from the media.
    pub fn push_segment(&mut self, name: String, bytes: u64, segment_duration: f64) {
        self.segment_names.push(name);
        self.size_bytes += bytes;
        #[allow(clippy::cast_precision_loss)]
        let count = self.segment_names.len() as f64;
        self.approx_duration_seconds = count * segment_duration;
    }

    /// Promote to a permanent recording
    pub fn make_permanent(&mut self) {
        self.is_temporary = false;
        self.expires_at = None;
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_temporary && self.expires_at.is_some_and(|expires_at| expires_at < now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(now: DateTime<Utc>) -> HlsRecording {
        HlsRecording::new(
            "42".to_string(),
            UserId::from("owner"),
            PathBuf::from("/tmp/42/playlist.m3u8"),
            now,
            chrono::Duration::hours(24),
        )
    }

    #[test]
    fn test_new_recording_is_temporary() {
        let now = Utc::now();
        let rec = recording(now);
        assert!(rec.is_temporary);
        assert_eq!(rec.expires_at, Some(now + chrono::Duration::hours(24)));
        assert_eq!(rec.next_segment_name(), "segment_1.ts");
    }

    #[test]
    fn test_push_segment_updates_size_and_duration() {
        let mut rec = recording(Utc::now());
        rec.push_segment(rec.next_segment_name(), 100, 2.0);
        rec.push_segment(rec.next_segment_name(), 50, 2.0);

        assert_eq!(rec.segment_names, vec!["segment_1.ts", "segment_2.ts"]);
        assert_eq!(rec.size_bytes, 150);
        assert!((rec.approx_duration_seconds - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let mut rec = recording(now);
        assert!(!rec.is_expired(now));
        assert!(rec.is_expired(now + chrono::Duration::hours(25)));

        rec.make_permanent();
        assert!(rec.expires_at.is_none());
        assert!(!rec.is_expired(now + chrono::Duration::hours(25)));
    }
}
