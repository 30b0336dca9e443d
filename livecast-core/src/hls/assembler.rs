use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tracing::{debug, error, warn};

use super::playlist::{render_playlist, PlaylistWindow};
use super::{PLAYLIST_CONTENT_TYPE, SEGMENT_CONTENT_TYPE};
use crate::{
    config::StreamingConfig,
    models::UserId,
    service::recording::{RecordingManager, PLAYLIST_FILE},
    Error, Result,
};

static STREAM_ID_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[A-Za-z0-9_-]{1,64}$")
        .expect("stream id regex is a compile-time constant and always valid")
});

static FILE_NAME_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^(playlist\.m3u8|segment_[0-9]{1,10}\.ts)$")
        .expect("file name regex is a compile-time constant and always valid")
});

/// Result of one successful segment upload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestedSegment {
    pub segment_url: String,
    pub segment_name: String,
    pub segment_count: usize,
}

/// A playlist or segment ready to be served
#[derive(Debug, Clone)]
pub struct HlsFile {
    pub data: Bytes,
    pub content_type: &'static str,
}

/// Writes uploaded segments to disk and keeps the playlist current
pub struct HlsAssembler {
    recordings: Arc<RecordingManager>,
    window: PlaylistWindow,
    max_segment_bytes: usize,
    /// `{base_url}/hls`
    public_base: String,
}

impl HlsAssembler {
    #[must_use]
    pub fn new(recordings: Arc<RecordingManager>, config: &StreamingConfig, base_url: &str) -> Self {
        Self {
            recordings,
            window: PlaylistWindow {
                size: config.playlist_window,
                segment_duration: config.segment_duration_seconds,
            },
            max_segment_bytes: config.max_segment_bytes,
            public_base: format!("{}/hls", base_url.trim_end_matches('/')),
        }
    }

    #[must_use]
    pub fn recordings(&self) -> &Arc<RecordingManager> {
        &self.recordings
    }

    /// Public URL of a file inside a stream's directory
    #[must_use]
    pub fn file_url(&self, stream_id: &str, file: &str) -> String {
        format!("{}/{stream_id}/{file}", self.public_base)
    }

    #[must_use]
    pub fn playlist_url(&self, stream_id: &str) -> String {
        self.file_url(stream_id, PLAYLIST_FILE)
    }

    /// Store one segment and regenerate the playlist
    ///
    /// The segment is named after its arrival position; `sequence_hint` from
    /// the uploader is only compared and logged. On any storage failure the
    /// segment is dropped and the recording is left as it was.
    pub async fn ingest_segment(
        &self,
        stream_id: &str,
        owner: &UserId,
        sequence_hint: Option<u64>,
        data: Bytes,
    ) -> Result<IngestedSegment> {
        validate_stream_id(stream_id)?;
        if data.is_empty() {
            return Err(Error::InvalidInput("Segment body is empty".to_string()));
        }
        if data.len() > self.max_segment_bytes {
            return Err(Error::InvalidInput(format!(
                "Segment exceeds {} bytes",
                self.max_segment_bytes
            )));
        }

        loop {
            let slot = self.recordings.slot_or_create(stream_id, owner);
            let mut recording = slot.lock().await;

            if recording.discarded {
                // Lost a race with a discard; start over on a fresh recording
                drop(recording);
                self.recordings.forget_slot(stream_id, &slot);
                continue;
            }
            if &recording.owner_user_id != owner {
                return Err(Error::Authorization(
                    "Recording belongs to another user".to_string(),
                ));
            }
            if recording.is_complete {
                return Err(Error::InvalidInput("Recording already completed".to_string()));
            }

            let name = recording.next_segment_name();
            let expected = recording.segment_count() as u64 + 1;
            if let Some(hint) = sequence_hint.filter(|hint| *hint != expected) {
                debug!(stream_id = %stream_id, hint, expected, "Segment arrived out of uploader sequence");
            }

            let dir = self.recordings.stream_dir(stream_id);
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                error!(stream_id = %stream_id, error = %e, "Failed to create stream directory");
                Error::Storage(e)
            })?;

            let segment_path = dir.join(&name);
            tokio::fs::write(&segment_path, &data).await.map_err(|e| {
                error!(stream_id = %stream_id, segment = %name, error = %e, "Failed to write segment");
                Error::Storage(e)
            })?;

            let mut listed = recording.segment_names.clone();
            listed.push(name.clone());
            let playlist = render_playlist(&listed, self.window, false);

            if let Err(e) = write_playlist(&dir, &playlist).await {
                error!(stream_id = %stream_id, error = %e, "Failed to write playlist, dropping segment");
                if let Err(e) = tokio::fs::remove_file(&segment_path).await {
                    warn!(stream_id = %stream_id, error = %e, "Failed to remove dropped segment");
                }
                return Err(Error::Storage(e));
            }

            recording.push_segment(name.clone(), data.len() as u64, self.window.segment_duration);
            let segment_count = recording.segment_count();
            debug!(stream_id = %stream_id, segment = %name, segment_count, "Segment ingested");

            return Ok(IngestedSegment {
                segment_url: self.file_url(stream_id, &name),
                segment_name: name,
                segment_count,
            });
        }
    }

    /// Mark the recording as ended and append the end marker to its playlist
    ///
    /// Returns `false` when the stream never uploaded anything.
    pub async fn complete(&self, stream_id: &str) -> Result<bool> {
        let Some(slot) = self.recordings.slot(stream_id) else {
            return Ok(false);
        };
        let mut recording = slot.lock().await;
        if recording.discarded {
            return Ok(false);
        }
        if recording.is_complete {
            return Ok(true);
        }

        let playlist = render_playlist(&recording.segment_names, self.window, true);
        write_playlist(&self.recordings.stream_dir(stream_id), &playlist).await?;
        recording.is_complete = true;

        Ok(true)
    }

    /// Load a playlist or segment for serving
    pub async fn read(&self, stream_id: &str, file: &str) -> Result<HlsFile> {
        validate_stream_id(stream_id)?;
        if !FILE_NAME_REGEX.is_match(file) {
            return Err(Error::NotFound(format!("No such HLS file: {file}")));
        }

        let path = {
            let Some(slot) = self.recordings.slot(stream_id) else {
                if self.recordings.was_expired(stream_id) {
                    return Err(Error::Gone(format!("Recording for stream {stream_id} has expired")));
                }
                return Err(Error::NotFound(format!("No recording for stream {stream_id}")));
            };
            let recording = slot.lock().await;

            if recording.discarded {
                return Err(Error::NotFound(format!("No recording for stream {stream_id}")));
            }
            if recording.is_expired(Utc::now()) {
                return Err(Error::Gone(format!("Recording for stream {stream_id} has expired")));
            }
            if file != PLAYLIST_FILE && !recording.segment_names.iter().any(|name| name == file) {
                return Err(Error::NotFound(format!("No such HLS file: {file}")));
            }
            self.recordings.stream_dir(stream_id).join(file)
        };

        let data = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(format!("No such HLS file: {file}")),
            _ => Error::Storage(e),
        })?;

        let content_type = if file == PLAYLIST_FILE {
            PLAYLIST_CONTENT_TYPE
        } else {
            SEGMENT_CONTENT_TYPE
        };

        Ok(HlsFile {
            data: Bytes::from(data),
            content_type,
        })
    }
}

fn validate_stream_id(stream_id: &str) -> Result<()> {
    if STREAM_ID_REGEX.is_match(stream_id) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("Invalid stream id: {stream_id}")))
    }
}

/// Replace the playlist atomically so pollers never see a partial document
async fn write_playlist(dir: &Path, playlist: &str) -> std::io::Result<()> {
    let tmp = dir.join(format!("{PLAYLIST_FILE}.tmp"));
    tokio::fs::write(&tmp, playlist).await?;
    tokio::fs::rename(&tmp, dir.join(PLAYLIST_FILE)).await
}
