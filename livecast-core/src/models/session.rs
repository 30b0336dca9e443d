use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::id::UserId;

/// How media travels from the host to viewers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    /// WebRTC peer connections brokered by the signaling relay
    PeerRelay,
    /// Host uploads segments, viewers pull an HLS playlist
    SegmentedPull,
    /// Third-party CDN publish endpoint; only bookkeeping happens here
    CdnRelay,
}

impl Transport {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PeerRelay => "peer-relay",
            Self::SegmentedPull => "segmented-pull",
            Self::CdnRelay => "cdn-relay",
        }
    }
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "peer-relay" => Ok(Self::PeerRelay),
            "segmented-pull" => Ok(Self::SegmentedPull),
            "cdn-relay" => Ok(Self::CdnRelay),
            other => Err(format!("unknown transport: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            other => Err(format!("unknown media kind: {other}")),
        }
    }
}

/// One broadcast attempt, persisted by the session store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSession {
    pub internal_id: i64,
    pub public_id: String,
    pub owner_user_id: UserId,
    pub title: String,
    pub transport: Transport,
    pub media_kind: MediaKind,
    pub is_live: bool,
    pub viewer_count: i64,
    pub peak_viewer_count: i64,
    /// Never serialized; owners receive it explicitly through `CreatedSession`
    #[serde(skip_serializing, default)]
    pub private_key: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Visual overlay shown while an audio-only stream plays
    pub overlay_image: Option<String>,
    pub playlist_url: Option<String>,
    pub cdn_publish_url: Option<String>,
}

impl StreamSession {
    #[must_use]
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.owner_user_id == user_id
    }
}

/// Row to insert; `internal_id` is assigned by the store
#[derive(Debug, Clone)]
pub struct NewStreamSession {
    pub public_id: String,
    pub owner_user_id: UserId,
    pub title: String,
    pub transport: Transport,
    pub media_kind: MediaKind,
    pub private_key: String,
    pub started_at: DateTime<Utc>,
    pub overlay_image: Option<String>,
    pub playlist_url: Option<String>,
    pub cdn_publish_url: Option<String>,
}

impl NewStreamSession {
    /// Materialize the row as the store would return it
    #[must_use]
    pub fn into_session(self, internal_id: i64) -> StreamSession {
        StreamSession {
            internal_id,
            public_id: self.public_id,
            owner_user_id: self.owner_user_id,
            title: self.title,
            transport: self.transport,
            media_kind: self.media_kind,
            is_live: true,
            viewer_count: 0,
            peak_viewer_count: 0,
            private_key: self.private_key,
            started_at: self.started_at,
            ended_at: None,
            overlay_image: self.overlay_image,
            playlist_url: self.playlist_url,
            cdn_publish_url: self.cdn_publish_url,
        }
    }
}

/// Attributes supplied by the broadcaster when starting a session
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub title: String,
    pub transport: Transport,
    #[serde(default = "default_media_kind")]
    pub media_kind: MediaKind,
    #[serde(default)]
    pub overlay_image: Option<String>,
}

const fn default_media_kind() -> MediaKind {
    MediaKind::Video
}

/// Returned to the owner exactly once, at creation time
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    pub internal_id: i64,
    pub public_id: String,
    pub private_key: String,
    pub share_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cdn_publish_url: Option<String>,
}
