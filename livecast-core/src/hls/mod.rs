//! Segmented-pull (HLS) assembly
//!
//! Hosts upload finished MPEG-TS chunks one HTTP call at a time; the
//! assembler stores them per stream and keeps a sliding-window playlist next
//! to them for players to poll.

mod assembler;
mod playlist;

pub use assembler::{HlsAssembler, HlsFile, IngestedSegment};
pub use playlist::{media_sequence, render_playlist, PlaylistWindow};

pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";
