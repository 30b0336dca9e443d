use std::fmt::Write as _;

/// Sliding-window parameters shared by every playlist render
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaylistWindow {
    /// Most recent segments listed
    pub size: usize,
    /// Nominal duration of each segment in seconds
    pub segment_duration: f64,
}

/// Sequence number of the first listed segment
#[must_use]
pub const fn media_sequence(total_segments: usize, window: usize) -> usize {
    total_segments.saturating_sub(window)
}

/// Render the playlist for `segment_names` (arrival order, oldest first)
///
/// Output depends only on the arguments. Segment URIs are relative to the
/// playlist so the document can be served from any base path.
#[must_use]
pub fn render_playlist(segment_names: &[String], window: PlaylistWindow, ended: bool) -> String {
    let first = media_sequence(segment_names.len(), window.size);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let target_duration = (window.segment_duration.ceil() as u64).max(1);

    let mut out = String::with_capacity(96 + 32 * (segment_names.len() - first));
    out.push_str("#EXTM3U\n#EXT-X-VERSION:3\n");
    let _ = writeln!(out, "#EXT-X-TARGETDURATION:{target_duration}");
    let _ = writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{first}");

    for name in &segment_names[first..] {
        let _ = writeln!(out, "#EXTINF:{:.3},", window.segment_duration);
        out.push_str(name);
        out.push('\n');
    }

    if ended {
        out.push_str("#EXT-X-ENDLIST\n");
    }
    out
}
