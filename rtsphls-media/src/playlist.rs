//! HLS media playlist parsing
//!
//! Only the subset FFmpeg's HLS muxer writes is understood: version, target
//! duration, media sequence, `#EXTINF` segments and the end-list marker.

use crate::error::{MediaError, MediaResult};
use std::path::Path;
use std::time::{Duration, SystemTime};

/// A segment listed in a media playlist
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistSegment {
    /// Media sequence number of this segment
    pub sequence: u64,
    /// Segment duration in seconds
    pub duration: f64,
    /// Optional `#EXTINF` title
    pub title: Option<String>,
    /// Segment URI as written in the playlist
    pub uri: String,
}

/// Parsed media playlist
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaPlaylist {
    /// `#EXT-X-VERSION`
    pub version: Option<u32>,
    /// `#EXT-X-TARGETDURATION`
    pub target_duration: Option<u64>,
    /// `#EXT-X-MEDIA-SEQUENCE` of the first listed segment
    pub media_sequence: u64,
    /// Listed segments in order
    pub segments: Vec<PlaylistSegment>,
    /// `#EXT-X-ENDLIST` present
    pub ended: bool,
}

impl MediaPlaylist {
    /// Parse playlist text
    pub fn parse(text: &str) -> MediaResult<Self> {
        let mut lines = text
            .trim_start_matches('\u{feff}')
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty());

        if lines.next() != Some("#EXTM3U") {
            return Err(MediaError::InvalidPlaylist {
                reason: "missing #EXTM3U header".to_string(),
            });
        }

        let mut playlist = MediaPlaylist::default();
        let mut pending: Option<(f64, Option<String>)> = None;

        for line in lines {
            if let Some(value) = line.strip_prefix("#EXT-X-VERSION:") {
                playlist.version = Some(parse_number(value, "EXT-X-VERSION")?);
            } else if let Some(value) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
                playlist.target_duration = Some(parse_number(value, "EXT-X-TARGETDURATION")?);
            } else if let Some(value) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
                playlist.media_sequence = parse_number(value, "EXT-X-MEDIA-SEQUENCE")?;
            } else if let Some(value) = line.strip_prefix("#EXTINF:") {
                let (duration, title) = match value.split_once(',') {
                    Some((duration, title)) => {
                        let title = title.trim();
                        (duration, (!title.is_empty()).then(|| title.to_string()))
                    }
                    None => (value, None),
                };
                let duration: f64 = duration.trim().parse().map_err(|_| {
                    MediaError::InvalidPlaylist {
                        reason: format!("bad EXTINF duration: {}", duration),
                    }
                })?;
                pending = Some((duration, title));
            } else if line == "#EXT-X-ENDLIST" {
                playlist.ended = true;
            } else if line.starts_with('#') {
                // Tags we do not need
            } else {
                let (duration, title) = pending.take().ok_or_else(|| MediaError::InvalidPlaylist {
                    reason: format!("segment {} has no EXTINF", line),
                })?;
                playlist.segments.push(PlaylistSegment {
                    sequence: playlist.media_sequence + playlist.segments.len() as u64,
                    duration,
                    title,
                    uri: line.to_string(),
                });
            }
        }

        Ok(playlist)
    }

    /// Read and parse a playlist file; `None` when it does not exist yet
    pub async fn read(path: &Path) -> MediaResult<Option<Self>> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Self::parse(&text).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a player can start: at least one segment is listed
    pub fn is_ready(&self) -> bool {
        !self.segments.is_empty()
    }

    /// Sum of listed segment durations
    pub fn total_duration(&self) -> Duration {
        Duration::from_secs_f64(self.segments.iter().map(|s| s.duration.max(0.0)).sum())
    }

    /// Most recent segment
    pub fn latest_segment(&self) -> Option<&PlaylistSegment> {
        self.segments.last()
    }

    /// Whether `name` is one of the listed segment URIs
    pub fn contains_segment(&self, name: &str) -> bool {
        self.segments
            .iter()
            .any(|s| s.uri == name || s.uri.rsplit('/').next() == Some(name))
    }
}

/// Time since the playlist file was last written
pub async fn playlist_age(path: &Path) -> Option<Duration> {
    let modified = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
    Some(SystemTime::now().duration_since(modified).unwrap_or_default())
}

fn parse_number<T: std::str::FromStr>(value: &str, tag: &str) -> MediaResult<T> {
    value.trim().parse().map_err(|_| MediaError::InvalidPlaylist {
        reason: format!("bad {} value: {}", tag, value),
    })
}
