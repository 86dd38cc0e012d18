//! # RTSP HLS Media
//!
//! Everything that touches FFmpeg and HLS output: building the FFmpeg
//! command line, probing for the binary, parsing `-progress` output and
//! media playlists, and supervising a running conversion.

#![warn(clippy::all)]

pub mod converter;
pub mod error;
pub mod ffmpeg;
pub mod playlist;
pub mod stats;

// Re-export main types
pub use converter::{ConverterConfig, ConverterEvent, RtspHlsConverter, VideoEncoding};
pub use error::{ErrorCategory, MediaError, MediaResult};
pub use ffmpeg::{is_ffmpeg_available, probe_ffmpeg, FfmpegCommand, ProgressParser, ProgressUpdate};
pub use playlist::{MediaPlaylist, PlaylistSegment};
pub use stats::{ConversionState, ConversionStats};
