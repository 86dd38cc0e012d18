//! Conversion state machine and statistics snapshot

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionState {
    /// Never started
    #[default]
    Idle,
    /// FFmpeg spawned, waiting for the first segment
    Starting,
    /// Playlist is being produced
    Converting,
    /// Restarting against a different source
    Switching,
    /// Restarting after an unexpected exit
    Reconnecting,
    /// Stopped on request
    Stopped,
    /// Gave up after too many restarts or a fatal error
    Failed,
}

impl ConversionState {
    /// Status word reported to listeners when entering this state
    pub fn as_status(&self) -> &'static str {
        match self {
            ConversionState::Idle => "idle",
            ConversionState::Starting => "starting",
            ConversionState::Converting => "ready",
            ConversionState::Switching => "switching",
            ConversionState::Reconnecting => "reconnecting",
            ConversionState::Stopped => "stopped",
            ConversionState::Failed => "failed",
        }
    }

    /// Whether an FFmpeg process is supposed to be running
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConversionState::Starting
                | ConversionState::Converting
                | ConversionState::Switching
                | ConversionState::Reconnecting
        )
    }
}

impl fmt::Display for ConversionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConversionState::Idle => "idle",
            ConversionState::Starting => "starting",
            ConversionState::Converting => "converting",
            ConversionState::Switching => "switching",
            ConversionState::Reconnecting => "reconnecting",
            ConversionState::Stopped => "stopped",
            ConversionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Point-in-time statistics of one conversion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionStats {
    pub is_converting: bool,
    pub state: ConversionState,
    /// Camera currently feeding the conversion, if known
    pub camera: Option<String>,
    /// Source URL with credentials redacted
    pub rtsp_url: Option<String>,
    pub hls_url: String,
    pub hls_output_path: String,
    pub uptime_secs: u64,
    pub frames: u64,
    pub fps: f32,
    pub bitrate_kbps: Option<f32>,
    pub speed: Option<f32>,
    pub out_time_secs: f64,
    pub segment_count: usize,
    pub media_sequence: u64,
    pub restarts: u32,
    pub switches: u32,
    pub last_error: Option<String>,
}
