//! Configuration types and defaults

use crate::{Camera, ConverterConfig, ResourceLimits};
use rtsphls_bridge::protocol::{DEFAULT_API_BASE_URL, DEFAULT_TITLE};
use std::time::Duration;

/// Global relay configuration
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    /// Enable debug logging
    pub debug_logging: bool,
    /// Maximum number of concurrent sessions
    pub max_sessions: u32,
    /// FFmpeg and HLS output settings shared by all sessions
    pub converter: ConverterConfig,
    /// Public base URL of the HLS HTTP surface, without trailing slash
    pub http_base_url: String,
    /// Resource limits; `max_sessions` above takes precedence
    pub limits: ResourceLimits,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self::desktop()
    }
}

impl GlobalConfig {
    /// Settings for a phone or tablet: two sessions, small playlists
    pub fn mobile() -> Self {
        Self {
            debug_logging: false,
            max_sessions: 2,
            converter: ConverterConfig {
                hls_time_secs: 1,
                hls_list_size: 3,
                ready_timeout: Duration::from_secs(10),
                max_restarts: 3,
                ..ConverterConfig::default()
            },
            http_base_url: "http://127.0.0.1:8080".to_string(),
            limits: ResourceLimits::mobile(),
        }
    }

    /// Settings for a workstation
    pub fn desktop() -> Self {
        Self {
            debug_logging: false,
            max_sessions: 8,
            converter: ConverterConfig::default(),
            http_base_url: "http://127.0.0.1:8080".to_string(),
            limits: ResourceLimits::desktop(),
        }
    }

    /// Settings for a shared relay host
    pub fn server() -> Self {
        Self {
            debug_logging: false,
            max_sessions: 64,
            converter: ConverterConfig {
                hls_list_size: 6,
                max_restarts: 10,
                ..ConverterConfig::default()
            },
            http_base_url: "http://0.0.0.0:8080".to_string(),
            limits: ResourceLimits::server(),
        }
    }

    /// Resource limits with the session cap applied
    pub fn effective_limits(&self) -> ResourceLimits {
        ResourceLimits {
            max_sessions: Some(self.max_sessions),
            ..self.limits.clone()
        }
    }

    /// Playlist URL for a session
    pub fn hls_url_for(&self, session_key: &str) -> String {
        format!(
            "{}/sessions/{}/{}",
            self.http_base_url.trim_end_matches('/'),
            session_key,
            self.converter.playlist_name
        )
    }
}

/// Per-session presentation settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Title shown by players
    pub title: String,
    /// Base URL of the camera control API
    pub api_base_url: String,
    /// Camera to start with
    pub initial_camera: Camera,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            initial_camera: Camera::Front,
        }
    }
}
