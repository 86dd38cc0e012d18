//! # rtsphls - RTSP to HLS relay
//!
//! rtsphls turns RTSP camera feeds into HLS playlists that any phone or
//! browser player can open. Each session runs a supervised FFmpeg process,
//! can switch between a front and a rear camera, and reports its status and
//! player actions as events.
//!
//! ## Key Features
//!
//! - **Supervised FFmpeg**: restarts with exponential backoff, readiness detection
//! - **Camera switching**: front/rear sources behind one playlist URL
//! - **Player bridge**: the `play`/`stop`/`checkAvailability`/`getStats` contract
//!   for native players, plus a WebSocket control channel
//! - **HLS HTTP surface**: axum routes for playlists, segments and statistics
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rtsphls::RtspHls;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let relay = RtspHls::init()?;
//!
//!     let (session, mut events) = relay
//!         .session()
//!         .front_url("rtsp://192.168.0.10:554/front")
//!         .rear_url("rtsp://192.168.0.10:554/rear")
//!         .title("Dock camera")
//!         .start_with_events()
//!         .await?;
//!
//!     println!("Playlist at {}", session.hls_url());
//!     while let Some(event) = events.next().await {
//!         println!("Session event: {:?}", event);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use rtsphls_core::{
    is_rtsp_url, redact_credentials, Camera, CameraSources, RelayError, RelayResult,
    ResourceLimits, ResourceManager, ResourceUsage, ResourceWarning, WarningSeverity,
};

pub use rtsphls_media::{
    ConversionState, ConversionStats, ConverterConfig, MediaError, RtspHlsConverter,
    VideoEncoding,
};

pub use rtsphls_bridge::{
    ControlServer, NativeError, NativeHandler, PlayCallbacks, PlayOptions, PlayRequest,
    PlaySession, RtspHlsPlayer,
};

pub use rtsphls_diagnostics::{
    init_logging, HealthMonitor, HealthReport, HealthStatus, LoggingConfig,
};

// Public API modules
pub mod config;
pub mod event;
#[cfg(feature = "http")]
pub mod http;
pub mod plugin;
pub mod relay;
pub mod session;

// Re-export main API types
pub use config::{GlobalConfig, SessionConfig};
pub use event::{Event, EventFilter, EventHandler, EventStream, FilteredEventStream};
pub use plugin::RelayPlugin;
pub use relay::{Relay, SessionInfo};
pub use session::{Session, SessionBuilder};

use std::sync::Arc;

/// Main entry point for rtsphls
#[derive(Debug, Clone)]
pub struct RtspHls {
    relay: Arc<Relay>,
}

impl RtspHls {
    /// Initialize with default settings
    ///
    /// # Example
    /// ```rust,no_run
    /// use rtsphls::RtspHls;
    ///
    /// let relay = RtspHls::init()?;
    /// # Ok::<(), rtsphls::RelayError>(())
    /// ```
    pub fn init() -> Result<Self, RelayError> {
        Self::init_with(GlobalConfig::default())
    }

    /// Initialize with custom global configuration.
    ///
    /// With `debug_logging` set, a debug-level `tracing` subscriber is
    /// installed unless one already is.
    pub fn init_with(config: GlobalConfig) -> Result<Self, RelayError> {
        config.converter.validate()?;
        if config.max_sessions == 0 {
            return Err(RelayError::Initialization {
                reason: "max_sessions must be greater than 0".to_string(),
            });
        }

        if config.debug_logging {
            if let Err(e) = init_logging(&LoggingConfig::with_debug(true)) {
                tracing::debug!("Keeping existing subscriber: {}", e);
            }
        }

        tracing::info!(
            "rtsphls initialised: {} sessions max, HLS under {}",
            config.max_sessions,
            config.converter.output_root.display()
        );

        Ok(Self {
            relay: Arc::new(Relay::new(config)),
        })
    }

    /// Create a session builder
    ///
    /// # Example
    /// ```rust,no_run
    /// use rtsphls::{Camera, RtspHls};
    ///
    /// # async fn example() -> Result<(), rtsphls::RelayError> {
    /// let relay = RtspHls::init()?;
    /// let session = relay
    ///     .session()
    ///     .front_url("rtsp://camera.local/front")
    ///     .initial_camera(Camera::Front)
    ///     .start()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn session(&self) -> SessionBuilder {
        self.relay.session_builder()
    }

    /// Session registry
    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Native bridge handler driving one session on this relay
    pub fn plugin(&self) -> RelayPlugin {
        RelayPlugin::new(self.relay.clone())
    }

    /// HLS HTTP routes for this relay
    #[cfg(feature = "http")]
    pub fn router(&self) -> axum::Router {
        http::router(self.relay.clone())
    }

    /// Stop every session
    pub async fn shutdown(&self) {
        self.relay.stop_all().await;
        self.relay.resources().stop_monitoring();
    }
}
