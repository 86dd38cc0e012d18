//! Native handler backing the player bridge
//!
//! [`RelayPlugin`] drives a single "current" session on a [`Relay`], the way
//! a device-side player plugin owns one playback at a time. Every `play`
//! replaces the previous session.

use crate::session::Session;
use crate::{Camera, Relay, RelayError, RelayResult};
use async_trait::async_trait;
use rtsphls_bridge::{NativeError, NativeHandler, NativeResult, PlayRequest, PluginResult, ResultSender};
use rtsphls_media::is_ffmpeg_available;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Bridge handler running sessions on a relay
#[derive(Debug, Clone)]
pub struct RelayPlugin {
    relay: Arc<Relay>,
    current: Arc<Mutex<Option<Arc<Session>>>>,
}

impl RelayPlugin {
    /// Create a plugin on top of `relay`
    pub fn new(relay: Arc<Relay>) -> Self {
        Self {
            relay,
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// The plugin's running session, if any
    pub async fn current_session(&self) -> Option<Arc<Session>> {
        self.current
            .lock()
            .await
            .clone()
            .filter(|session| session.is_active())
    }

    async fn stop_current(&self, current: &mut Option<Arc<Session>>) -> RelayResult<()> {
        let Some(session) = current.take() else {
            return Ok(());
        };
        match self.relay.stop_session(session.id()).await {
            Err(RelayError::SessionNotFound { .. }) => session.stop().await,
            other => other,
        }
    }

    async fn require_session(&self) -> Result<Arc<Session>, NativeError> {
        self.current_session().await.ok_or_else(|| {
            RelayError::InvalidState {
                expected: "playing".to_string(),
                actual: "idle".to_string(),
            }
            .into()
        })
    }
}

fn parse_camera(name: &str) -> Result<Camera, NativeError> {
    name.parse::<Camera>().map_err(NativeError::from)
}

#[async_trait]
impl NativeHandler for RelayPlugin {
    async fn play(&self, request: PlayRequest, results: ResultSender) {
        let mut current = self.current.lock().await;

        if let Err(e) = self.stop_current(&mut current).await {
            warn!("Failed to stop previous session: {}", e);
        }

        let (session, mut events) = match self.relay.start_session_with_events(&request).await {
            Ok(started) => started,
            Err(e) => {
                warn!("❌ Play failed: {}", e);
                let _ = results.send(Err(e.into()));
                return;
            }
        };
        info!("▶️ Playing session {}", session.id());
        *current = Some(session);

        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let terminal = event.is_terminal();
                if results.send(Ok(event.to_plugin_result().to_value())).is_err() {
                    debug!("Play result receiver dropped");
                    break;
                }
                if terminal {
                    break;
                }
            }
        });
    }

    async fn stop(&self) -> NativeResult {
        let mut current = self.current.lock().await;
        self.stop_current(&mut current).await?;
        Ok(json!({"status": "stopped"}))
    }

    async fn check_availability(&self) -> NativeResult {
        let converter = &self.relay.config().converter;
        let available = is_ffmpeg_available(&converter.ffmpeg_path, converter.probe_timeout).await;
        Ok(json!({"available": available}))
    }

    async fn get_stats(&self) -> NativeResult {
        let session = self.require_session().await?;
        let stats = session.stats().await;
        serde_json::to_value(stats).map_err(|e| {
            NativeError::from(RelayError::NativeFailure {
                reason: e.to_string(),
            })
        })
    }

    async fn switch_camera(&self, camera: &str) -> NativeResult {
        let camera = parse_camera(camera)?;
        let session = self.require_session().await?;
        session.switch_camera(camera).await?;
        Ok(json!({"camera": camera}))
    }

    async fn trigger_action(&self, action: &str, camera: Option<&str>, data: Value) -> NativeResult {
        let camera = camera
            .filter(|name| !name.is_empty())
            .map(parse_camera)
            .transpose()?;
        let session = self.require_session().await?;
        session.trigger_action(action, camera, data.clone())?;
        Ok(PluginResult::action(action, camera.map(|c| c.to_string()), data).to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GlobalConfig;

    fn plugin() -> RelayPlugin {
        let mut config = GlobalConfig::default();
        config.converter.ffmpeg_path = "/nonexistent/ffmpeg".into();
        RelayPlugin::new(Arc::new(Relay::new(config)))
    }

    #[tokio::test]
    async fn test_stop_when_idle() {
        assert_eq!(plugin().stop().await.unwrap(), json!({"status": "stopped"}));
    }

    #[tokio::test]
    async fn test_idle_operations_fail() {
        let plugin = plugin();
        assert_eq!(plugin.get_stats().await.unwrap_err().code, "INVALID_STATE");
        assert_eq!(
            plugin.switch_camera("rear").await.unwrap_err().code,
            "INVALID_STATE"
        );
        assert_eq!(
            plugin.switch_camera("sideways").await.unwrap_err().code,
            "UNKNOWN_CAMERA"
        );
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_unavailable() {
        assert_eq!(
            plugin().check_availability().await.unwrap(),
            json!({"available": false})
        );
    }

    #[tokio::test]
    async fn test_play_without_url_reports_error() {
        let plugin = plugin();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        plugin.play(PlayRequest::default(), tx).await;

        let err = rx.recv().await.unwrap().unwrap_err();
        assert_eq!(err.code, "MISSING_CONFIGURATION");
        assert!(rx.recv().await.is_none());
        assert!(plugin.current_session().await.is_none());
    }
}
