//! Relay sessions

use crate::event::{Event, EventBus, EventStream};
use crate::{Camera, CameraSources, ConverterConfig, RelayError, RelayResult, SessionConfig};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rtsphls_bridge::PlayRequest;
use rtsphls_core::SessionPermit;
use rtsphls_diagnostics::{HealthMonitor, HealthReport};
use rtsphls_media::{ConversionState, ConversionStats, ConverterEvent, RtspHlsConverter};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Fluent builder for a relay session
#[derive(Debug)]
pub struct SessionBuilder {
    relay: Arc<crate::Relay>,
    sources: CameraSources,
    config: SessionConfig,
}

impl SessionBuilder {
    pub(crate) fn new(relay: Arc<crate::Relay>) -> Self {
        Self {
            relay,
            sources: CameraSources::default(),
            config: SessionConfig::default(),
        }
    }

    /// Take sources and settings from a bridge `play` request.
    ///
    /// Unknown camera names fall back to the front camera.
    pub fn from_request(mut self, request: &PlayRequest) -> Self {
        let (sources, config) = crate::relay::request_parts(request);
        self.sources = sources;
        self.config = config;
        self
    }

    /// RTSP URL of the front camera
    pub fn front_url(mut self, url: &str) -> Self {
        self.sources.front = url.to_string();
        self
    }

    /// RTSP URL of the rear camera
    pub fn rear_url(mut self, url: &str) -> Self {
        self.sources.rear = url.to_string();
        self
    }

    /// Title shown by players
    pub fn title(mut self, title: &str) -> Self {
        self.config.title = title.to_string();
        self
    }

    /// Base URL of the camera control API
    pub fn api_base_url(mut self, url: &str) -> Self {
        self.config.api_base_url = url.to_string();
        self
    }

    /// Camera to start with
    pub fn initial_camera(mut self, camera: Camera) -> Self {
        self.config.initial_camera = camera;
        self
    }

    /// Start the session and register it with the relay
    pub async fn start(self) -> RelayResult<Arc<Session>> {
        self.relay.start_with(self.sources, self.config, None).await
    }

    /// Start the session, subscribing to its events before conversion begins
    pub async fn start_with_events(self) -> RelayResult<(Arc<Session>, EventStream)> {
        let bus = EventBus::default();
        let events = bus.subscribe();
        let session = self.relay.start_with(self.sources, self.config, Some(bus)).await?;
        Ok((session, events))
    }
}

struct Forwarder {
    close: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// One active RTSP to HLS conversion
pub struct Session {
    id: Uuid,
    config: SessionConfig,
    sources: CameraSources,
    camera: RwLock<Camera>,
    started_at: DateTime<Utc>,
    converter: Arc<RtspHlsConverter>,
    bus: EventBus,
    health: HealthMonitor,
    permit: Mutex<Option<SessionPermit>>,
    forwarder: Mutex<Option<Forwarder>>,
    stopped: AtomicBool,
}

impl Session {
    /// Resolve the initial camera and start converting it
    pub(crate) async fn start(
        permit: SessionPermit,
        sources: CameraSources,
        config: SessionConfig,
        converter_config: ConverterConfig,
        hls_url: String,
        bus: EventBus,
    ) -> RelayResult<Arc<Self>> {
        let id = permit.session_id();
        let camera = config.initial_camera;
        if !sources.has(camera) {
            return Err(RelayError::MissingConfiguration {
                field: format!("{}Url", camera),
            });
        }
        let url = sources.url_for(camera).to_string();

        let (converter, converter_events) =
            RtspHlsConverter::new(converter_config, &id.to_string(), hls_url);
        let converter = Arc::new(converter);
        let forwarder = spawn_forwarder(Arc::downgrade(&converter), converter_events, bus.clone());

        let session = Arc::new(Self {
            id,
            config,
            sources,
            camera: RwLock::new(camera),
            started_at: Utc::now(),
            converter,
            bus,
            health: HealthMonitor::default(),
            permit: Mutex::new(Some(permit)),
            forwarder: Mutex::new(Some(forwarder)),
            stopped: AtomicBool::new(false),
        });

        info!(
            "🚀 Starting session {} ({:?}) on {} camera",
            id, session.config.title, camera
        );

        if let Err(e) = session.converter.start_conversion(&url).await {
            warn!("Session {} failed to start: {}", id, e);
            session.shutdown().await;
            return Err(e.into());
        }

        Ok(session)
    }

    /// Session id
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Player title
    pub fn title(&self) -> &str {
        &self.config.title
    }

    /// Base URL of the camera control API
    pub fn api_base_url(&self) -> &str {
        &self.config.api_base_url
    }

    /// Configured camera sources
    pub fn sources(&self) -> &CameraSources {
        &self.sources
    }

    /// Camera currently relayed
    pub fn camera(&self) -> Camera {
        *self.camera.read()
    }

    /// When the session started
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// URL players fetch the playlist from
    pub fn hls_url(&self) -> &str {
        self.converter.hls_url()
    }

    /// Directory holding the playlist and segments
    pub fn hls_output_path(&self) -> PathBuf {
        self.converter.hls_output_path().to_path_buf()
    }

    /// Playlist file on disk
    pub fn playlist_path(&self) -> PathBuf {
        self.converter.playlist_path()
    }

    /// Conversion state
    pub fn state(&self) -> ConversionState {
        self.converter.state()
    }

    /// Whether the session has not been stopped
    pub fn is_active(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    /// Subscribe to events published from now on.
    ///
    /// On a stopped session the stream yields [`Event::Closed`] and ends.
    pub fn events(&self) -> EventStream {
        self.bus.subscribe()
    }

    /// Relay another camera.
    ///
    /// Fails with [`RelayError::CameraUnavailable`] when that camera has no
    /// URL; the running conversion is left alone in that case.
    pub async fn switch_camera(&self, camera: Camera) -> RelayResult<()> {
        self.ensure_active("switch camera")?;

        let url = self.sources.require(camera)?.to_string();
        if self.camera() == camera {
            debug!("Session {} already on {} camera", self.id, camera);
            return Ok(());
        }

        self.converter.switch_to_url(&url).await?;
        *self.camera.write() = camera;
        info!("📷 Session {} switched to {} camera", self.id, camera);
        self.bus.publish(Event::CameraSwitched { camera });
        Ok(())
    }

    /// Raise a player action, such as a snapshot request, to subscribers
    pub fn trigger_action(&self, action: &str, camera: Option<Camera>, data: Value) -> RelayResult<()> {
        self.ensure_active("trigger action")?;
        debug!("Session {} action {}", self.id, action);
        self.bus.publish(Event::Action {
            action: action.to_string(),
            camera,
            data,
        });
        Ok(())
    }

    /// Conversion statistics tagged with the current camera
    pub async fn stats(&self) -> ConversionStats {
        let mut stats = self.converter.get_stats().await;
        stats.camera = Some(self.camera().to_string());
        stats
    }

    /// Health of the conversion
    pub async fn health(&self) -> HealthReport {
        let stats = self.stats().await;
        self.health.check(&stats, &self.playlist_path()).await
    }

    /// Stop the conversion, remove its output and release the session slot.
    ///
    /// Subscribers receive [`Event::Closed`]. Calling it again is a no-op.
    pub async fn stop(&self) -> RelayResult<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            debug!("Session {} already stopped", self.id);
            return Ok(());
        }

        info!("🛑 Stopping session {}", self.id);
        let result = self.converter.cleanup().await;
        self.shutdown().await;
        result.map_err(Into::into)
    }

    fn ensure_active(&self, operation: &str) -> RelayResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(RelayError::InvalidState {
                expected: "active session".to_string(),
                actual: format!("stopped session ({})", operation),
            })
        }
    }

    async fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let forwarder = self.forwarder.lock().take();
        if let Some(forwarder) = forwarder {
            let _ = forwarder.close.send(());
            if let Err(e) = forwarder.task.await {
                debug!("Event forwarder ended abnormally: {}", e);
            }
        }
        self.permit.lock().take();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("title", &self.config.title)
            .field("camera", &self.camera())
            .field("state", &self.state())
            .field("active", &self.is_active())
            .finish()
    }
}

fn spawn_forwarder(
    converter: Weak<RtspHlsConverter>,
    mut events: mpsc::UnboundedReceiver<ConverterEvent>,
    bus: EventBus,
) -> Forwarder {
    let (close, mut closed) = oneshot::channel();

    let task = tokio::spawn(async move {
        let convert = |event: ConverterEvent| match event {
            ConverterEvent::Status { status, message } => Event::StatusChanged { status, message },
            ConverterEvent::Error { error } => Event::Error {
                error,
                recoverable: converter
                    .upgrade()
                    .is_some_and(|c| c.state() != ConversionState::Failed),
            },
        };

        loop {
            tokio::select! {
                biased;

                event = events.recv() => match event {
                    Some(event) => bus.publish(convert(event)),
                    None => break,
                },

                _ = &mut closed => {
                    while let Ok(event) = events.try_recv() {
                        bus.publish(convert(event));
                    }
                    break;
                }
            }
        }

        bus.publish(Event::Closed);
        bus.close();
    });

    Forwarder { close, task }
}
