//! Session registry bounded by the resource manager

use crate::event::{EventBus, EventStream};
use crate::session::{Session, SessionBuilder};
use crate::{
    CameraSources, GlobalConfig, RelayError, RelayResult, ResourceManager, ResourceWarning,
    SessionConfig,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rtsphls_bridge::PlayRequest;
use rtsphls_diagnostics::HealthReport;
use rtsphls_media::ConversionStats;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Summary of one session, as served by the HTTP surface
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Session id
    pub id: Uuid,
    /// Player title
    pub title: String,
    /// Camera currently relayed
    pub camera: String,
    /// When the session started
    pub started_at: DateTime<Utc>,
    /// Conversion statistics
    pub stats: ConversionStats,
    /// Health evaluation
    pub health: HealthReport,
}

/// Registry of running sessions
#[derive(Debug)]
pub struct Relay {
    config: GlobalConfig,
    sessions: DashMap<Uuid, Arc<Session>>,
    resources: ResourceManager,
    warnings: Mutex<Option<mpsc::UnboundedReceiver<ResourceWarning>>>,
}

impl Relay {
    /// Create an empty relay
    pub fn new(config: GlobalConfig) -> Self {
        let (resources, warnings) = ResourceManager::new(config.effective_limits());
        Self {
            config,
            sessions: DashMap::new(),
            resources,
            warnings: Mutex::new(Some(warnings)),
        }
    }

    /// Relay configuration
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// Resource manager bounding the sessions
    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    /// Take the resource warning channel; `None` after the first call
    pub fn take_resource_warnings(&self) -> Option<mpsc::UnboundedReceiver<ResourceWarning>> {
        self.warnings.lock().take()
    }

    /// Measure HLS disk usage periodically and report warnings
    pub fn start_monitoring(&self) {
        self.resources
            .start_monitoring(self.config.converter.output_root.clone());
    }

    /// Builder for a new session on this relay
    pub fn session_builder(self: &Arc<Self>) -> SessionBuilder {
        SessionBuilder::new(self.clone())
    }

    /// Start a session for a bridge `play` request
    pub async fn start_session(&self, request: &PlayRequest) -> RelayResult<Arc<Session>> {
        let (sources, config) = request_parts(request);
        self.start_with(sources, config, None).await
    }

    /// Start a session for a bridge `play` request, subscribing to its
    /// events before the conversion starts so `starting` is not missed
    pub async fn start_session_with_events(
        &self,
        request: &PlayRequest,
    ) -> RelayResult<(Arc<Session>, EventStream)> {
        let (sources, config) = request_parts(request);
        let bus = EventBus::default();
        let events = bus.subscribe();
        let session = self.start_with(sources, config, Some(bus)).await?;
        Ok((session, events))
    }

    pub(crate) async fn start_with(
        &self,
        sources: CameraSources,
        config: SessionConfig,
        bus: Option<EventBus>,
    ) -> RelayResult<Arc<Session>> {
        self.prune();

        let id = Uuid::new_v4();
        let permit = self.resources.try_acquire(id)?;
        let hls_url = self.config.hls_url_for(&id.to_string());

        let session = Session::start(
            permit,
            sources,
            config,
            self.config.converter.clone(),
            hls_url,
            bus.unwrap_or_default(),
        )
        .await?;

        self.sessions.insert(id, session.clone());
        info!(
            "Relay has {} active sessions",
            self.resources.active_sessions()
        );
        Ok(session)
    }

    /// Look up a running session
    pub fn session(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .filter(|session| session.is_active())
    }

    /// Stop and forget a session
    pub async fn stop_session(&self, id: Uuid) -> RelayResult<()> {
        let (_, session) = self
            .sessions
            .remove(&id)
            .ok_or_else(|| RelayError::SessionNotFound {
                session_id: id.to_string(),
            })?;
        session.stop().await
    }

    /// Stop every session; failures are logged and do not stop the sweep
    pub async fn stop_all(&self) {
        let ids: Vec<Uuid> = self.sessions.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Err(e) = self.stop_session(id).await {
                warn!("Failed to stop session {}: {}", id, e);
            }
        }
    }

    /// Number of sessions holding a slot
    pub fn active_sessions(&self) -> usize {
        self.resources.active_sessions() as usize
    }

    /// Ids of the running sessions
    pub fn session_ids(&self) -> Vec<Uuid> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().is_active())
            .map(|entry| *entry.key())
            .collect()
    }

    /// Statistics and health of every running session
    pub async fn stats(&self) -> Vec<SessionInfo> {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|session| session.is_active())
            .collect();

        let mut infos = Vec::with_capacity(sessions.len());
        for session in sessions {
            infos.push(session_info(&session).await);
        }
        infos.sort_by_key(|info| info.started_at);
        infos
    }

    fn prune(&self) {
        self.sessions.retain(|_, session| session.is_active());
    }
}

/// Summary of one session
pub async fn session_info(session: &Session) -> SessionInfo {
    let stats = session.stats().await;
    let health = session.health().await;
    SessionInfo {
        id: session.id(),
        title: session.title().to_string(),
        camera: session.camera().to_string(),
        started_at: session.started_at(),
        stats,
        health,
    }
}

pub(crate) fn request_parts(request: &PlayRequest) -> (CameraSources, SessionConfig) {
    let sources = CameraSources::new(request.front_url.clone(), request.rear_url.clone());
    let config = SessionConfig {
        title: request.title.clone(),
        api_base_url: request.api_base_url.clone(),
        initial_camera: crate::Camera::parse_lenient(&request.initial_camera),
    };
    (sources, config)
}
