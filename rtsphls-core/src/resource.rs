//! Resource management for the relay
//!
//! Bounds the number of concurrent transcoding sessions, tracks the disk used
//! by HLS output and reports warnings when usage approaches the configured
//! limits.

use crate::error::RelayError;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Resource limits configuration
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Maximum number of concurrent sessions (None = unlimited)
    pub max_sessions: Option<u32>,
    /// Maximum disk used by HLS output in MB (None = unlimited)
    pub max_hls_disk_mb: Option<u64>,
    /// How long a stopping session may take to release its resources
    pub cleanup_timeout: Duration,
    /// Warning threshold (fraction of limit)
    pub warning_threshold: f32,
}

impl ResourceLimits {
    /// Mobile-sized limits: a single viewer watching one camera at a time
    pub fn mobile() -> Self {
        Self {
            max_sessions: Some(2),
            max_hls_disk_mb: Some(200),
            cleanup_timeout: Duration::from_secs(5),
            warning_threshold: 0.8,
        }
    }

    /// Desktop-sized limits
    pub fn desktop() -> Self {
        Self {
            max_sessions: Some(8),
            max_hls_disk_mb: Some(1024),
            cleanup_timeout: Duration::from_secs(10),
            warning_threshold: 0.85,
        }
    }

    /// Server-sized limits for a shared relay
    pub fn server() -> Self {
        Self {
            max_sessions: Some(64),
            max_hls_disk_mb: Some(8192),
            cleanup_timeout: Duration::from_secs(30),
            warning_threshold: 0.9,
        }
    }

    /// Unlimited resources (for testing)
    pub fn unlimited() -> Self {
        Self {
            max_sessions: None,
            max_hls_disk_mb: None,
            cleanup_timeout: Duration::from_secs(60),
            warning_threshold: 0.95,
        }
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::desktop()
    }
}

/// Current resource usage
#[derive(Debug, Clone)]
pub struct ResourceUsage {
    /// Number of sessions holding a permit
    pub active_sessions: u32,
    /// Bytes written under the HLS output root
    pub hls_disk_bytes: u64,
    /// Timestamp when usage was measured
    pub measured_at: Instant,
}

impl ResourceUsage {
    /// HLS disk usage in whole megabytes
    pub fn hls_disk_mb(&self) -> u64 {
        self.hls_disk_bytes / (1024 * 1024)
    }
}

impl Default for ResourceUsage {
    fn default() -> Self {
        Self {
            active_sessions: 0,
            hls_disk_bytes: 0,
            measured_at: Instant::now(),
        }
    }
}

/// Resource warning types
#[derive(Debug, Clone)]
pub enum ResourceWarning {
    /// Session count approaching limit
    SessionsApproachingLimit {
        /// Current number of sessions
        current: u32,
        /// Session limit
        limit: u32,
        /// Fraction of limit being used
        percentage: f32,
    },
    /// HLS output approaching disk limit
    DiskApproachingLimit {
        /// Current usage in MB
        current_mb: u64,
        /// Limit in MB
        limit_mb: u64,
        /// Fraction of limit being used
        percentage: f32,
    },
}

impl ResourceWarning {
    /// Get severity level of the warning
    pub fn severity(&self) -> WarningSeverity {
        let percentage = match self {
            ResourceWarning::SessionsApproachingLimit { percentage, .. }
            | ResourceWarning::DiskApproachingLimit { percentage, .. } => *percentage,
        };

        if percentage >= 0.95 {
            WarningSeverity::Critical
        } else if percentage >= 0.9 {
            WarningSeverity::High
        } else if percentage >= 0.8 {
            WarningSeverity::Medium
        } else {
            WarningSeverity::Low
        }
    }

    /// Get recommended action for this warning
    pub fn recommended_action(&self) -> String {
        match self {
            ResourceWarning::SessionsApproachingLimit { .. } => {
                "Stop idle sessions or raise the session limit".to_string()
            }
            ResourceWarning::DiskApproachingLimit { .. } => {
                "Reduce hls_list_size or clean up stopped session output".to_string()
            }
        }
    }
}

/// Warning severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WarningSeverity {
    /// Low severity warning
    Low,
    /// Medium severity warning
    Medium,
    /// High severity warning
    High,
    /// Critical severity warning
    Critical,
}

/// Resource monitoring configuration
#[derive(Debug, Clone)]
pub struct ResourceMonitorConfig {
    /// How often to collect resource metrics
    pub collection_interval: Duration,
    /// How long to keep historical metrics
    pub history_retention: Duration,
}

impl Default for ResourceMonitorConfig {
    fn default() -> Self {
        Self {
            collection_interval: Duration::from_secs(5),
            history_retention: Duration::from_secs(300), // 5 minutes
        }
    }
}

/// Proof that a session was admitted under the session limit.
///
/// Dropping the permit releases the slot.
#[derive(Debug)]
pub struct SessionPermit {
    session_id: Uuid,
    sessions: Arc<DashMap<Uuid, Instant>>,
    _permit: OwnedSemaphorePermit,
}

impl SessionPermit {
    /// Session this permit was issued for
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}

impl Drop for SessionPermit {
    fn drop(&mut self) {
        self.sessions.remove(&self.session_id);
        debug!("Released session permit {}", self.session_id);
    }
}

/// Main resource manager
#[derive(Debug)]
pub struct ResourceManager {
    /// Resource limits configuration
    limits: ResourceLimits,
    /// Session slots
    semaphore: Arc<Semaphore>,
    /// Sessions currently holding a permit, with admission time
    sessions: Arc<DashMap<Uuid, Instant>>,
    /// Current resource usage
    current_usage: Arc<RwLock<ResourceUsage>>,
    /// Resource usage history
    usage_history: Arc<RwLock<Vec<ResourceUsage>>>,
    /// Monitor configuration
    monitor_config: ResourceMonitorConfig,
    /// Warning channel sender
    warning_tx: mpsc::UnboundedSender<ResourceWarning>,
    /// Monitoring task handle
    monitor_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ResourceManager {
    /// Create a new resource manager
    pub fn new(limits: ResourceLimits) -> (Self, mpsc::UnboundedReceiver<ResourceWarning>) {
        Self::with_monitor_config(limits, ResourceMonitorConfig::default())
    }

    /// Create a resource manager with a custom monitoring cadence
    pub fn with_monitor_config(
        limits: ResourceLimits,
        monitor_config: ResourceMonitorConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ResourceWarning>) {
        let (warning_tx, warning_rx) = mpsc::unbounded_channel();
        let slots = limits
            .max_sessions
            .map(|max| max as usize)
            .unwrap_or(Semaphore::MAX_PERMITS);

        let manager = Self {
            limits,
            semaphore: Arc::new(Semaphore::new(slots)),
            sessions: Arc::new(DashMap::new()),
            current_usage: Arc::new(RwLock::new(ResourceUsage::default())),
            usage_history: Arc::new(RwLock::new(Vec::new())),
            monitor_config,
            warning_tx,
            monitor_handle: Mutex::new(None),
        };

        (manager, warning_rx)
    }

    /// Admit a new session, failing immediately when every slot is taken
    pub fn try_acquire(&self, session_id: Uuid) -> Result<SessionPermit, RelayError> {
        let permit = self
            .semaphore
            .clone()
            .try_acquire_owned()
            .map_err(|_| RelayError::SessionLimitExceeded {
                limit: self.limits.max_sessions.unwrap_or(u32::MAX),
            })?;

        self.sessions.insert(session_id, Instant::now());
        self.current_usage.write().active_sessions = self.sessions.len() as u32;
        debug!("Admitted session {} ({} active)", session_id, self.sessions.len());

        Ok(SessionPermit {
            session_id,
            sessions: self.sessions.clone(),
            _permit: permit,
        })
    }

    /// Number of sessions currently holding a permit
    pub fn active_sessions(&self) -> u32 {
        self.sessions.len() as u32
    }

    /// Slots still available (None when unlimited)
    pub fn available_slots(&self) -> Option<u32> {
        self.limits
            .max_sessions
            .map(|_| self.semaphore.available_permits() as u32)
    }

    /// Start periodic usage collection over the HLS output root
    pub fn start_monitoring(&self, hls_root: PathBuf) {
        let mut handle_slot = self.monitor_handle.lock();
        if handle_slot.is_some() {
            return; // Already monitoring
        }

        let sessions = self.sessions.clone();
        let current_usage = self.current_usage.clone();
        let usage_history = self.usage_history.clone();
        let limits = self.limits.clone();
        let warning_tx = self.warning_tx.clone();
        let interval_duration = self.monitor_config.collection_interval;
        let history_retention = self.monitor_config.history_retention;

        let handle = tokio::spawn(async move {
            let mut interval = interval(interval_duration);

            loop {
                interval.tick().await;

                let root = hls_root.clone();
                let hls_disk_bytes = tokio::task::spawn_blocking(move || dir_size(&root))
                    .await
                    .unwrap_or(0);

                let usage = ResourceUsage {
                    active_sessions: sessions.len() as u32,
                    hls_disk_bytes,
                    measured_at: Instant::now(),
                };

                *current_usage.write() = usage.clone();

                {
                    let mut history = usage_history.write();
                    history.push(usage.clone());
                    if let Some(cutoff_time) = Instant::now().checked_sub(history_retention) {
                        history.retain(|entry| entry.measured_at > cutoff_time);
                    }
                }

                for warning in Self::check_for_warnings(&usage, &limits) {
                    warn!(
                        "Resource warning ({:?}): {:?}. {}",
                        warning.severity(),
                        warning,
                        warning.recommended_action()
                    );
                    if warning_tx.send(warning).is_err() {
                        return; // Receiver dropped, stop monitoring
                    }
                }
            }
        });

        *handle_slot = Some(handle);
        info!("Started resource monitoring");
    }

    /// Stop resource monitoring
    pub fn stop_monitoring(&self) {
        if let Some(handle) = self.monitor_handle.lock().take() {
            handle.abort();
            info!("Stopped resource monitoring");
        }
    }

    /// Get current resource usage
    pub fn current_usage(&self) -> ResourceUsage {
        let mut usage = self.current_usage.read().clone();
        usage.active_sessions = self.active_sessions();
        usage
    }

    /// Get resource usage history
    pub fn usage_history(&self) -> Vec<ResourceUsage> {
        self.usage_history.read().clone()
    }

    /// Check if approaching any resource limits
    pub fn approaching_limits(&self) -> Vec<ResourceWarning> {
        Self::check_for_warnings(&self.current_usage(), &self.limits)
    }

    /// Check if current usage is within limits
    pub fn check_limits(&self) -> Result<(), RelayError> {
        let usage = self.current_usage();

        if let Some(limit) = self.limits.max_hls_disk_mb {
            if usage.hls_disk_mb() > limit {
                return Err(RelayError::ResourceLimit {
                    resource: format!(
                        "HLS disk usage ({} MB) exceeds limit ({} MB)",
                        usage.hls_disk_mb(),
                        limit
                    ),
                });
            }
        }

        Ok(())
    }

    /// Get current resource limits
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Check for resource warnings
    pub fn check_for_warnings(
        usage: &ResourceUsage,
        limits: &ResourceLimits,
    ) -> Vec<ResourceWarning> {
        let mut warnings = Vec::new();

        if let Some(limit) = limits.max_sessions {
            let percentage = usage.active_sessions as f32 / limit.max(1) as f32;
            if percentage >= limits.warning_threshold {
                warnings.push(ResourceWarning::SessionsApproachingLimit {
                    current: usage.active_sessions,
                    limit,
                    percentage,
                });
            }
        }

        if let Some(limit) = limits.max_hls_disk_mb {
            let current_mb = usage.hls_disk_mb();
            let percentage = current_mb as f32 / limit.max(1) as f32;
            if percentage >= limits.warning_threshold {
                warnings.push(ResourceWarning::DiskApproachingLimit {
                    current_mb,
                    limit_mb: limit,
                    percentage,
                });
            }
        }

        warnings
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        if let Some(handle) = self.monitor_handle.get_mut().take() {
            handle.abort();
        }
    }
}

/// Total size of regular files below `path`; missing paths count as empty
pub fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };

    entries
        .flatten()
        .map(|entry| match entry.file_type() {
            Ok(file_type) if file_type.is_dir() => dir_size(&entry.path()),
            Ok(_) => entry.metadata().map(|m| m.len()).unwrap_or(0),
            Err(_) => 0,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_limits_presets() {
        let mobile = ResourceLimits::mobile();
        let desktop = ResourceLimits::desktop();
        let server = ResourceLimits::server();

        assert!(mobile.max_sessions.unwrap() < desktop.max_sessions.unwrap());
        assert!(mobile.max_hls_disk_mb.unwrap() < desktop.max_hls_disk_mb.unwrap());
        assert!(server.max_sessions.unwrap() > desktop.max_sessions.unwrap());
        assert!(ResourceLimits::unlimited().max_sessions.is_none());
    }

    #[test]
    fn test_resource_warning_severity() {
        let warning = ResourceWarning::SessionsApproachingLimit {
            current: 19,
            limit: 20,
            percentage: 0.95,
        };
        assert_eq!(warning.severity(), WarningSeverity::Critical);
        assert!(!warning.recommended_action().is_empty());

        let warning = ResourceWarning::DiskApproachingLimit {
            current_mb: 85,
            limit_mb: 100,
            percentage: 0.85,
        };
        assert_eq!(warning.severity(), WarningSeverity::Medium);
    }

    #[tokio::test]
    async fn test_permits_bound_sessions() {
        let mut limits = ResourceLimits::mobile();
        limits.max_sessions = Some(2);
        let (manager, _warning_rx) = ResourceManager::new(limits);

        let first = manager.try_acquire(Uuid::new_v4()).unwrap();
        let _second = manager.try_acquire(Uuid::new_v4()).unwrap();
        assert_eq!(manager.active_sessions(), 2);
        assert_eq!(manager.available_slots(), Some(0));

        let third = manager.try_acquire(Uuid::new_v4());
        assert!(matches!(
            third,
            Err(RelayError::SessionLimitExceeded { limit: 2 })
        ));

        drop(first);
        assert_eq!(manager.active_sessions(), 1);
        assert!(manager.try_acquire(Uuid::new_v4()).is_ok());
    }

    #[test]
    fn test_check_for_warnings() {
        let limits = ResourceLimits::mobile();
        let usage = ResourceUsage {
            active_sessions: 2,                  // 100% of 2 sessions
            hls_disk_bytes: 190 * 1024 * 1024,   // 95% of 200 MB
            measured_at: Instant::now(),
        };

        let warnings = ResourceManager::check_for_warnings(&usage, &limits);
        assert_eq!(warnings.len(), 2);
        assert!(warnings
            .iter()
            .any(|w| matches!(w, ResourceWarning::SessionsApproachingLimit { current: 2, .. })));
        assert!(warnings
            .iter()
            .any(|w| matches!(w, ResourceWarning::DiskApproachingLimit { current_mb: 190, .. })));

        let idle = ResourceUsage::default();
        assert!(ResourceManager::check_for_warnings(&idle, &limits).is_empty());
    }

    #[test]
    fn test_dir_size_counts_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), vec![0u8; 100]).unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/b.ts"), vec![0u8; 50]).unwrap();

        assert_eq!(dir_size(dir.path()), 150);
        assert_eq!(dir_size(&dir.path().join("missing")), 0);
    }
}
