//! Session health evaluation
//!
//! A conversion is judged from its statistics and from how recently FFmpeg
//! rewrote the playlist. A live HLS muxer rewrites the playlist once per
//! segment, so a playlist that stops changing means the source stalled even
//! if FFmpeg is still running.

use rtsphls_media::playlist::playlist_age;
use rtsphls_media::{ConversionState, ConversionStats};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Health classification of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Producing segments at real-time speed
    Healthy,
    /// Working, but restarting, starting up or falling behind
    Degraded,
    /// Failed or stalled
    Unhealthy,
    /// Not running on purpose
    Stopped,
}

/// Thresholds used by [`HealthMonitor`]
#[derive(Debug, Clone)]
pub struct HealthThresholds {
    /// Playlist age after which the stream counts as stalled
    pub stale_after: Duration,
    /// Processing speed below which the stream counts as falling behind
    pub min_speed: f32,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(10),
            min_speed: 0.9,
        }
    }
}

/// Outcome of one health evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Overall status
    pub status: HealthStatus,
    /// Why the status is not healthy; empty when healthy
    pub reasons: Vec<String>,
    /// Seconds since the playlist was last written, when it exists
    pub playlist_age_secs: Option<f64>,
}

impl HealthReport {
    fn new(playlist_age: Option<Duration>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            reasons: Vec::new(),
            playlist_age_secs: playlist_age.map(|age| age.as_secs_f64()),
        }
    }

    fn flag(&mut self, status: HealthStatus, reason: String) {
        self.status = self.status.max(status);
        self.reasons.push(reason);
    }

    /// Whether players can be expected to play
    pub fn is_serving(&self) -> bool {
        matches!(self.status, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

/// Evaluates conversion health
#[derive(Debug, Clone, Default)]
pub struct HealthMonitor {
    thresholds: HealthThresholds,
}

impl HealthMonitor {
    /// Create a monitor with custom thresholds
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self { thresholds }
    }

    /// Thresholds in use
    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Judge a stats snapshot given the playlist's age
    pub fn evaluate(&self, stats: &ConversionStats, playlist_age: Option<Duration>) -> HealthReport {
        let mut report = HealthReport::new(playlist_age);

        match stats.state {
            ConversionState::Idle | ConversionState::Stopped => {
                report.status = HealthStatus::Stopped;
                return report;
            }
            ConversionState::Failed => {
                let reason = stats
                    .last_error
                    .as_deref()
                    .map(|e| format!("conversion failed: {}", e))
                    .unwrap_or_else(|| "conversion failed".to_string());
                report.flag(HealthStatus::Unhealthy, reason);
                return report;
            }
            ConversionState::Starting => {
                report.flag(HealthStatus::Degraded, "waiting for first segment".to_string());
                return report;
            }
            ConversionState::Switching => {
                report.flag(HealthStatus::Degraded, "switching source".to_string());
                return report;
            }
            ConversionState::Reconnecting => {
                report.flag(HealthStatus::Degraded, "reconnecting to source".to_string());
            }
            ConversionState::Converting => {}
        }

        match playlist_age {
            None => report.flag(HealthStatus::Unhealthy, "playlist missing".to_string()),
            Some(age) if age > self.thresholds.stale_after => report.flag(
                HealthStatus::Unhealthy,
                format!("playlist not updated for {}s", age.as_secs()),
            ),
            Some(_) => {}
        }

        if stats.restarts > 0 {
            report.flag(
                HealthStatus::Degraded,
                format!("ffmpeg restarted {} times", stats.restarts),
            );
        }

        if let Some(speed) = stats.speed.filter(|s| *s < self.thresholds.min_speed) {
            report.flag(
                HealthStatus::Degraded,
                format!("processing at {:.2}x real time", speed),
            );
        }

        report
    }

    /// Judge a stats snapshot, reading the playlist age from disk
    pub async fn check(&self, stats: &ConversionStats, playlist_path: &Path) -> HealthReport {
        let age = playlist_age(playlist_path).await;
        let report = self.evaluate(stats, age);
        if !report.reasons.is_empty() {
            tracing::debug!("Health {:?}: {}", report.status, report.reasons.join("; "));
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converting() -> ConversionStats {
        ConversionStats {
            is_converting: true,
            state: ConversionState::Converting,
            speed: Some(1.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_healthy_stream() {
        let report = HealthMonitor::default().evaluate(&converting(), Some(Duration::from_secs(2)));
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.reasons.is_empty());
        assert!(report.is_serving());
    }

    #[test]
    fn test_stale_playlist_is_unhealthy() {
        let monitor = HealthMonitor::default();
        let report = monitor.evaluate(&converting(), Some(Duration::from_secs(11)));
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(report.reasons[0].contains("11s"));

        let report = monitor.evaluate(&converting(), None);
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(!report.is_serving());
    }

    #[test]
    fn test_degraded_conditions() {
        let monitor = HealthMonitor::default();

        let mut stats = converting();
        stats.restarts = 2;
        stats.speed = Some(0.5);
        let report = monitor.evaluate(&stats, Some(Duration::from_secs(1)));
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.reasons.len(), 2);

        stats.state = ConversionState::Starting;
        let report = monitor.evaluate(&stats, None);
        assert_eq!(report.status, HealthStatus::Degraded);
    }

    #[test]
    fn test_unhealthy_wins_over_degraded() {
        let mut stats = converting();
        stats.state = ConversionState::Reconnecting;
        stats.restarts = 1;
        let report = HealthMonitor::default().evaluate(&stats, Some(Duration::from_secs(30)));
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.reasons.len(), 3);
    }

    #[test]
    fn test_stopped_and_failed() {
        let monitor = HealthMonitor::default();

        let stopped = ConversionStats {
            state: ConversionState::Stopped,
            ..Default::default()
        };
        let report = monitor.evaluate(&stopped, None);
        assert_eq!(report.status, HealthStatus::Stopped);
        assert!(report.reasons.is_empty());

        let failed = ConversionStats {
            state: ConversionState::Failed,
            last_error: Some("Connection refused".to_string()),
            ..Default::default()
        };
        let report = monitor.evaluate(&failed, None);
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.reasons, vec!["conversion failed: Connection refused"]);
    }

    #[test]
    fn test_report_serialization() {
        let report = HealthMonitor::default().evaluate(&converting(), Some(Duration::from_millis(1500)));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["playlistAgeSecs"], 1.5);
    }
}
