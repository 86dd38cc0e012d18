//! # RTSP HLS Diagnostics
//!
//! Logging initialisation and health evaluation of running conversions.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod health;
pub mod logging;

// Re-export main types
pub use health::{HealthMonitor, HealthReport, HealthStatus, HealthThresholds};
pub use logging::{init_logging, LoggingConfig};
