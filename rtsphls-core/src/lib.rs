//! # RTSP HLS Core
//!
//! Foundational types shared by every crate of the relay: the error type with
//! stable wire codes, camera identifiers, RTSP URL helpers and the resource
//! manager that bounds the number of concurrent transcoding sessions.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod camera;
pub mod error;
pub mod resource;
pub mod url;

// Re-export main types
pub use camera::{Camera, CameraSources};
pub use error::{RelayError, RelayResult};
pub use resource::{
    ResourceLimits, ResourceManager, ResourceMonitorConfig, ResourceUsage, ResourceWarning,
    SessionPermit, WarningSeverity,
};
pub use url::{is_rtsp_url, redact_credentials};
