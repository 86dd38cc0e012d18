//! Camera identifiers and per-camera RTSP sources

use crate::error::RelayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two camera sources a session can relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Camera {
    /// Front camera
    #[default]
    Front,
    /// Rear camera
    Rear,
}

impl Camera {
    /// Wire name of the camera
    pub fn as_str(&self) -> &'static str {
        match self {
            Camera::Front => "front",
            Camera::Rear => "rear",
        }
    }

    /// The opposite camera
    pub fn other(&self) -> Camera {
        match self {
            Camera::Front => Camera::Rear,
            Camera::Rear => Camera::Front,
        }
    }

    /// Parse a camera name, falling back to [`Camera::Front`] for anything
    /// that is not a known camera.
    pub fn parse_lenient(name: &str) -> Camera {
        match name.parse() {
            Ok(camera) => camera,
            Err(_) => {
                tracing::warn!("Unknown camera {:?}, using front", name);
                Camera::Front
            }
        }
    }
}

impl fmt::Display for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Camera {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" => Ok(Camera::Front),
            "rear" | "back" => Ok(Camera::Rear),
            _ => Err(RelayError::UnknownCamera {
                name: s.to_string(),
            }),
        }
    }
}

/// RTSP source URLs for both cameras
///
/// An empty URL means the camera is not available.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSources {
    /// RTSP URL of the front camera
    pub front: String,
    /// RTSP URL of the rear camera
    pub rear: String,
}

impl CameraSources {
    /// Create sources from the two URLs
    pub fn new(front: impl Into<String>, rear: impl Into<String>) -> Self {
        Self {
            front: front.into(),
            rear: rear.into(),
        }
    }

    /// URL configured for a camera, empty when unavailable
    pub fn url_for(&self, camera: Camera) -> &str {
        match camera {
            Camera::Front => &self.front,
            Camera::Rear => &self.rear,
        }
    }

    /// Whether a camera has a usable URL
    pub fn has(&self, camera: Camera) -> bool {
        !self.url_for(camera).trim().is_empty()
    }

    /// Resolve the URL for a camera or fail with [`RelayError::CameraUnavailable`]
    pub fn require(&self, camera: Camera) -> Result<&str, RelayError> {
        if self.has(camera) {
            Ok(self.url_for(camera))
        } else {
            Err(RelayError::CameraUnavailable {
                camera: camera.to_string(),
            })
        }
    }

    /// Cameras that have a URL, front first
    pub fn available(&self) -> Vec<Camera> {
        [Camera::Front, Camera::Rear]
            .into_iter()
            .filter(|camera| self.has(*camera))
            .collect()
    }
}
