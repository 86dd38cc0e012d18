//! Error types for the RTSP HLS relay

use std::time::Duration;
use thiserror::Error;

/// Result alias used across the relay crates
pub type RelayResult<T> = Result<T, RelayError>;

/// Main error type for relay operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// Initialization error
    #[error("Initialization failed: {reason}")]
    Initialization {
        /// Reason for initialization failure
        reason: String,
    },

    /// Missing configuration error
    #[error("Missing required configuration: {field}")]
    MissingConfiguration {
        /// Missing configuration field
        field: String,
    },

    /// Invalid state error
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Invalid operation error
    #[error("Invalid operation: {operation}")]
    InvalidOperation {
        /// Operation that was invalid
        operation: String,
    },

    /// Resource limit exceeded
    #[error("Resource limit exceeded: {resource}")]
    ResourceLimit {
        /// Resource that exceeded limit
        resource: String,
    },

    /// Too many concurrent sessions
    #[error("Session limit exceeded: {limit} active sessions")]
    SessionLimitExceeded {
        /// Maximum number of sessions allowed
        limit: u32,
    },

    /// Session not found
    #[error("Session not found: {session_id}")]
    SessionNotFound {
        /// Session ID that was not found
        session_id: String,
    },

    /// Camera name could not be parsed
    #[error("Unknown camera: {name}")]
    UnknownCamera {
        /// The rejected camera name
        name: String,
    },

    /// Camera has no source URL configured
    #[error("Camera {camera} has no source URL")]
    CameraUnavailable {
        /// Camera that was requested
        camera: String,
    },

    /// FFmpeg binary is missing or unusable
    #[error("FFmpeg unavailable: {reason}")]
    FfmpegUnavailable {
        /// Why the probe failed
        reason: String,
    },

    /// Conversion process error
    #[error("Conversion failed: {reason}")]
    Conversion {
        /// Reason for conversion failure
        reason: String,
    },

    /// Operation timed out error
    #[error("Operation timed out: {operation} after {duration:?}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Duration after which timeout occurred
        duration: Duration,
    },

    /// Failure reported by the native side of the bridge
    #[error("Native call failed: {reason}")]
    NativeFailure {
        /// Message returned by the native handler
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// Server start failed
    #[error("Failed to start server on {address}: {source}")]
    ServerStartFailed {
        /// Address that failed to bind
        address: std::net::SocketAddr,
        /// Underlying error
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Invalid message format
    #[error("Invalid message format: {message}, error: {source}")]
    InvalidMessage {
        /// Invalid message content
        message: String,
        /// Parsing error
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl RelayError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> String {
        match self {
            RelayError::Initialization { .. } => "INITIALIZATION_FAILED".to_string(),
            RelayError::MissingConfiguration { .. } => "MISSING_CONFIGURATION".to_string(),
            RelayError::InvalidState { .. } => "INVALID_STATE".to_string(),
            RelayError::InvalidOperation { .. } => "INVALID_OPERATION".to_string(),
            RelayError::ResourceLimit { .. } => "RESOURCE_LIMIT_EXCEEDED".to_string(),
            RelayError::SessionLimitExceeded { .. } => "SESSION_LIMIT_EXCEEDED".to_string(),
            RelayError::SessionNotFound { .. } => "SESSION_NOT_FOUND".to_string(),
            RelayError::UnknownCamera { .. } => "UNKNOWN_CAMERA".to_string(),
            RelayError::CameraUnavailable { .. } => "CAMERA_UNAVAILABLE".to_string(),
            RelayError::FfmpegUnavailable { .. } => "FFMPEG_UNAVAILABLE".to_string(),
            RelayError::Conversion { .. } => "CONVERSION_FAILED".to_string(),
            RelayError::Timeout { .. } => "TIMEOUT".to_string(),
            RelayError::NativeFailure { .. } => "NATIVE_FAILURE".to_string(),
            RelayError::Io { .. } => "IO_ERROR".to_string(),
            RelayError::ServerStartFailed { .. } => "SERVER_START_FAILED".to_string(),
            RelayError::InvalidMessage { .. } => "INVALID_MESSAGE".to_string(),
        }
    }

    /// Whether retrying the same operation later can succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RelayError::SessionLimitExceeded { .. }
                | RelayError::ResourceLimit { .. }
                | RelayError::Conversion { .. }
                | RelayError::Timeout { .. }
                | RelayError::Io { .. }
        )
    }
}
