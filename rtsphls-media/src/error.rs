//! Media error types and handling
//!
//! Errors raised while probing, spawning or supervising FFmpeg and while
//! reading HLS output.

use rtsphls_core::RelayError;
use thiserror::Error;

/// Main error type for media operations
#[derive(Error, Debug)]
pub enum MediaError {
    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// FFmpeg binary could not be found
    #[error("ffmpeg not found at {path} - is it installed?")]
    FfmpegNotFound {
        /// Path or command name that was tried
        path: String,
    },

    /// FFmpeg exited or reported an error
    #[error("ffmpeg failed: {reason}")]
    FfmpegFailed {
        /// Failure reason, usually the last stderr line
        reason: String,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// Playlist text could not be parsed
    #[error("Invalid playlist: {reason}")]
    InvalidPlaylist {
        /// What was wrong with the playlist
        reason: String,
    },

    /// Operation not allowed in the current conversion state
    #[error("Invalid state: {message}")]
    InvalidState {
        /// State error message
        message: String,
    },

    /// Timeout error
    #[error("Operation timed out after {duration:?}")]
    Timeout {
        /// Duration after which timeout occurred
        duration: std::time::Duration,
    },
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::Io { .. } => true,
            MediaError::Timeout { .. } => true,
            MediaError::FfmpegFailed { .. } => true,
            MediaError::FfmpegNotFound { .. } => false,
            MediaError::InvalidConfiguration { .. } => false,
            MediaError::InvalidPlaylist { .. } => false,
            MediaError::InvalidState { .. } => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::Io { .. } => ErrorCategory::System,
            MediaError::FfmpegNotFound { .. } => ErrorCategory::Platform,
            MediaError::FfmpegFailed { .. } => ErrorCategory::Process,
            MediaError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
            MediaError::InvalidPlaylist { .. } => ErrorCategory::Format,
            MediaError::InvalidState { .. } => ErrorCategory::State,
            MediaError::Timeout { .. } => ErrorCategory::System,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// System-level errors (I/O, timeouts)
    System,
    /// Missing platform support such as the FFmpeg binary
    Platform,
    /// FFmpeg process failures
    Process,
    /// Configuration and parameter errors
    Configuration,
    /// Format and data structure errors
    Format,
    /// State management errors
    State,
}

impl From<MediaError> for RelayError {
    fn from(error: MediaError) -> Self {
        match error {
            MediaError::Io { source } => RelayError::Io { source },
            MediaError::FfmpegNotFound { path } => RelayError::FfmpegUnavailable {
                reason: format!("ffmpeg not found at {}", path),
            },
            MediaError::Timeout { duration } => RelayError::Timeout {
                operation: "conversion".to_string(),
                duration,
            },
            MediaError::InvalidState { message } => RelayError::InvalidOperation {
                operation: message,
            },
            other => RelayError::Conversion {
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let io_error = MediaError::Io {
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        };
        assert_eq!(io_error.category(), ErrorCategory::System);
        assert!(io_error.is_recoverable());

        let missing = MediaError::FfmpegNotFound {
            path: "ffmpeg".to_string(),
        };
        assert_eq!(missing.category(), ErrorCategory::Platform);
        assert!(!missing.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let error = MediaError::FfmpegNotFound {
            path: "/opt/ffmpeg".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "ffmpeg not found at /opt/ffmpeg - is it installed?"
        );
    }

    #[test]
    fn test_into_relay_error() {
        let relay: RelayError = MediaError::FfmpegNotFound {
            path: "ffmpeg".to_string(),
        }
        .into();
        assert_eq!(relay.error_code(), "FFMPEG_UNAVAILABLE");

        let relay: RelayError = MediaError::FfmpegFailed {
            reason: "Connection refused".to_string(),
        }
        .into();
        assert_eq!(relay.error_code(), "CONVERSION_FAILED");
    }
}
