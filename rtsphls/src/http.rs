//! HLS HTTP surface
//!
//! Serves each session's playlist and segments, plus JSON statistics, from
//! the directories the converters write into.

use crate::relay::session_info;
use crate::session::Session;
use crate::Relay;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use rtsphls_media::MediaPlaylist;
use serde_json::json;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

/// Errors returned by the HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// No running session with this id
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    /// Requested file is not a plain segment name
    #[error("Invalid segment name: {0}")]
    InvalidSegment(String),
    /// Segment not on disk (yet or any more)
    #[error("Segment not found: {0}")]
    SegmentNotFound(String),
    /// FFmpeg has not listed a segment yet
    #[error("Playlist not ready for session {0}")]
    PlaylistNotReady(String),
    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Create the HLS router
pub fn router(relay: Arc<Relay>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/sessions", get(sessions_handler))
        .route("/sessions/{id}/stats", get(session_stats_handler))
        .route("/sessions/{id}/{file}", get(file_handler))
        .with_state(relay)
}

/// Whether `name` is a plain `*.ts` file name
pub fn is_segment_name(name: &str) -> bool {
    name.len() > 3
        && name.ends_with(".ts")
        && !name.starts_with('.')
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn find_session(relay: &Relay, id: &str) -> Result<Arc<Session>, HttpError> {
    Uuid::parse_str(id)
        .ok()
        .and_then(|id| relay.session(id))
        .ok_or_else(|| HttpError::SessionNotFound(id.to_string()))
}

async fn health_handler(State(relay): State<Arc<Relay>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "sessions": relay.active_sessions(),
        "availableSlots": relay.resources().available_slots(),
    }))
}

async fn sessions_handler(State(relay): State<Arc<Relay>>) -> impl IntoResponse {
    Json(relay.stats().await)
}

async fn session_stats_handler(
    Path(id): Path<String>,
    State(relay): State<Arc<Relay>>,
) -> Result<impl IntoResponse, HttpErrorResponse> {
    let session = find_session(&relay, &id)?;
    Ok(Json(session_info(&session).await))
}

async fn file_handler(
    Path((id, file)): Path<(String, String)>,
    State(relay): State<Arc<Relay>>,
) -> Result<axum::response::Response, HttpErrorResponse> {
    let session = find_session(&relay, &id)?;

    if file == relay.config().converter.playlist_name {
        playlist_response(&session).await
    } else {
        segment_response(&session, &file).await
    }
}

/// Serve the live playlist once it lists a segment
async fn playlist_response(session: &Session) -> Result<axum::response::Response, HttpErrorResponse> {
    let not_ready = || HttpError::PlaylistNotReady(session.id().to_string());

    let playlist = match tokio::fs::read_to_string(session.playlist_path()).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_ready().into()),
        Err(e) => return Err(HttpError::Io(e).into()),
    };

    match MediaPlaylist::parse(&playlist) {
        Ok(parsed) if parsed.is_ready() => {}
        _ => return Err(not_ready().into()),
    }

    Ok((
        [
            (header::CONTENT_TYPE, "application/vnd.apple.mpegurl"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        playlist,
    )
        .into_response())
}

/// Serve one live segment
async fn segment_response(
    session: &Session,
    segment: &str,
) -> Result<axum::response::Response, HttpErrorResponse> {
    if !is_segment_name(segment) {
        return Err(HttpError::InvalidSegment(segment.to_string()).into());
    }

    let file = match tokio::fs::File::open(session.hls_output_path().join(segment)).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(HttpError::SegmentNotFound(segment.to_string()).into())
        }
        Err(e) => return Err(HttpError::Io(e).into()),
    };

    let stream = ReaderStream::new(file);
    Ok(([(header::CONTENT_TYPE, "video/mp2t")], Body::from_stream(stream)).into_response())
}

/// Error response wrapper for [`HttpError`]
pub struct HttpErrorResponse(HttpError);

impl From<HttpError> for HttpErrorResponse {
    fn from(e: HttpError) -> Self {
        HttpErrorResponse(e)
    }
}

impl IntoResponse for HttpErrorResponse {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self.0 {
            HttpError::SessionNotFound(_) | HttpError::SegmentNotFound(_) => {
                (StatusCode::NOT_FOUND, self.0.to_string())
            }
            HttpError::InvalidSegment(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            HttpError::PlaylistNotReady(_) => (StatusCode::SERVICE_UNAVAILABLE, self.0.to_string()),
            HttpError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string()),
        };

        tracing::debug!("HLS error: {}", self.0);

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_names() {
        assert!(is_segment_name("segment_00001.ts"));
        assert!(is_segment_name("a-b.ts"));
        assert!(!is_segment_name(".ts"));
        assert!(!is_segment_name("../etc/passwd.ts"));
        assert!(!is_segment_name("..ts"));
        assert!(!is_segment_name("segment.m3u8"));
        assert!(!is_segment_name("dir%2Fsegment.ts"));
        assert!(!is_segment_name("segment 1.ts"));
    }
}
