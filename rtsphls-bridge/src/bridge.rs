//! Player bridge
//!
//! [`RtspHlsPlayer`] is the caller-facing side of the bridge. It fills in
//! `play` defaults, forwards every call to a [`NativeHandler`] and routes the
//! results that come back: action results to the action callback, everything
//! else to the status callback. Availability and statistics failures are
//! coerced to `false` and `None`.

use crate::protocol::{ActionResult, PlayOptions, PlayRequest, PluginResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use rtsphls_core::RelayError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Error reported by the native side, forwarded to callers untouched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
#[serde(rename_all = "camelCase")]
pub struct NativeError {
    /// Human readable message
    pub message: String,
    /// Stable error code
    pub code: String,
}

impl NativeError {
    /// Create an error with an explicit code
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
        }
    }

    /// Operation not implemented by this handler
    pub fn unsupported(operation: &str) -> Self {
        Self::new("UNSUPPORTED_OPERATION", format!("{} is not supported", operation))
    }
}

impl From<RelayError> for NativeError {
    fn from(error: RelayError) -> Self {
        Self {
            message: error.to_string(),
            code: error.error_code(),
        }
    }
}

/// Outcome of a native call
pub type NativeResult = Result<Value, NativeError>;

/// Channel a handler streams `play` results into
pub type ResultSender = mpsc::UnboundedSender<NativeResult>;

/// Native side of the bridge
#[async_trait]
pub trait NativeHandler: Send + Sync {
    /// Start playback of `request`.
    ///
    /// Results, including failures, are sent on `results` for as long as the
    /// playback lives. Dropping the sender ends the result stream.
    async fn play(&self, request: PlayRequest, results: ResultSender);

    /// Stop playback
    async fn stop(&self) -> NativeResult;

    /// Report whether playback is possible, as `{"available": bool}`
    async fn check_availability(&self) -> NativeResult;

    /// Conversion statistics of the current playback
    async fn get_stats(&self) -> NativeResult;

    /// Switch the current playback to another camera
    async fn switch_camera(&self, camera: &str) -> NativeResult {
        let _ = camera;
        Err(NativeError::unsupported("switchCamera"))
    }

    /// Raise a player action on the current playback
    async fn trigger_action(
        &self,
        action: &str,
        camera: Option<&str>,
        data: Value,
    ) -> NativeResult {
        let _ = (action, camera, data);
        Err(NativeError::unsupported("triggerAction"))
    }
}

/// Status callback argument
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    /// Result tagged `status`
    Status {
        /// Status word
        status: String,
        /// Optional detail
        message: Option<String>,
    },
    /// Untagged or unknown result, unmodified
    Raw(Value),
}

/// Receives status results
pub type StatusCallback = Box<dyn Fn(StatusUpdate) + Send + Sync>;
/// Receives native errors
pub type ErrorCallback = Box<dyn Fn(NativeError) + Send + Sync>;
/// Receives player actions
pub type ActionCallback = Box<dyn Fn(ActionResult) + Send + Sync>;

/// Callbacks for one `play` call
#[derive(Default)]
pub struct PlayCallbacks {
    status: Option<StatusCallback>,
    error: Option<ErrorCallback>,
    action: Option<ActionCallback>,
}

impl PlayCallbacks {
    /// No callbacks
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the status callback
    pub fn on_status(mut self, callback: impl Fn(StatusUpdate) + Send + Sync + 'static) -> Self {
        self.status = Some(Box::new(callback));
        self
    }

    /// Set the error callback
    pub fn on_error(mut self, callback: impl Fn(NativeError) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(callback));
        self
    }

    /// Set the action callback
    pub fn on_action(mut self, callback: impl Fn(ActionResult) + Send + Sync + 'static) -> Self {
        self.action = Some(Box::new(callback));
        self
    }
}

impl std::fmt::Debug for PlayCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayCallbacks")
            .field("status", &self.status.is_some())
            .field("error", &self.error.is_some())
            .field("action", &self.action.is_some())
            .finish()
    }
}

/// Callbacks owned by one playback
struct SessionCallbacks {
    status: Option<StatusCallback>,
    error: Option<ErrorCallback>,
    action: Mutex<Option<Arc<ActionCallback>>>,
}

impl SessionCallbacks {
    fn dispatch(&self, result: NativeResult) {
        let value = match result {
            Ok(value) => value,
            Err(error) => {
                match &self.error {
                    Some(callback) => callback(error),
                    None => debug!("Native error without error callback: {}", error),
                }
                return;
            }
        };

        match PluginResult::classify(value) {
            PluginResult::Action(action) => {
                let callback = self.action.lock().clone();
                match callback {
                    Some(callback) => callback(action),
                    None => debug!("Dropping action {} without action callback", action.action),
                }
            }
            PluginResult::Status(status) => {
                if let Some(callback) = &self.status {
                    callback(StatusUpdate::Status {
                        status: status.status,
                        message: status.message,
                    });
                }
            }
            PluginResult::Other(value) => {
                if let Some(callback) = &self.status {
                    callback(StatusUpdate::Raw(value));
                }
            }
        }
    }
}

/// Handle to one `play` call and its result routing
pub struct PlaySession {
    request: PlayRequest,
    callbacks: Arc<SessionCallbacks>,
    dispatcher: JoinHandle<()>,
}

impl PlaySession {
    /// Request that was forwarded
    pub fn request(&self) -> &PlayRequest {
        &self.request
    }

    /// Replace the action callback of this playback
    pub fn set_action_callback(&self, callback: impl Fn(ActionResult) + Send + Sync + 'static) {
        let callback: ActionCallback = Box::new(callback);
        *self.callbacks.action.lock() = Some(Arc::new(callback));
    }

    /// Remove the action callback; later actions are dropped
    pub fn clear_action_callback(&self) {
        *self.callbacks.action.lock() = None;
    }

    /// Whether the native side may still send results
    pub fn is_active(&self) -> bool {
        !self.dispatcher.is_finished()
    }

    /// Wait until the native side closes the result stream
    pub async fn finished(self) {
        if let Err(e) = self.dispatcher.await {
            debug!("Result dispatcher ended abnormally: {}", e);
        }
    }

    /// Stop routing results for this playback
    pub fn detach(self) {
        self.dispatcher.abort();
    }
}

impl std::fmt::Debug for PlaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaySession")
            .field("request", &self.request)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Caller-facing bridge client
#[derive(Clone)]
pub struct RtspHlsPlayer {
    handler: Arc<dyn NativeHandler>,
}

impl RtspHlsPlayer {
    /// Create a bridge over a native handler
    pub fn new(handler: Arc<dyn NativeHandler>) -> Self {
        Self { handler }
    }

    /// Start playback.
    ///
    /// Options are forwarded with defaults applied and without validation.
    /// Results are routed to `callbacks` until the native side drops its
    /// result sender.
    pub async fn play(&self, options: PlayOptions, callbacks: PlayCallbacks) -> PlaySession {
        let request = PlayRequest::from(options);
        let (results_tx, mut results_rx) = mpsc::unbounded_channel();

        let callbacks = Arc::new(SessionCallbacks {
            status: callbacks.status,
            error: callbacks.error,
            action: Mutex::new(callbacks.action.map(Arc::new)),
        });

        let routed = callbacks.clone();
        let dispatcher = tokio::spawn(async move {
            while let Some(result) = results_rx.recv().await {
                trace!("Native result: {:?}", result);
                routed.dispatch(result);
            }
        });

        debug!("Forwarding play for {:?}", request.title);
        self.handler.play(request.clone(), results_tx).await;

        PlaySession {
            request,
            callbacks,
            dispatcher,
        }
    }

    /// Stop playback; the native outcome is returned as is
    pub async fn stop(&self) -> NativeResult {
        self.handler.stop().await
    }

    /// Whether the native side reports `{"available": true}`
    pub async fn check_availability(&self) -> bool {
        match self.handler.check_availability().await {
            Ok(value) => value.get("available").and_then(Value::as_bool) == Some(true),
            Err(e) => {
                debug!("Availability check failed: {}", e);
                false
            }
        }
    }

    /// Native statistics payload, or `None` on failure
    pub async fn get_stats(&self) -> Option<Value> {
        match self.handler.get_stats().await {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(e) => {
                debug!("Stats request failed: {}", e);
                None
            }
        }
    }

    /// Switch the current playback to another camera
    pub async fn switch_camera(&self, camera: &str) -> NativeResult {
        self.handler.switch_camera(camera).await
    }

    /// Raise a player action on the current playback
    pub async fn trigger_action(
        &self,
        action: &str,
        camera: Option<&str>,
        data: Value,
    ) -> NativeResult {
        self.handler.trigger_action(action, camera, data).await
    }
}

impl std::fmt::Debug for RtspHlsPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtspHlsPlayer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_error_from_relay_error() {
        let error: NativeError = RelayError::SessionLimitExceeded { limit: 2 }.into();
        assert_eq!(error.code, "SESSION_LIMIT_EXCEEDED");
        assert!(error.message.contains('2'));

        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["code"], "SESSION_LIMIT_EXCEEDED");
    }

    #[test]
    fn test_play_callbacks_debug() {
        let callbacks = PlayCallbacks::new().on_status(|_| {});
        let debug = format!("{:?}", callbacks);
        assert!(debug.contains("status: true"));
        assert!(debug.contains("action: false"));
    }
}
