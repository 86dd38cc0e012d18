//! Bridge protocol messages
//!
//! JSON shapes exchanged between a player front end and the native relay:
//! the `play` option bag, the tagged results the native side streams back,
//! and the control channel envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Title used when none is given
pub const DEFAULT_TITLE: &str = "Live Stream";
/// Camera control API base URL used when none is given
pub const DEFAULT_API_BASE_URL: &str = "http://192.168.0.1";
/// Camera shown first when none is given
pub const DEFAULT_INITIAL_CAMERA: &str = "front";

/// Loosely typed `play` options as a caller supplies them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayOptions {
    /// RTSP URL of the front camera
    #[serde(default)]
    pub front_url: Option<String>,
    /// RTSP URL of the rear camera
    #[serde(default)]
    pub rear_url: Option<String>,
    /// Title shown by the player
    #[serde(default)]
    pub title: Option<String>,
    /// Base URL of the camera control API
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// `front` or `rear`
    #[serde(default)]
    pub initial_camera: Option<String>,
}

impl PlayOptions {
    /// Options with only the front camera set
    pub fn front(url: impl Into<String>) -> Self {
        Self {
            front_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Set the rear camera URL
    pub fn with_rear(mut self, url: impl Into<String>) -> Self {
        self.rear_url = Some(url.into());
        self
    }

    /// Set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the camera API base URL
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Set the initial camera
    pub fn with_initial_camera(mut self, camera: impl Into<String>) -> Self {
        self.initial_camera = Some(camera.into());
        self
    }
}

/// Fully populated `play` request forwarded to the native side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayRequest {
    /// RTSP URL of the front camera, possibly empty
    pub front_url: String,
    /// RTSP URL of the rear camera, possibly empty
    pub rear_url: String,
    /// Title shown by the player
    pub title: String,
    /// Base URL of the camera control API
    pub api_base_url: String,
    /// Initial camera name, not validated here
    pub initial_camera: String,
}

impl From<PlayOptions> for PlayRequest {
    /// Absent and empty values both take the default.
    fn from(options: PlayOptions) -> Self {
        fn or_default(value: Option<String>, default: &str) -> String {
            value
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        }

        Self {
            front_url: or_default(options.front_url, ""),
            rear_url: or_default(options.rear_url, ""),
            title: or_default(options.title, DEFAULT_TITLE),
            api_base_url: or_default(options.api_base_url, DEFAULT_API_BASE_URL),
            initial_camera: or_default(options.initial_camera, DEFAULT_INITIAL_CAMERA),
        }
    }
}

impl Default for PlayRequest {
    fn default() -> Self {
        PlayOptions::default().into()
    }
}

/// User action raised by the player, e.g. a snapshot request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Action name
    pub action: String,
    /// Camera the action applies to
    #[serde(default)]
    pub camera: Option<String>,
    /// Action specific payload
    #[serde(default)]
    pub data: Value,
}

impl ActionResult {
    /// Read an action payload, tolerating missing or mistyped fields
    pub fn lenient(value: &Value) -> Self {
        Self {
            action: value
                .get("action")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            camera: value.get("camera").and_then(Value::as_str).map(str::to_string),
            data: value.get("data").cloned().unwrap_or(Value::Null),
        }
    }
}

/// Status change reported by the player or converter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResult {
    /// Status word
    pub status: String,
    /// Optional detail
    #[serde(default)]
    pub message: Option<String>,
}

/// A native result classified by its `type` tag
#[derive(Debug, Clone, PartialEq)]
pub enum PluginResult {
    /// `{"type": "action", ...}`
    Action(ActionResult),
    /// `{"type": "status", ...}`
    Status(StatusResult),
    /// Anything else, kept as received
    Other(Value),
}

impl PluginResult {
    /// Classify a raw native payload.
    ///
    /// Anything tagged `action` is an action, whatever its shape; fields
    /// of the wrong type are dropped. A `status` tag without a string
    /// `status` is kept as `Other`.
    pub fn classify(value: Value) -> Self {
        match value.get("type").and_then(Value::as_str) {
            Some("action") => PluginResult::Action(ActionResult::lenient(&value)),
            Some("status") => match serde_json::from_value(value.clone()) {
                Ok(status) => PluginResult::Status(status),
                Err(_) => PluginResult::Other(value),
            },
            _ => PluginResult::Other(value),
        }
    }

    /// Build an action result
    pub fn action(action: impl Into<String>, camera: Option<String>, data: Value) -> Self {
        PluginResult::Action(ActionResult {
            action: action.into(),
            camera,
            data,
        })
    }

    /// Build a status result
    pub fn status(status: impl Into<String>, message: Option<String>) -> Self {
        PluginResult::Status(StatusResult {
            status: status.into(),
            message,
        })
    }

    /// Wire form, with the `type` tag
    pub fn to_value(&self) -> Value {
        match self {
            PluginResult::Action(action) => serde_json::json!({
                "type": "action",
                "action": action.action,
                "camera": action.camera,
                "data": action.data,
            }),
            PluginResult::Status(status) => serde_json::json!({
                "type": "status",
                "status": status.status,
                "message": status.message,
            }),
            PluginResult::Other(value) => value.clone(),
        }
    }

    /// Whether this is an action result
    pub fn is_action(&self) -> bool {
        matches!(self, PluginResult::Action(_))
    }
}

/// Requests accepted on the control channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControlMessage {
    /// Start playback
    Play {
        /// Option bag; defaults are applied server side
        #[serde(default)]
        options: PlayOptions,
    },
    /// Stop playback
    Stop,
    /// Ask whether the relay can convert at all
    CheckAvailability,
    /// Fetch conversion statistics
    GetStats,
    /// Switch the live session to another camera
    SwitchCamera {
        /// `front` or `rear`
        camera: String,
    },
    /// Raise a player action on the live session
    TriggerAction {
        /// Action name
        action: String,
        /// Camera the action applies to
        #[serde(default)]
        camera: Option<String>,
        /// Action payload
        #[serde(default)]
        data: Value,
    },
}

impl ControlMessage {
    /// Operation name used in responses
    pub fn operation(&self) -> &'static str {
        match self {
            ControlMessage::Play { .. } => "play",
            ControlMessage::Stop => "stop",
            ControlMessage::CheckAvailability => "checkAvailability",
            ControlMessage::GetStats => "getStats",
            ControlMessage::SwitchCamera { .. } => "switchCamera",
            ControlMessage::TriggerAction { .. } => "triggerAction",
        }
    }
}

/// Control channel replies and pushes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlResponse {
    /// Successful reply to a request
    Result {
        /// Operation that produced it
        request: String,
        /// Native payload
        payload: Value,
    },
    /// Result pushed by a running `play`
    PlayResult {
        /// Tagged native payload
        payload: Value,
    },
    /// Error response
    Error {
        /// Error message
        error: String,
        /// Error code for programmatic handling
        error_code: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_for_missing_fields() {
        let request = PlayRequest::from(PlayOptions::default());
        assert_eq!(request.front_url, "");
        assert_eq!(request.rear_url, "");
        assert_eq!(request.title, "Live Stream");
        assert_eq!(request.api_base_url, "http://192.168.0.1");
        assert_eq!(request.initial_camera, "front");
    }

    #[test]
    fn test_defaults_for_empty_fields() {
        let options = PlayOptions {
            front_url: Some("rtsp://cam/front".to_string()),
            rear_url: Some(String::new()),
            title: Some(String::new()),
            api_base_url: Some(String::new()),
            initial_camera: Some(String::new()),
        };
        let request = PlayRequest::from(options);
        assert_eq!(request.front_url, "rtsp://cam/front");
        assert_eq!(request.title, "Live Stream");
        assert_eq!(request.api_base_url, "http://192.168.0.1");
        assert_eq!(request.initial_camera, "front");
    }

    #[test]
    fn test_given_values_are_kept_verbatim() {
        let options = PlayOptions::front("rtsp://cam/front")
            .with_rear("rtsp://cam/rear")
            .with_title("Dashcam")
            .with_api_base_url("http://10.0.0.1")
            .with_initial_camera("sideways");
        let request = PlayRequest::from(options);
        assert_eq!(request.rear_url, "rtsp://cam/rear");
        assert_eq!(request.title, "Dashcam");
        assert_eq!(request.api_base_url, "http://10.0.0.1");
        // No validation on this side
        assert_eq!(request.initial_camera, "sideways");
    }

    #[test]
    fn test_options_from_camel_case_json() {
        let options: PlayOptions =
            serde_json::from_value(json!({"frontUrl": "rtsp://a", "initialCamera": "rear"}))
                .unwrap();
        assert_eq!(options.front_url.as_deref(), Some("rtsp://a"));
        assert_eq!(options.initial_camera.as_deref(), Some("rear"));
        assert!(options.title.is_none());

        let request = serde_json::to_value(PlayRequest::from(options)).unwrap();
        assert_eq!(request["frontUrl"], "rtsp://a");
        assert_eq!(request["apiBaseUrl"], "http://192.168.0.1");
    }

    #[test]
    fn test_classify_results() {
        let action = PluginResult::classify(
            json!({"type": "action", "action": "snapshot", "camera": "rear", "data": {"n": 1}}),
        );
        assert_eq!(
            action,
            PluginResult::action("snapshot", Some("rear".to_string()), json!({"n": 1}))
        );

        let status = PluginResult::classify(json!({"type": "status", "status": "ready"}));
        assert_eq!(status, PluginResult::status("ready", None));

        let other = PluginResult::classify(json!({"type": "progress", "value": 3}));
        assert_eq!(other, PluginResult::Other(json!({"type": "progress", "value": 3})));

        assert_eq!(
            PluginResult::classify(json!("plain")),
            PluginResult::Other(json!("plain"))
        );

        // Tag without the required shape stays untouched
        let broken = json!({"type": "status", "status": 5});
        assert_eq!(PluginResult::classify(broken.clone()), PluginResult::Other(broken));
    }

    #[test]
    fn test_classify_malformed_actions() {
        assert_eq!(
            PluginResult::classify(json!({"type": "action", "action": "snapshot", "camera": 7})),
            PluginResult::action("snapshot", None, Value::Null)
        );
        assert_eq!(
            PluginResult::classify(json!({"type": "action"})),
            PluginResult::action("", None, Value::Null)
        );
        assert!(PluginResult::classify(json!({"type": "action", "action": 3, "data": [1]})).is_action());
    }

    #[test]
    fn test_result_wire_form() {
        let value = PluginResult::status("ready", Some("http://h/s.m3u8".to_string())).to_value();
        assert_eq!(value["type"], "status");
        assert_eq!(value["message"], "http://h/s.m3u8");
        assert_eq!(PluginResult::classify(value.clone()).to_value(), value);
    }

    #[test]
    fn test_control_message_serialization() {
        let message: ControlMessage =
            serde_json::from_str(r#"{"Play":{"options":{"frontUrl":"rtsp://a"}}}"#).unwrap();
        assert_eq!(message.operation(), "play");

        let message: ControlMessage = serde_json::from_str(r#""Stop""#).unwrap();
        assert_eq!(message.operation(), "stop");

        let message: ControlMessage =
            serde_json::from_str(r#"{"TriggerAction":{"action":"snapshot"}}"#).unwrap();
        match message {
            ControlMessage::TriggerAction { camera, data, .. } => {
                assert!(camera.is_none());
                assert!(data.is_null());
            }
            other => panic!("Wrong message type: {:?}", other),
        }

        let response = ControlResponse::Error {
            error: "boom".to_string(),
            error_code: "NATIVE_FAILURE".to_string(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("NATIVE_FAILURE"));
        let back: ControlResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, response);
    }
}
