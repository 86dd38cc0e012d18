//! Scripted native handler shared by the bridge tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rtsphls_bridge::{NativeError, NativeHandler, NativeResult, PlayRequest, ResultSender};
use serde_json::{json, Value};

/// Handler that records calls and replies with canned results
pub struct MockHandler {
    pub calls: Mutex<Vec<String>>,
    pub requests: Mutex<Vec<PlayRequest>>,
    pub play_results: Mutex<Vec<NativeResult>>,
    pub stop_result: Mutex<NativeResult>,
    pub availability: Mutex<NativeResult>,
    pub stats: Mutex<NativeResult>,
}

impl Default for MockHandler {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            play_results: Mutex::new(Vec::new()),
            stop_result: Mutex::new(Ok(json!({"status": "stopped"}))),
            availability: Mutex::new(Ok(json!({"available": true}))),
            stats: Mutex::new(Ok(json!({"isConverting": false}))),
        }
    }
}

impl MockHandler {
    pub fn with_play_results(results: Vec<NativeResult>) -> Self {
        let handler = Self::default();
        *handler.play_results.lock() = results;
        handler
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().push(call.to_string());
    }
}

#[async_trait]
impl NativeHandler for MockHandler {
    async fn play(&self, request: PlayRequest, results: ResultSender) {
        self.record("play");
        self.requests.lock().push(request);
        for result in self.play_results.lock().drain(..) {
            let _ = results.send(result);
        }
    }

    async fn stop(&self) -> NativeResult {
        self.record("stop");
        self.stop_result.lock().clone()
    }

    async fn check_availability(&self) -> NativeResult {
        self.record("checkAvailability");
        self.availability.lock().clone()
    }

    async fn get_stats(&self) -> NativeResult {
        self.record("getStats");
        self.stats.lock().clone()
    }

    async fn switch_camera(&self, camera: &str) -> NativeResult {
        self.record("switchCamera");
        match camera {
            "front" | "rear" => Ok(json!({"camera": camera})),
            other => Err(NativeError::new("UNKNOWN_CAMERA", format!("Unknown camera: {}", other))),
        }
    }

    async fn trigger_action(&self, action: &str, camera: Option<&str>, data: Value) -> NativeResult {
        self.record("triggerAction");
        Ok(json!({"action": action, "camera": camera, "data": data}))
    }
}
