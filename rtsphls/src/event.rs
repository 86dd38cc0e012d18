//! Event system for session status, player actions and errors

use crate::Camera;
use futures::Stream;
use parking_lot::Mutex;
use rtsphls_bridge::PluginResult;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::debug;

/// Session events
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Conversion status changed (`starting`, `ready`, `switching`, ...)
    StatusChanged {
        /// Status word
        status: String,
        /// Optional detail; the HLS URL for `ready`
        message: Option<String>,
    },
    /// The player raised an action such as a snapshot request
    Action {
        /// Action name
        action: String,
        /// Camera the action applies to
        camera: Option<Camera>,
        /// Action payload
        data: Value,
    },
    /// The session now relays another camera
    CameraSwitched {
        /// Camera now live
        camera: Camera,
    },
    /// An error occurred in the session
    Error {
        /// Error that occurred
        error: String,
        /// Whether the session keeps trying
        recoverable: bool,
    },
    /// The session was stopped; no events follow
    Closed,
}

impl Event {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::StatusChanged { .. } => "status_changed",
            Event::Action { .. } => "action",
            Event::CameraSwitched { .. } => "camera_switched",
            Event::Error { .. } => "error",
            Event::Closed => "closed",
        }
    }

    /// Check if this is a status event
    pub fn is_status_event(&self) -> bool {
        matches!(
            self,
            Event::StatusChanged { .. } | Event::CameraSwitched { .. } | Event::Closed
        )
    }

    /// Check if this is a player action
    pub fn is_action_event(&self) -> bool {
        matches!(self, Event::Action { .. })
    }

    /// Check if this is an error event
    pub fn is_error_event(&self) -> bool {
        matches!(self, Event::Error { .. })
    }

    /// Check if this event ends the session's event stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Closed)
    }

    /// Bridge shape of this event.
    ///
    /// Actions become `type: action`; everything else is reported as a
    /// `type: status` result.
    pub fn to_plugin_result(&self) -> PluginResult {
        match self {
            Event::StatusChanged { status, message } => {
                PluginResult::status(status.clone(), message.clone())
            }
            Event::Action {
                action,
                camera,
                data,
            } => PluginResult::action(
                action.clone(),
                camera.map(|c| c.as_str().to_string()),
                data.clone(),
            ),
            Event::CameraSwitched { camera } => {
                PluginResult::status("camera_switched", Some(camera.as_str().to_string()))
            }
            Event::Error { error, .. } => PluginResult::status("error", Some(error.clone())),
            Event::Closed => PluginResult::status("closed", None),
        }
    }
}

/// Fan-out of session events to every subscriber
#[derive(Debug, Clone, Default)]
pub(crate) struct EventBus {
    inner: Arc<Mutex<BusState>>,
}

#[derive(Debug, Default)]
struct BusState {
    subscribers: Vec<mpsc::UnboundedSender<Event>>,
    closed: bool,
}

impl EventBus {
    /// New subscriber receiving every later event.
    ///
    /// Once the bus is closed the stream yields [`Event::Closed`] and ends.
    pub(crate) fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.inner.lock();
        if state.closed {
            let _ = tx.send(Event::Closed);
        } else {
            state.subscribers.push(tx);
        }
        EventStream::new(rx)
    }

    /// Deliver to all live subscribers, dropping closed ones
    pub(crate) fn publish(&self, event: Event) {
        debug!("📡 Session event: {}", event.event_type());
        self.inner
            .lock()
            .subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    /// Drop all subscribers, ending their streams
    pub(crate) fn close(&self) {
        let mut state = self.inner.lock();
        state.closed = true;
        state.subscribers.clear();
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

/// Stream of session events for async iteration
#[derive(Debug)]
pub struct EventStream {
    /// Receiver for events
    receiver: mpsc::UnboundedReceiver<Event>,
}

impl EventStream {
    /// Create a new event stream with a receiver
    pub fn new(receiver: mpsc::UnboundedReceiver<Event>) -> Self {
        Self { receiver }
    }

    /// Get the next event from the stream
    pub async fn next(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Result<Option<Event>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(mpsc::error::TryRecvError::Disconnected)
            }
        }
    }

    /// Close the event stream
    pub fn close(&mut self) {
        self.receiver.close();
    }

    /// Check if the event stream is closed
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Event handler for callback-style event processing
#[derive(Debug)]
pub struct EventHandler {
    /// Background task handle
    task_handle: tokio::task::JoinHandle<()>,
}

impl EventHandler {
    /// Run `callback` for every event of `stream` on a background task
    pub fn new<F>(mut stream: EventStream, mut callback: F) -> Self
    where
        F: FnMut(Event) + Send + 'static,
    {
        let task_handle = tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                debug!("📡 Processing event: {}", event.event_type());
                callback(event);
            }
        });

        Self { task_handle }
    }

    /// Whether the stream has ended
    pub fn is_finished(&self) -> bool {
        self.task_handle.is_finished()
    }

    /// Wait for the stream to end
    pub async fn join(self) {
        if let Err(e) = self.task_handle.await {
            debug!("Event handler ended abnormally: {}", e);
        }
    }

    /// Stop processing events
    pub fn abort(&self) {
        self.task_handle.abort();
    }
}

/// Event filter for selective event processing
#[derive(Debug, Clone)]
pub struct EventFilter {
    /// Whether to include status events
    pub include_status_events: bool,
    /// Whether to include player actions
    pub include_action_events: bool,
    /// Whether to include error events
    pub include_error_events: bool,
    /// Specific event types to include (if specified, overrides other filters)
    pub specific_event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a filter that includes all events
    pub fn all() -> Self {
        Self {
            include_status_events: true,
            include_action_events: true,
            include_error_events: true,
            specific_event_types: None,
        }
    }

    /// Create a filter that includes only status events
    pub fn status_only() -> Self {
        Self {
            include_status_events: true,
            include_action_events: false,
            include_error_events: false,
            specific_event_types: None,
        }
    }

    /// Create a filter that includes only player actions
    pub fn action_only() -> Self {
        Self {
            include_status_events: false,
            include_action_events: true,
            include_error_events: false,
            specific_event_types: None,
        }
    }

    /// Create a filter for specific event types
    pub fn specific(event_types: Vec<String>) -> Self {
        Self {
            include_status_events: false,
            include_action_events: false,
            include_error_events: false,
            specific_event_types: Some(event_types),
        }
    }

    /// Check if an event should be included based on this filter
    pub fn should_include(&self, event: &Event) -> bool {
        if let Some(ref specific_types) = self.specific_event_types {
            return specific_types.iter().any(|t| t == event.event_type());
        }

        (self.include_status_events && event.is_status_event())
            || (self.include_action_events && event.is_action_event())
            || (self.include_error_events && event.is_error_event())
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Filtered event stream that only yields events matching a filter
#[derive(Debug)]
pub struct FilteredEventStream {
    /// Underlying event stream
    stream: EventStream,
    /// Event filter
    filter: EventFilter,
}

impl FilteredEventStream {
    /// Create a new filtered event stream
    pub fn new(stream: EventStream, filter: EventFilter) -> Self {
        Self { stream, filter }
    }

    /// Get the next event that matches the filter
    pub async fn next(&mut self) -> Option<Event> {
        while let Some(event) = self.stream.next().await {
            if self.filter.should_include(&event) {
                return Some(event);
            }
        }
        None
    }

    /// Try to get the next filtered event without blocking
    pub fn try_next(&mut self) -> Result<Option<Event>, mpsc::error::TryRecvError> {
        while let Some(event) = self.stream.try_next()? {
            if self.filter.should_include(&event) {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    /// Update the filter
    pub fn set_filter(&mut self, filter: EventFilter) {
        self.filter = filter;
    }

    /// Get the current filter
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn action() -> Event {
        Event::Action {
            action: "snapshot".to_string(),
            camera: Some(Camera::Rear),
            data: json!({"quality": "high"}),
        }
    }

    #[test]
    fn test_event_type_classification() {
        let status = Event::StatusChanged {
            status: "ready".to_string(),
            message: None,
        };
        assert!(status.is_status_event());
        assert!(!status.is_action_event());

        assert!(action().is_action_event());
        assert!(!action().is_status_event());

        let error = Event::Error {
            error: "Test error".to_string(),
            recoverable: true,
        };
        assert!(error.is_error_event());
        assert!(!error.is_status_event());

        assert!(Event::Closed.is_terminal());
        assert!(Event::CameraSwitched { camera: Camera::Rear }.is_status_event());
    }

    #[test]
    fn test_plugin_result_shapes() {
        let value = action().to_plugin_result().to_value();
        assert_eq!(value["type"], "action");
        assert_eq!(value["camera"], "rear");
        assert_eq!(value["data"]["quality"], "high");

        let value = Event::CameraSwitched { camera: Camera::Rear }
            .to_plugin_result()
            .to_value();
        assert_eq!(value["type"], "status");
        assert_eq!(value["status"], "camera_switched");
        assert_eq!(value["message"], "rear");

        let value = Event::Error {
            error: "boom".to_string(),
            recoverable: false,
        }
        .to_plugin_result()
        .to_value();
        assert_eq!(value["status"], "error");
        assert_eq!(value["message"], "boom");

        assert_eq!(Event::Closed.to_plugin_result().to_value()["status"], "closed");
    }

    #[test]
    fn test_event_filter() {
        let status = Event::StatusChanged {
            status: "ready".to_string(),
            message: None,
        };

        let all_filter = EventFilter::all();
        assert!(all_filter.should_include(&status));
        assert!(all_filter.should_include(&action()));

        let status_filter = EventFilter::status_only();
        assert!(status_filter.should_include(&status));
        assert!(!status_filter.should_include(&action()));

        let specific_filter = EventFilter::specific(vec!["action".to_string()]);
        assert!(specific_filter.should_include(&action()));
        assert!(!specific_filter.should_include(&status));
    }

    #[tokio::test]
    async fn test_bus_fans_out_and_prunes() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(second);
        bus.publish(Event::Closed);
        assert_eq!(first.next().await, Some(Event::Closed));
        assert_eq!(bus.subscriber_count(), 1);

        bus.close();
        assert_eq!(first.next().await, None);
    }

    #[tokio::test]
    async fn test_subscribe_after_close_ends() {
        let bus = EventBus::default();
        bus.close();

        let mut late = bus.subscribe();
        assert_eq!(late.next().await, Some(Event::Closed));
        assert_eq!(late.next().await, None);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_filtered_event_stream() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut filtered = FilteredEventStream::new(EventStream::new(rx), EventFilter::action_only());

        tx.send(Event::StatusChanged {
            status: "starting".to_string(),
            message: None,
        })
        .unwrap();
        tx.send(action()).unwrap();

        let received = filtered.next().await.unwrap();
        assert_eq!(received.event_type(), "action");

        tx.send(Event::Closed).unwrap();
        assert!(filtered.try_next().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_event_handler_runs_callback() {
        let bus = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = EventHandler::new(bus.subscribe(), move |event| {
            sink.lock().push(event.event_type())
        });

        bus.publish(action());
        bus.publish(Event::Closed);
        bus.close();
        handler.join().await;

        assert_eq!(*seen.lock(), vec!["action", "closed"]);
    }

    #[tokio::test]
    async fn test_event_stream_as_stream() {
        use futures::StreamExt;

        let (tx, rx) = mpsc::unbounded_channel();
        let stream = EventStream::new(rx);
        tx.send(action()).unwrap();
        tx.send(Event::Closed).unwrap();
        drop(tx);

        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 2);
    }
}
