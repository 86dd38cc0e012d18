//! WebSocket control server
//!
//! Exposes a [`NativeHandler`] to remote controllers. Each text frame carries
//! one [`ControlMessage`]; every request is answered with a
//! [`ControlResponse`], and results of a running `play` are pushed as
//! `PlayResult` frames as they arrive.

use crate::bridge::{NativeError, NativeHandler};
use crate::protocol::{ControlMessage, ControlResponse, PlayRequest};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use rtsphls_core::RelayError;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use uuid::Uuid;

/// WebSocket connection wrapper
type WebSocketConnection = WebSocketStream<TcpStream>;

/// Details of a connected controller
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    /// Connection ID
    pub id: String,
    /// Remote address
    pub peer: SocketAddr,
    /// When the WebSocket handshake completed
    pub connected_at: DateTime<Utc>,
}

struct Connection {
    info: ConnectionInfo,
    outbound: mpsc::UnboundedSender<Message>,
}

/// Control server forwarding controller requests to a native handler
#[derive(Clone)]
pub struct ControlServer {
    /// Address the server binds to
    pub bind_addr: SocketAddr,
    handler: Arc<dyn NativeHandler>,
    connections: Arc<DashMap<String, Connection>>,
    shutdown: CancellationToken,
}

impl ControlServer {
    /// Create new control server
    pub fn new(bind_addr: SocketAddr, handler: Arc<dyn NativeHandler>) -> Self {
        Self {
            bind_addr,
            handler,
            connections: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Bind `bind_addr` and serve until [`ControlServer::stop`] is called
    pub async fn start(&self) -> Result<(), RelayError> {
        let listener = TcpListener::bind(self.bind_addr).await.map_err(|e| {
            RelayError::ServerStartFailed {
                address: self.bind_addr,
                source: e.into(),
            }
        })?;

        self.serve(listener).await
    }

    /// Serve an already bound listener until [`ControlServer::stop`] is called.
    ///
    /// Returns at once if the server was already stopped.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RelayError> {
        let local_addr = listener.local_addr()?;
        tracing::info!("🛰️ Control server listening on {}", local_addr);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        tracing::debug!("New connection from {}", addr);
                        let server = self.clone();
                        tokio::spawn(async move {
                            server.handle_connection(stream, addr).await;
                        });
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept connection: {}", e);
                    }
                },
            }
        }

        tracing::info!("Control server on {} stopped accepting", local_addr);
        Ok(())
    }

    /// Handle incoming WebSocket connection
    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                tracing::error!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let connection_id = Uuid::new_v4().to_string();
        tracing::debug!("WebSocket connection established: {}", connection_id);

        let (mut sink, stream) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    tracing::debug!("Failed to write to controller: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        self.connections.insert(
            connection_id.clone(),
            Connection {
                info: ConnectionInfo {
                    id: connection_id.clone(),
                    peer,
                    connected_at: Utc::now(),
                },
                outbound,
            },
        );

        self.handle_messages(&connection_id, stream).await;

        // Cleanup on disconnect
        self.connections.remove(&connection_id);
        if let Err(e) = writer.await {
            tracing::debug!("Writer for {} ended abnormally: {}", connection_id, e);
        }
        tracing::debug!("Connection {} cleaned up", connection_id);
    }

    /// Handle messages from a WebSocket connection
    async fn handle_messages(
        &self,
        connection_id: &str,
        mut stream: SplitStream<WebSocketConnection>,
    ) {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<ControlMessage>(&text) {
                    Ok(message) => {
                        let operation = message.operation();
                        if let Err(e) = self.handle_control_message(connection_id, message).await
                        {
                            tracing::warn!("{} failed: {}", operation, e);
                            self.send_error(connection_id, e);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Invalid message format: {}", e);
                        self.send_error(
                            connection_id,
                            RelayError::InvalidMessage {
                                message: text,
                                source: e.into(),
                            }
                            .into(),
                        );
                    }
                },
                Ok(Message::Close(_)) => {
                    tracing::debug!("Connection {} closed", connection_id);
                    break;
                }
                Err(e) => {
                    tracing::error!("WebSocket error on connection {}: {}", connection_id, e);
                    break;
                }
                Ok(_) => {
                    // Ignore other message types (Binary, Ping, Pong)
                }
            }
        }
    }

    /// Handle a control message
    async fn handle_control_message(
        &self,
        connection_id: &str,
        message: ControlMessage,
    ) -> Result<(), NativeError> {
        let operation = message.operation();
        let payload = match message {
            ControlMessage::Play { options } => {
                self.handle_play(connection_id, PlayRequest::from(options))
                    .await;
                return Ok(());
            }
            ControlMessage::Stop => self.handler.stop().await?,
            ControlMessage::CheckAvailability => self.handler.check_availability().await?,
            ControlMessage::GetStats => self.handler.get_stats().await?,
            ControlMessage::SwitchCamera { camera } => {
                self.handler.switch_camera(&camera).await?
            }
            ControlMessage::TriggerAction {
                action,
                camera,
                data,
            } => {
                self.handler
                    .trigger_action(&action, camera.as_deref(), data)
                    .await?
            }
        };

        self.send_response(
            connection_id,
            ControlResponse::Result {
                request: operation.to_string(),
                payload,
            },
        );
        Ok(())
    }

    /// Forward `play` and push its results to the requesting connection
    async fn handle_play(&self, connection_id: &str, request: PlayRequest) {
        let acknowledgement = serde_json::to_value(&request).unwrap_or_default();
        let (results_tx, mut results_rx) = mpsc::unbounded_channel();

        self.handler.play(request, results_tx).await;
        self.send_response(
            connection_id,
            ControlResponse::Result {
                request: "play".to_string(),
                payload: acknowledgement,
            },
        );

        let server = self.clone();
        let connection_id = connection_id.to_string();
        tokio::spawn(async move {
            while let Some(result) = results_rx.recv().await {
                if !server.connections.contains_key(&connection_id) {
                    tracing::debug!("Controller {} gone, dropping play results", connection_id);
                    break;
                }
                match result {
                    Ok(payload) => server
                        .send_response(&connection_id, ControlResponse::PlayResult { payload }),
                    Err(e) => server.send_error(&connection_id, e),
                }
            }
        });
    }

    /// Send response to a specific connection
    fn send_response(&self, connection_id: &str, response: ControlResponse) {
        let Some(connection) = self.connections.get(connection_id) else {
            return;
        };

        let message = match serde_json::to_string(&response) {
            Ok(json) => Message::Text(json),
            Err(e) => {
                tracing::error!("Failed to serialize response: {}", e);
                return;
            }
        };

        if connection.outbound.send(message).is_err() {
            tracing::error!("Failed to send message to {}", connection_id);
        }
    }

    /// Send error to a specific connection
    fn send_error(&self, connection_id: &str, error: NativeError) {
        self.send_response(
            connection_id,
            ControlResponse::Error {
                error: error.message,
                error_code: error.code,
            },
        );
    }

    /// Stop accepting and close all connections
    pub async fn stop(&self) -> Result<(), RelayError> {
        self.shutdown.cancel();

        for connection in self.connections.iter() {
            let _ = connection.outbound.send(Message::Close(None));
        }
        self.connections.clear();

        tracing::info!("Control server stopped");
        Ok(())
    }

    /// Connected controllers (for monitoring/debugging)
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.connections
            .iter()
            .map(|entry| entry.info.clone())
            .collect()
    }

    /// Number of connected controllers
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl std::fmt::Debug for ControlServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlServer")
            .field("bind_addr", &self.bind_addr)
            .field("connections", &self.connections.len())
            .finish()
    }
}
