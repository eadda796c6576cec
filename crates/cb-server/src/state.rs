//! Shared server state
//!
//! One `AppState` is built at startup and cloned into every handler. All
//! fields are `Arc`s over long-lived service objects; handlers never hold
//! ambient globals.

use std::sync::Arc;

use dashmap::DashMap;

use cb_config::ServerConfig;
use cb_mcp::protocol::{JsonRpcNotification, JsonRpcResponse};
use cb_mcp::Dispatcher;
use cb_oauth::AuthCodeBroker;
use cb_sessions::SessionRegistry;

/// Message types that travel over an SSE stream
#[derive(Debug, Clone, serde::Serialize)]
#[serde(untagged)]
pub enum SseMessage {
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

/// Manages active SSE connections
///
/// Each connection is keyed by a per-connection token minted at connect
/// time. When a POST arrives on the paired message channel, the response is
/// routed to the matching stream.
pub struct SseConnectionManager {
    /// connection token -> sender feeding that connection's stream.
    /// Unbounded so the POST handler never blocks on a slow consumer.
    connections: DashMap<String, tokio::sync::mpsc::UnboundedSender<SseMessage>>,
}

impl SseConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a connection; the SSE handler drains the returned receiver.
    ///
    /// Re-registering an existing token drops the old sender, which ends the
    /// old stream.
    pub fn register(&self, token: &str) -> tokio::sync::mpsc::UnboundedReceiver<SseMessage> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        if self.connections.insert(token.to_string(), tx).is_some() {
            tracing::info!("Replaced existing SSE connection {}", token);
        }
        tracing::debug!(
            "Registered SSE connection {} (active={})",
            token,
            self.connections.len()
        );
        rx
    }

    /// Drop a connection. Messages for it are no longer deliverable.
    pub fn unregister(&self, token: &str) {
        if self.connections.remove(token).is_some() {
            tracing::debug!("Unregistered SSE connection {}", token);
        }
    }

    /// Route a response to a connection's stream.
    /// Returns false when no live connection holds the token.
    pub fn send_response(&self, token: &str, response: JsonRpcResponse) -> bool {
        match self.connections.get(token) {
            Some(tx) => tx.send(SseMessage::Response(response)).is_ok(),
            None => false,
        }
    }

    /// Push a notification to a connection's stream
    pub fn send_notification(&self, token: &str, notification: JsonRpcNotification) -> bool {
        match self.connections.get(token) {
            Some(tx) => tx.send(SseMessage::Notification(notification)).is_ok(),
            None => false,
        }
    }

    pub fn has_connection(&self, token: &str) -> bool {
        self.connections.contains_key(token)
    }

    pub fn active_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for SseConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Server state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<SessionRegistry>,
    pub broker: Arc<AuthCodeBroker>,
    pub dispatcher: Arc<Dispatcher>,
    pub sse_manager: Arc<SseConnectionManager>,
}

impl AppState {
    pub fn new(
        config: Arc<ServerConfig>,
        registry: Arc<SessionRegistry>,
        broker: Arc<AuthCodeBroker>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            config,
            registry,
            broker,
            dispatcher,
            sse_manager: Arc::new(SseConnectionManager::new()),
        }
    }
}
