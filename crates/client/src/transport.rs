// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Transport abstraction for WebSocket communication.
//!
//! Provides a trait-based transport layer that enables:
//! - Real WebSocket connections for production
//! - In-process transports for testing

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use mua_core::protocol::{ClientMessage, ServerMessage};
use mua_core::{Request, Response};

use crate::error::{Error, Result};

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The server rejected the request as a whole.
    #[error("request rejected ({status} {kind}){}", describe_detail(.detail))]
    RequestError {
        kind: String,
        status: u16,
        detail: Option<String>,
    },
}

fn describe_detail(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
}

/// Result type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Carries one request to the server and brings back its response.
///
/// `execute` takes `&self` so that independent batches can be in flight
/// from concurrent tasks; implementations serialize them as they need.
pub trait Transport: Send + Sync {
    /// Connect to a remote server.
    fn connect(
        &mut self,
        url: &str,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Disconnect from the server.
    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Send `request` and wait for the response that answers it.
    fn execute(
        &self,
        request: Request,
    ) -> Pin<Box<dyn Future<Output = TransportResult<Response>> + Send + '_>>;

    /// Check if connected.
    fn is_connected(&self) -> bool;
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Internal WebSocket connection wrapper.
struct WebSocketConnection {
    sink: futures_util::stream::SplitSink<WsStream, Message>,
    stream: futures_util::stream::SplitStream<WsStream>,
}

/// WebSocket transport implementation using tokio-tungstenite.
pub struct WebSocketTransport {
    /// The WebSocket connection, if connected. Held for a whole round trip.
    ws: Mutex<Option<WebSocketConnection>>,
    connected: AtomicBool,
    next_request_id: AtomicU64,
}

impl WebSocketTransport {
    /// Create a new WebSocket transport.
    pub fn new() -> Self {
        WebSocketTransport {
            ws: Mutex::new(None),
            connected: AtomicBool::new(false),
            next_request_id: AtomicU64::new(0),
        }
    }

    fn request_id(&self) -> String {
        format!("r{}", self.next_request_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Drops a broken connection.
    fn clear(&self, ws: &mut Option<WebSocketConnection>) {
        *ws = None;
        self.connected.store(false, Ordering::Release);
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for WebSocketTransport {
    fn connect(
        &mut self,
        url: &str,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        let url = url.to_string();
        Box::pin(async move {
            let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

            let (sink, stream) = ws_stream.split();
            *self.ws.get_mut() = Some(WebSocketConnection { sink, stream });
            self.connected.store(true, Ordering::Release);
            Ok(())
        })
    }

    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            self.connected.store(false, Ordering::Release);
            if let Some(mut ws) = self.ws.get_mut().take() {
                let _ = ws.sink.close().await;
            }
            Ok(())
        })
    }

    fn execute(
        &self,
        request: Request,
    ) -> Pin<Box<dyn Future<Output = TransportResult<Response>> + Send + '_>> {
        Box::pin(async move {
            let mut guard = self.ws.lock().await;
            let ws = guard.as_mut().ok_or(TransportError::ConnectionClosed)?;

            let id = self.request_id();
            let json = ClientMessage::request(id.clone(), request)
                .to_json()
                .map_err(|e| TransportError::SerializationError(e.to_string()))?;

            if let Err(e) = ws.sink.send(Message::Text(json.into())).await {
                self.clear(&mut guard);
                return Err(TransportError::SendFailed(e.to_string()));
            }

            // Flush to ensure the data is actually sent and we detect connection failures
            if let Err(e) = ws.sink.flush().await {
                self.clear(&mut guard);
                return Err(TransportError::SendFailed(e.to_string()));
            }

            loop {
                match ws.stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        let msg = ServerMessage::from_json(&text)
                            .map_err(|e| TransportError::SerializationError(e.to_string()))?;
                        if msg.request_id().is_some_and(|r| r != id) {
                            debug!("Skipping reply to {:?}", msg.request_id());
                            continue;
                        }
                        return match msg {
                            ServerMessage::Response { response, .. } => Ok(response),
                            ServerMessage::RequestError {
                                kind,
                                status,
                                detail,
                                ..
                            } => Err(TransportError::RequestError {
                                kind,
                                status,
                                detail,
                            }),
                        };
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        self.clear(&mut guard);
                        return Err(TransportError::ConnectionClosed);
                    }
                    Some(Ok(_)) => {
                        // Ignore ping/pong and binary frames
                        continue;
                    }
                    Some(Err(e)) => {
                        self.clear(&mut guard);
                        return Err(TransportError::ReceiveFailed(e.to_string()));
                    }
                }
            }
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

/// Reconnection backoff settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum reconnection attempts.
    pub max_retries: u32,
    /// Maximum delay between reconnection attempts (seconds).
    pub max_delay_secs: u64,
    /// Initial delay for exponential backoff (milliseconds).
    pub initial_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 10,
            max_delay_secs: 30,
            initial_delay_ms: 100,
        }
    }
}

/// Connect with exponential backoff retry.
pub async fn connect_with_retry<T: Transport>(
    transport: &mut T,
    url: &str,
    policy: &RetryPolicy,
) -> Result<()> {
    let mut attempt = 0;
    let mut delay_ms = policy.initial_delay_ms;

    loop {
        attempt += 1;
        match transport.connect(url).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= policy.max_retries => {
                warn!("Giving up on {} after {} attempts: {}", url, attempt, e);
                return Err(Error::MaxRetriesExceeded);
            }
            Err(e) => {
                debug!("Connect attempt {} to {} failed: {}", attempt, url, e);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = std::cmp::min(delay_ms * 2, policy.max_delay_secs * 1000);
            }
        }
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
