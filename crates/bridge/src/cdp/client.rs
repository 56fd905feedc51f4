//! CDP Client - The Core Communication Layer
//!
//! Design decisions:
//! 1. Single WebSocket per debuggee
//! 2. Reader task owns the read half; writers share the sink behind a mutex
//! 3. Request/response matching via ID, events fan out to subscribers by method
//! 4. Fail fast - no retries, no queuing. Let the caller decide.

use dashmap::DashMap;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::protocol::*;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

#[derive(Error, Debug)]
pub enum CDPError {
    #[error("Failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CDP protocol error: {code} - {message}")]
    Protocol { code: i32, message: String },

    #[error("Request timeout")]
    Timeout,

    #[error("Session closed")]
    Closed,
}

/// Result type for CDP operations
pub type Result<T> = std::result::Result<T, CDPError>;

/// Event subscriber callback
pub type EventCallback = Arc<dyn Fn(CDPEvent) + Send + Sync>;

/// Handle returned by [`CDPClient::subscribe`], used to unsubscribe
pub type SubscriptionId = u64;

/// CDP Client - manages single WebSocket connection to the debuggee
pub struct CDPClient {
    /// Monotonic request ID counter
    next_id: AtomicU64,

    /// Monotonic subscription ID counter
    next_subscription: AtomicU64,

    /// Pending requests waiting for responses
    /// Key: request_id, Value: oneshot sender for response
    pending: Arc<DashMap<RequestId, oneshot::Sender<CDPResponse>>>,

    /// Event subscribers, in registration order
    /// Key: method name (e.g., "Debugger.paused"), Value: callbacks
    subscribers: Arc<DashMap<String, Vec<(SubscriptionId, EventCallback)>>>,

    /// WebSocket write half
    ws_sink: Mutex<WsSink>,

    /// Flips to `true` exactly once, on local close or connection loss
    closed: watch::Sender<bool>,

    /// Guards `close()` so only the first call does the work
    closing: AtomicBool,
}

impl CDPClient {
    /// Connect to the debuggee's inspector endpoint
    pub async fn connect(ws_url: &str) -> Result<Arc<Self>> {
        let (ws_stream, _) = connect_async(ws_url)
            .await
            .map_err(|source| CDPError::Connect {
                url: ws_url.to_string(),
                source,
            })?;
        let (sink, mut stream) = ws_stream.split();

        let (closed, _) = watch::channel(false);
        let client = Arc::new(Self {
            next_id: AtomicU64::new(1),
            next_subscription: AtomicU64::new(1),
            pending: Arc::new(DashMap::new()),
            subscribers: Arc::new(DashMap::new()),
            ws_sink: Mutex::new(sink),
            closed,
            closing: AtomicBool::new(false),
        });

        // The reader task holds only a weak handle so dropping the client ends it
        let weak = Arc::downgrade(&client);
        let mut shutdown_rx = client.closed.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = stream.next() => {
                        let Some(client) = weak.upgrade() else { break };
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                if let Err(e) = client.handle_message(&text) {
                                    tracing::warn!("Ignoring malformed message: {}", e);
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                tracing::info!("WebSocket closed");
                                break;
                            }
                            Some(Err(e)) => {
                                tracing::error!("WebSocket error: {}", e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.wait_for(|closed| *closed) => {
                        tracing::debug!("Shutdown signal received");
                        break;
                    }
                }
            }

            if let Some(client) = weak.upgrade() {
                client.mark_closed();
            }
        });

        Ok(client)
    }

    /// Send CDP request and wait for response
    pub async fn send_request(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> Result<Value> {
        if self.is_closed() {
            return Err(CDPError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = CDPRequest {
            id,
            method: method.into(),
            params,
        };
        let json = serde_json::to_string(&request)?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        // close() sets the flag before clearing the map, so re-checking here
        // guarantees the entry cannot outlive the session
        if self.is_closed() {
            self.pending.remove(&id);
            return Err(CDPError::Closed);
        }

        tracing::trace!(id, method = %request.method, "sending request");
        let sent = self.ws_sink.lock().await.send(Message::Text(json)).await;
        if let Err(e) = sent {
            self.pending.remove(&id);
            return Err(CDPError::WebSocket(e));
        }

        // Dropped sender means the session closed before the response arrived
        let response = rx.await.map_err(|_| CDPError::Closed)?;

        if let Some(error) = response.error {
            return Err(CDPError::Protocol {
                code: error.code,
                message: error.message,
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Subscribe to CDP events
    pub fn subscribe(&self, method: impl Into<String>, callback: EventCallback) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .entry(method.into())
            .or_default()
            .push((id, callback));
        id
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub fn unsubscribe(&self, method: &str, subscription: SubscriptionId) -> bool {
        let Some(mut callbacks) = self.subscribers.get_mut(method) else {
            return false;
        };
        let before = callbacks.len();
        callbacks.retain(|(id, _)| *id != subscription);
        before != callbacks.len()
    }

    /// Number of requests still waiting for a response
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the session is closed, locally or by the debuggee
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Handle incoming WebSocket message
    fn handle_message(&self, text: &str) -> Result<()> {
        let msg = parse_message(text)?;

        match msg {
            CDPMessage::Response(response) => {
                if let Some((_, tx)) = self.pending.remove(&response.id) {
                    let _ = tx.send(response); // Ignore send errors (receiver dropped)
                } else {
                    tracing::warn!("Received response for unknown request: {}", response.id);
                }
            }
            CDPMessage::Event(event) => {
                if event.method == methods::DEBUGGER_SCRIPT_PARSED {
                    return Ok(());
                }

                // Snapshot so callbacks may (un)subscribe without deadlocking the map
                let callbacks: Vec<EventCallback> = match self.subscribers.get(&event.method) {
                    Some(subscribers) => subscribers.iter().map(|(_, cb)| cb.clone()).collect(),
                    None => {
                        tracing::trace!(method = %event.method, "no subscriber for event");
                        return Ok(());
                    }
                };
                for callback in callbacks {
                    callback(event.clone());
                }
            }
        }

        Ok(())
    }

    /// Reject everything in flight and drop subscribers
    fn mark_closed(&self) {
        self.closed.send_replace(true);
        self.pending.clear();
        self.subscribers.clear();
    }

    /// Close connection gracefully. Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        if self.closing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let already_closed = self.is_closed();
        self.mark_closed();

        if already_closed {
            return Ok(());
        }

        let mut sink = self.ws_sink.lock().await;
        match sink.close().await {
            Ok(())
            | Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed)
            | Err(tokio_tungstenite::tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Decode one inbound frame.
///
/// A deep `asyncStackTrace` nests past serde_json's default recursion limit.
/// Such a pause must still reach its handler, so frames rejected by the
/// bounded parse get a second, unbounded one.
fn parse_message(text: &str) -> serde_json::Result<CDPMessage> {
    serde_json::from_str(text).or_else(|e| {
        tracing::debug!("Bounded parse failed ({}), retrying without depth limit", e);
        let mut de = serde_json::Deserializer::from_str(text);
        de.disable_recursion_limit();
        let msg = CDPMessage::deserialize(&mut de)?;
        de.end()?;
        Ok(msg)
    })
}
