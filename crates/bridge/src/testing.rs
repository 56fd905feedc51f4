//! Loopback inspector for tests
//!
//! Accepts a single WebSocket connection on 127.0.0.1 and lets the test script
//! both sides of the conversation: read what the client sent, push responses
//! and events back.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// `asyncStackTrace` payload with `depth` segments linked through `parent`
pub fn deep_async_trace(depth: usize) -> Value {
    let mut trace = json!({ "description": format!("segment {}", depth - 1), "callFrames": [] });
    for i in (0..depth - 1).rev() {
        trace = json!({
            "description": format!("segment {i}"),
            "callFrames": [],
            "parent": trace
        });
    }
    trace
}

pub struct MockInspector {
    pub url: String,
    requests: mpsc::UnboundedReceiver<Value>,
    outgoing: mpsc::UnboundedSender<Option<Message>>,
}

impl MockInspector {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/inspector", listener.local_addr().unwrap());
        let (requests_tx, requests) = mpsc::unbounded_channel();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Option<Message>>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let (mut sink, mut stream) = ws.split();

            loop {
                tokio::select! {
                    msg = stream.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            let value: Value = serde_json::from_str(&text).unwrap();
                            let _ = requests_tx.send(value);
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        _ => {}
                    },
                    out = outgoing_rx.recv() => match out {
                        Some(Some(message)) => {
                            if sink.send(message).await.is_err() {
                                break;
                            }
                        }
                        Some(None) | None => {
                            let _ = sink.close().await;
                            break;
                        }
                    },
                }
            }
        });

        Self {
            url,
            requests,
            outgoing,
        }
    }

    /// Next request written by the client, fails the test after 5s
    pub async fn next_request(&mut self) -> Value {
        tokio::time::timeout(Duration::from_secs(5), self.requests.recv())
            .await
            .expect("timed out waiting for a request")
            .expect("mock connection ended")
    }

    /// Request already received, if any, without waiting
    pub fn try_next_request(&mut self) -> Option<Value> {
        self.requests.try_recv().ok()
    }

    pub fn reply(&self, request: &Value, result: Value) {
        self.send(json!({ "id": request["id"], "result": result }));
    }

    pub fn reply_error(&self, request: &Value, code: i32, message: &str) {
        self.send(json!({
            "id": request["id"],
            "error": { "code": code, "message": message }
        }));
    }

    pub fn event(&self, method: &str, params: Value) {
        self.send(json!({ "method": method, "params": params }));
    }

    pub fn raw(&self, text: &str) {
        let _ = self.outgoing.send(Some(Message::Text(text.to_string())));
    }

    pub fn disconnect(&self) {
        let _ = self.outgoing.send(None);
    }

    fn send(&self, value: Value) {
        self.raw(&value.to_string());
    }
}
