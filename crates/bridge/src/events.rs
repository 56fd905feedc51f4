//! Event Bus - What the bridge tells its observers
//!
//! Design: one enum, broadcast to any number of subscribers. The CLI prints
//! from it; tests assert on it. Publishing never blocks and never fails.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Bridge events that can be observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeEvent {
    /// Connection to the inspector is open
    Activated,
    /// A setup command failed; tracing runs with whatever did get enabled
    SetupDegraded { step: String, error: String },
    /// Raw `Runtime.exceptionThrown` notification
    ExceptionThrown { description: String },
    /// An uncaught exception paused the debuggee; `trace` is the rendered chain
    UncaughtException { description: String, trace: String },
    /// The async trace was appended to the exception's stack
    TracePatched,
    /// The stack could not be patched; execution resumed anyway
    PatchFailed { error: String },
    /// Session over
    Terminated,
}

impl BridgeEvent {
    /// Text printed for an uncaught exception: description, then the trace
    pub fn uncaught_report(description: &str, trace: &str) -> String {
        format!("{description}\n{trace}")
    }
}

/// Simple event bus using tokio broadcast channel
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BridgeEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Publish an event
    pub fn publish(&self, event: BridgeEvent) {
        tracing::debug!(?event, "publish");
        let _ = self.tx.send(event); // Ignore error if no subscribers
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
