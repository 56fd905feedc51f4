//! Inspector Bridge - Async stack traces for crashing debuggees
//!
//! This crate attaches to a runtime's inspector endpoint, waits for the
//! debuggee to pause on an exception, and appends the asynchronous call chain
//! to the exception's `stack` before letting it continue.
//!
//! # Architecture
//!
//! 1. **cdp**: one WebSocket, requests matched by ID, events fanned out by method
//! 2. **pause**: single worker draining a queue of pauses, always resuming
//! 3. **controller**: setup sequence and session lifetime
//! 4. **supervisor**: the debuggee process and its stderr

pub mod cdp;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod inspector;
pub mod pause;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use cdp::{CDPClient, CDPError};
pub use config::{BridgeConfig, LaunchConfig};
pub use controller::{Bridge, SetupReport};
pub use error::{BridgeError, Result};
pub use events::{BridgeEvent, EventBus};
pub use inspector::Inspector;
pub use pause::{PatchOutcome, PauseHandler};
pub use supervisor::Debuggee;
