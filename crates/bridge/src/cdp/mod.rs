//! CDP (Chrome DevTools Protocol) Client Implementation
//!
//! Core principle: one WebSocket to the debuggee's inspector, requests
//! correlated by ID, events fanned out by method name.

pub mod client;
pub mod protocol;

pub use client::{CDPClient, CDPError, EventCallback, SubscriptionId};
pub use protocol::{CDPEvent, CDPRequest, CDPResponse, PausedParams, PauseOnExceptions};
