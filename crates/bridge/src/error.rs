//! Bridge-level errors
//!
//! `Patch` and `Setup` are never returned out of the bridge: they are built
//! for logging and for the event bus, then execution carries on.

use thiserror::Error;

use crate::cdp::CDPError;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Cannot reach inspector: {0}")]
    Connection(#[source] CDPError),

    #[error("Failed to spawn `{runtime}`: {source}")]
    Spawn {
        runtime: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Debuggee exited before announcing an inspector endpoint")]
    EndpointNotAnnounced,

    #[error("Invalid inspector endpoint {0:?}")]
    InvalidEndpoint(String),

    #[error("Could not reserve a local port for the inspector")]
    NoFreePort,

    #[error("Stack patch failed: {0}")]
    Patch(#[source] CDPError),

    #[error("Setup step {step} failed: {source}")]
    Setup {
        step: &'static str,
        #[source]
        source: CDPError,
    },

    #[error("Invalid trace settings: {0}")]
    Trace(#[from] trace::TraceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
