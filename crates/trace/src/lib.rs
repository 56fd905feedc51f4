//! Async Stack Trace Reconstruction
//!
//! Turns the inspector's `asyncStackTrace` record into readable stack text.
//!
//! ## Core Design
//!
//! ```text
//! CDP JSON → AsyncTrace (owned) → TraceChain (borrowed) → FilterRules → RenderedTrace → String
//! ```
//!
//! Everything here is pure: no I/O, no clocks, no globals beyond the compiled
//! default blacklist.

pub mod chain;
pub mod error;
pub mod filter;
pub mod render;
pub mod types;

pub use chain::{Segment, TraceChain, DEFAULT_MAX_DEPTH, MAX_ASYNC_DEPTH};
pub use error::{Result, TraceError};
pub use filter::{FilterRules, FrameClass, DEFAULT_BLACKLIST};
pub use render::{RenderedFrame, RenderedSegment, RenderedTrace, Renderer, Style};
pub use types::*;
