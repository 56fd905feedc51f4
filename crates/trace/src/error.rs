//! Error types for trace reconstruction
//!
//! Rendering itself cannot fail. Only building filter rules from user input can.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TraceError>;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("Invalid blacklist pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),
}
