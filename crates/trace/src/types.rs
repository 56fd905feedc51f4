//! Core type definitions matching the inspector's `Runtime.StackTrace`
//!
//! Key design principles:
//! 1. Deserialize straight from the wire shape (camelCase)
//! 2. Keep stored positions zero-based, convert only when displaying
//! 3. The parent link stays a `Box` here; walking it is `TraceChain`'s job

use serde::{Deserialize, Serialize};

/// One call-frame entry of a synchronous segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    /// Empty or missing for anonymous functions
    #[serde(default)]
    pub function_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_id: Option<String>,

    pub url: String,

    /// Zero-based
    pub line_number: u32,

    /// Zero-based
    pub column_number: u32,
}

impl Frame {
    pub fn new(
        function_name: impl Into<String>,
        url: impl Into<String>,
        line_number: u32,
        column_number: u32,
    ) -> Self {
        let function_name = function_name.into();
        Self {
            function_name: (!function_name.is_empty()).then_some(function_name),
            script_id: None,
            url: url.into(),
            line_number,
            column_number,
        }
    }

    /// Function name for display, `anonymous` when the runtime gave none
    pub fn display_name(&self) -> &str {
        match self.function_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => "anonymous",
        }
    }

    /// One-based line number
    pub fn display_line(&self) -> u32 {
        self.line_number.saturating_add(1)
    }

    /// One-based column number
    pub fn display_column(&self) -> u32 {
        self.column_number.saturating_add(1)
    }
}

/// One synchronous stack segment plus the segment that scheduled it
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncTrace {
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub call_frames: Vec<Frame>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<AsyncTrace>>,
}

impl AsyncTrace {
    pub fn new(description: impl Into<String>, call_frames: Vec<Frame>) -> Self {
        Self {
            description: Some(description.into()),
            call_frames,
            parent: None,
        }
    }

    /// Builder-style parent link
    pub fn with_parent(mut self, parent: AsyncTrace) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    pub fn from_json(value: serde_json::Value) -> crate::Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn header(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    /// Number of segments, this one included
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut current = self.parent.as_deref();
        while let Some(trace) = current {
            depth += 1;
            current = trace.parent.as_deref();
        }
        depth
    }
}
