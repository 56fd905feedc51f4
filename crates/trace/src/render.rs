//! Trace Renderer - Convert an async trace into stack text
//!
//! This module handles:
//! - Walking the parent chain into segments
//! - Applying filter rules per frame (segments themselves are never dropped)
//! - Producing the text appended to an exception's `stack`
//!
//! Output layout, one line per header or frame:
//!
//! ```text
//!
//!   setTimeout
//!     at foo (/app/a.js:5:3)
//!   main
//!     at bar (/app/node_modules/x/b.js:10:1)
//! ```

use std::fmt;

use crossterm::style::Stylize;

use crate::chain::{TraceChain, DEFAULT_MAX_DEPTH};
use crate::filter::{display_path, FilterRules, FrameClass};
use crate::types::AsyncTrace;

const HEADER_INDENT: &str = "  ";
const FRAME_INDENT: &str = "    ";

/// How rendered text is decorated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Style {
    #[default]
    Plain,
    /// Yellow headers, dark grey dependency frames
    Ansi,
}

/// A frame that survived filtering, positions already one-based
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFrame {
    pub function_name: String,
    pub path: String,
    pub line: u32,
    pub column: u32,
    pub dimmed: bool,
}

impl fmt::Display for RenderedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "at {} ({}:{}:{})",
            self.function_name, self.path, self.line, self.column
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSegment {
    pub header: String,
    pub frames: Vec<RenderedFrame>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTrace {
    pub segments: Vec<RenderedSegment>,
    pub omitted: usize,
}

impl RenderedTrace {
    pub fn frames(&self) -> impl Iterator<Item = &RenderedFrame> {
        self.segments.iter().flat_map(|s| s.frames.iter())
    }

    pub fn to_text(&self, style: Style) -> String {
        let mut output = String::with_capacity(256);
        output.push('\n');

        for segment in &self.segments {
            output.push_str(HEADER_INDENT);
            match style {
                Style::Plain => output.push_str(&segment.header),
                Style::Ansi => output.push_str(&segment.header.as_str().yellow().to_string()),
            }
            output.push('\n');

            for frame in &segment.frames {
                output.push_str(FRAME_INDENT);
                match style {
                    Style::Ansi if frame.dimmed => {
                        output.push_str(&frame.to_string().dark_grey().to_string())
                    }
                    _ => output.push_str(&frame.to_string()),
                }
                output.push('\n');
            }
        }

        if self.omitted > 0 {
            output.push_str(&format!(
                "{HEADER_INDENT}... {} more asynchronous segment(s) omitted\n",
                self.omitted
            ));
        }

        output
    }
}

/// Trace renderer configuration
#[derive(Debug, Clone)]
pub struct Renderer {
    rules: FilterRules,
    style: Style,
    max_depth: usize,
}

impl Renderer {
    pub fn new() -> Self {
        Self::with_rules(FilterRules::default())
    }

    pub fn with_rules(rules: FilterRules) -> Self {
        Self {
            rules,
            style: Style::Plain,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn rules(&self) -> &FilterRules {
        &self.rules
    }

    /// Filter and format every segment, keeping the structure
    pub fn reconstruct(&self, trace: &AsyncTrace) -> RenderedTrace {
        let chain = TraceChain::walk(trace, self.max_depth);

        let segments = chain
            .iter()
            .map(|segment| RenderedSegment {
                header: segment.description.to_string(),
                frames: segment
                    .frames
                    .iter()
                    .filter_map(|frame| match self.rules.classify(frame) {
                        FrameClass::Kept { dimmed } => Some(RenderedFrame {
                            function_name: frame.display_name().to_string(),
                            path: display_path(&frame.url).to_string(),
                            line: frame.display_line(),
                            column: frame.display_column(),
                            dimmed,
                        }),
                        FrameClass::Blacklisted | FrameClass::NotLocal => None,
                    })
                    .collect(),
            })
            .collect();

        RenderedTrace {
            segments,
            omitted: chain.omitted(),
        }
    }

    /// Stack text to append to an exception
    pub fn render(&self, trace: &AsyncTrace) -> String {
        self.reconstruct(trace).to_text(self.style)
    }

    /// Like [`Renderer::render`], never decorated
    pub fn render_plain(&self, trace: &AsyncTrace) -> String {
        self.reconstruct(trace).to_text(Style::Plain)
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}
