//! Flattened async chain
//!
//! The wire format links segments through `parent`. Rendering wants them as a
//! flat, innermost-first sequence, so the links are walked exactly once here.
//!
//! ```text
//! AsyncTrace ──parent──▶ AsyncTrace ──parent──▶ AsyncTrace
//!     │                      │                      │
//!     ▼                      ▼                      ▼
//! [Segment 0]          [Segment 1]            [Segment 2]   (borrowed)
//! ```
//!
//! No recursion: a pathological chain costs a loop, not stack frames.

use smallvec::SmallVec;

use crate::types::{AsyncTrace, Frame};

/// Default cap on walked segments, matches the depth requested from the runtime
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Deepest chain the bridge will ask the runtime for
pub const MAX_ASYNC_DEPTH: usize = 128;

/// A single synchronous segment, borrowed from the trace it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub description: &'a str,
    pub frames: &'a [Frame],
}

/// Innermost-first segment list of one async trace
#[derive(Debug, Clone)]
pub struct TraceChain<'a> {
    segments: SmallVec<[Segment<'a>; 8]>,

    /// Segments past `max_depth` that were not walked into `segments`
    omitted: usize,
}

impl<'a> TraceChain<'a> {
    /// Walk `trace` and its parents, keeping at most `max_depth` segments
    pub fn walk(trace: &'a AsyncTrace, max_depth: usize) -> Self {
        let mut segments = SmallVec::new();
        let mut omitted = 0;
        let mut current = Some(trace);

        while let Some(trace) = current {
            if segments.len() < max_depth {
                segments.push(Segment {
                    description: trace.header(),
                    frames: &trace.call_frames,
                });
            } else {
                omitted += 1;
            }
            current = trace.parent.as_deref();
        }

        Self { segments, omitted }
    }

    pub fn segments(&self) -> &[Segment<'a>] {
        &self.segments
    }

    pub fn omitted(&self) -> usize {
        self.omitted
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment<'a>> {
        self.segments.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_of(depth: usize) -> AsyncTrace {
        let mut trace = AsyncTrace::new(format!("segment {}", depth - 1), Vec::new());
        for i in (0..depth - 1).rev() {
            trace = AsyncTrace::new(format!("segment {i}"), Vec::new()).with_parent(trace);
        }
        trace
    }

    #[test]
    fn test_walk_is_innermost_first() {
        let trace = chain_of(3);
        let chain = TraceChain::walk(&trace, DEFAULT_MAX_DEPTH);

        let headers: Vec<_> = chain.iter().map(|s| s.description).collect();
        assert_eq!(headers, ["segment 0", "segment 1", "segment 2"]);
        assert_eq!(chain.omitted(), 0);
    }

    #[test]
    fn test_walk_truncates_at_max_depth() {
        let trace = chain_of(10);
        let chain = TraceChain::walk(&trace, 4);

        assert_eq!(chain.len(), 4);
        assert_eq!(chain.omitted(), 6);
        assert_eq!(chain.segments()[3].description, "segment 3");
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let trace = chain_of(1_000);
        let chain = TraceChain::walk(&trace, usize::MAX);
        assert_eq!(chain.len(), 1_000);
    }
}
