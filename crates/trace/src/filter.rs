//! Frame filtering rules
//!
//! Three outcomes per frame, decided by `url` alone:
//! - blacklisted (runtime internals, package-manager shims): dropped
//! - not a `file://` location: dropped
//! - inside a dependency directory: kept, but dimmed

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, TraceError};
use crate::types::Frame;

/// Runtime internals and package-manager entry points
pub const DEFAULT_BLACKLIST: &str = r"^internal[/].*|bin/npm-cli.js$|bin/yarn.js$";

/// Only frames with this scheme point at something a reader can open
pub const LOCAL_FILE_SCHEME: &str = "file://";

/// Path component marking third-party code
pub const DEPENDENCY_DIR: &str = "node_modules";

static DEFAULT_BLACKLIST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(DEFAULT_BLACKLIST).expect("must compile"));

/// What the rules decided for a single frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    Blacklisted,
    NotLocal,
    Kept { dimmed: bool },
}

impl FrameClass {
    pub fn is_kept(self) -> bool {
        matches!(self, FrameClass::Kept { .. })
    }
}

#[derive(Debug, Clone)]
pub struct FilterRules {
    blacklist: Option<Regex>,
}

impl FilterRules {
    /// Rules with a custom blacklist pattern
    pub fn new(pattern: &str) -> Result<Self> {
        let blacklist = Regex::new(pattern).map_err(|source| TraceError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            blacklist: Some(blacklist),
        })
    }

    /// Rules that only apply the scheme and dependency checks
    pub fn without_blacklist() -> Self {
        Self { blacklist: None }
    }

    pub fn blacklist_pattern(&self) -> Option<&str> {
        self.blacklist.as_ref().map(Regex::as_str)
    }

    pub fn classify(&self, frame: &Frame) -> FrameClass {
        let url = frame.url.as_str();

        if self.blacklist.as_ref().is_some_and(|re| re.is_match(url)) {
            return FrameClass::Blacklisted;
        }

        if !url.starts_with(LOCAL_FILE_SCHEME) {
            return FrameClass::NotLocal;
        }

        FrameClass::Kept {
            dimmed: is_dependency_path(url),
        }
    }

    pub fn keeps(&self, frame: &Frame) -> bool {
        self.classify(frame).is_kept()
    }

    /// Surviving frames, original relative order preserved
    pub fn retain<'a, I>(&self, frames: I) -> Vec<&'a Frame>
    where
        I: IntoIterator<Item = &'a Frame>,
    {
        frames.into_iter().filter(|f| self.keeps(f)).collect()
    }
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            blacklist: Some(DEFAULT_BLACKLIST_RE.clone()),
        }
    }
}

/// Strip the `file://` scheme, leaving a plain filesystem path
pub fn display_path(url: &str) -> &str {
    url.strip_prefix(LOCAL_FILE_SCHEME).unwrap_or(url)
}

fn is_dependency_path(url: &str) -> bool {
    display_path(url)
        .split(['/', '\\'])
        .any(|component| component == DEPENDENCY_DIR)
}
