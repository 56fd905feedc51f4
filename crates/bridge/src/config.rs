//! Bridge and launch configuration
//!
//! There is no config file: the CLI fills these from flags and environment
//! variables, tests build them directly.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::cdp::PauseOnExceptions;
use trace::{FilterRules, Renderer, Style, DEFAULT_BLACKLIST, DEFAULT_MAX_DEPTH, MAX_ASYNC_DEPTH};

/// How the session with the inspector is configured
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Bridge session id, shows up in every log line of the session
    pub id: String,

    /// `Runtime.setAsyncCallStackDepth` and the render depth cap, see
    /// [`BridgeConfig::async_depth`]
    pub max_async_depth: usize,

    /// `Debugger.enable` `maxScriptsCacheSize`
    pub max_scripts_cache_size: u64,

    pub pause_on_exceptions: PauseOnExceptions,

    /// Regex over frame URLs; matching frames are dropped and blackboxed
    pub blacklist: String,

    /// Color the trace text spliced into exception stacks
    pub color: bool,

    /// Send `Runtime.runIfWaitingForDebugger` after setup
    pub run_if_waiting: bool,

    /// Upper bound on the stack patch request
    #[serde(with = "millis")]
    pub patch_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            max_async_depth: DEFAULT_MAX_DEPTH,
            max_scripts_cache_size: 100_000_000,
            pause_on_exceptions: PauseOnExceptions::All,
            blacklist: DEFAULT_BLACKLIST.to_string(),
            color: false,
            run_if_waiting: false,
            patch_timeout: Duration::from_secs(5),
        }
    }
}

impl BridgeConfig {
    /// `max_async_depth` clamped to `1..=MAX_ASYNC_DEPTH`
    pub fn async_depth(&self) -> usize {
        self.max_async_depth.clamp(1, MAX_ASYNC_DEPTH)
    }

    /// Build the renderer these settings describe
    pub fn renderer(&self) -> trace::Result<Renderer> {
        let rules = FilterRules::new(&self.blacklist)?;
        let style = if self.color { Style::Ansi } else { Style::Plain };
        Ok(Renderer::with_rules(rules)
            .style(style)
            .max_depth(self.async_depth()))
    }
}

/// How the debuggee process is started
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Runtime executable, `node` unless overridden
    pub runtime: String,

    pub script: String,

    pub args: Vec<String>,

    /// Use `--inspect-brk` so nothing runs before setup completes
    pub wait_for_setup: bool,
}

impl LaunchConfig {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            runtime: "node".to_string(),
            script: script.into(),
            args: Vec::new(),
            wait_for_setup: false,
        }
    }

    /// Inspector flag plus script and its arguments
    pub fn runtime_args(&self, port: u16) -> Vec<String> {
        let flag = if self.wait_for_setup {
            "--inspect-brk"
        } else {
            "--inspect"
        };
        let mut args = vec![format!("{flag}=127.0.0.1:{port}"), self.script.clone()];
        args.extend(self.args.iter().cloned());
        args
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
