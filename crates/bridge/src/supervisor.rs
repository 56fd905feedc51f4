//! Debuggee Supervisor - Spawns the runtime and routes its stderr
//!
//! The runtime announces its inspector endpoint on stderr:
//!
//! ```text
//! Debugger listening on ws://127.0.0.1:40123/6f1e…
//! For help, see: https://nodejs.org/en/docs/inspector
//! Debugger attached.
//! ```
//!
//! Until `Debugger attached` shows up stderr is read line by line so the
//! endpoint can be picked out; after that bytes are passed through untouched.

use std::net::TcpListener;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::LaunchConfig;
use crate::error::{BridgeError, Result};

const LISTENING_PREFIX: &str = "Debugger listening on";
const ATTACHED_PREFIX: &str = "Debugger attached";
const DISCONNECT_NOTICE: &str = "Waiting for the debugger to disconnect...";

/// Reserve a free local port by binding port 0 and reading what the OS picked
pub fn free_port() -> Result<u16> {
    for _ in 0..50 {
        match TcpListener::bind("127.0.0.1:0").and_then(|l| l.local_addr()) {
            Ok(addr) => return Ok(addr.port()),
            Err(e) => tracing::warn!(%e, "binding"),
        }
    }
    Err(BridgeError::NoFreePort)
}

/// Pull the WebSocket URI out of a `Debugger listening on <uri>` announcement
pub fn parse_listening_line(text: &str) -> Option<String> {
    let rest = text.strip_prefix(LISTENING_PREFIX)?;
    let uri = rest.split('\n').next().unwrap_or("").trim();

    match url::Url::parse(uri) {
        Ok(url) if matches!(url.scheme(), "ws" | "wss") => Some(uri.to_string()),
        _ => {
            tracing::warn!(uri, "ignoring malformed inspector announcement");
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Line-oriented, watching for the announcement and the attach notice
    Announcing,
    /// Raw pass-through
    Forwarding,
}

/// Stderr routing state machine, fed chunk by chunk
#[derive(Debug)]
pub struct StderrRouter {
    mode: Mode,
    line: Vec<u8>,
    endpoint: Option<oneshot::Sender<String>>,
}

impl StderrRouter {
    pub fn new(endpoint: oneshot::Sender<String>) -> Self {
        Self {
            mode: Mode::Announcing,
            line: Vec::new(),
            endpoint: Some(endpoint),
        }
    }

    pub fn is_forwarding(&self) -> bool {
        self.mode == Mode::Forwarding
    }

    /// Route one chunk; bytes meant for the parent's stderr land in `out`
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        if self.mode == Mode::Forwarding {
            if String::from_utf8_lossy(chunk).trim() != DISCONNECT_NOTICE {
                out.extend_from_slice(chunk);
            }
            return;
        }

        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            self.line.extend_from_slice(&rest[..=pos]);
            rest = &rest[pos + 1..];

            let line = std::mem::take(&mut self.line);
            self.route_line(&line, out);

            if self.mode == Mode::Forwarding {
                self.feed(rest, out);
                return;
            }
        }
        self.line.extend_from_slice(rest);
    }

    /// Stream ended; flush a trailing line that never got its newline
    pub fn finish(&mut self, out: &mut Vec<u8>) {
        let line = std::mem::take(&mut self.line);
        if !line.is_empty() {
            self.route_line(&line, out);
        }
    }

    fn route_line(&mut self, line: &[u8], out: &mut Vec<u8>) {
        let text = String::from_utf8_lossy(line);

        if text.starts_with(LISTENING_PREFIX) {
            if let Some(uri) = parse_listening_line(&text) {
                tracing::debug!(%uri, "inspector endpoint announced");
                if let Some(tx) = self.endpoint.take() {
                    let _ = tx.send(uri);
                }
                return;
            }
        } else if text.starts_with(ATTACHED_PREFIX) {
            tracing::debug!("debugger attached, forwarding stderr");
            self.mode = Mode::Forwarding;
            return;
        }

        out.extend_from_slice(line);
    }
}

/// A running debuggee process
pub struct Debuggee {
    child: Child,
    port: u16,
    stderr_task: Option<JoinHandle<std::io::Result<()>>>,
}

impl Debuggee {
    /// Spawn `runtime --inspect=... script args...`.
    ///
    /// The receiver yields the inspector endpoint once announced; it errors if
    /// the process ends first.
    pub fn spawn(launch: &LaunchConfig) -> Result<(Self, oneshot::Receiver<String>)> {
        let port = free_port()?;
        let args = launch.runtime_args(port);
        tracing::debug!(runtime = %launch.runtime, ?args, "spawning debuggee");

        let mut child = Command::new(&launch.runtime)
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BridgeError::Spawn {
                runtime: launch.runtime.clone(),
                source,
            })?;

        let stderr = child.stderr.take().ok_or(BridgeError::EndpointNotAnnounced)?;
        let (tx, rx) = oneshot::channel();
        let stderr_task = tokio::spawn(route_stderr(stderr, StderrRouter::new(tx)));

        Ok((
            Self {
                child,
                port,
                stderr_task: Some(stderr_task),
            },
            rx,
        ))
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for exit, then for the last of stderr to be forwarded
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        let status = self.child.wait().await?;
        if let Some(task) = self.stderr_task.take() {
            match task.await {
                Ok(Err(e)) => tracing::warn!("stderr forwarding failed: {}", e),
                Err(e) => tracing::warn!("stderr task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }
        Ok(status)
    }

    pub async fn kill(&mut self) -> Result<()> {
        self.child.kill().await?;
        Ok(())
    }
}

async fn route_stderr(mut stderr: ChildStderr, mut router: StderrRouter) -> std::io::Result<()> {
    let mut parent = tokio::io::stderr();
    let mut buf = vec![0u8; 8192];
    let mut out = Vec::with_capacity(8192);

    loop {
        let n = stderr.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        router.feed(&buf[..n], &mut out);
        if !out.is_empty() {
            parent.write_all(&out).await?;
            parent.flush().await?;
            out.clear();
        }
    }

    router.finish(&mut out);
    parent.write_all(&out).await?;
    parent.flush().await
}
