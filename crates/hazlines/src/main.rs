//! hazlines - run a Node.js program and get async stack traces on crashes

use std::io::IsTerminal;
use std::process::ExitStatus;
use std::time::Duration;

use anyhow::Context;
use bridge::cdp::PauseOnExceptions;
use bridge::{Bridge, BridgeConfig, BridgeError, BridgeEvent, Debuggee, LaunchConfig, SetupReport};
use clap::builder::RangedU64ValueParser;
use clap::{Parser, ValueEnum};
use crossterm::style::Stylize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Runtime executable started with the inspector enabled
    #[arg(long, env = "HAZLINES_RUNTIME", default_value = "node")]
    runtime: String,

    /// Maximum number of asynchronous segments captured and printed (1-128)
    #[arg(
        long,
        env = "HAZLINES_ASYNC_DEPTH",
        default_value_t = trace::DEFAULT_MAX_DEPTH,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..=trace::MAX_ASYNC_DEPTH as u64)
    )]
    async_depth: usize,

    /// Which exceptions pause the debuggee
    #[arg(long, env = "HAZLINES_PAUSE_ON_EXCEPTIONS", value_enum, default_value_t = PauseMode::All)]
    pause_on_exceptions: PauseMode,

    /// Regex over frame URLs; matching frames are left out of traces
    #[arg(long, env = "HAZLINES_BLACKLIST", default_value = trace::DEFAULT_BLACKLIST)]
    blacklist: String,

    /// Color the appended stacks (judged on stderr) and our own output (on stdout)
    #[arg(long, env = "HAZLINES_COLOR", value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Print every thrown exception, caught or not. Otherwise they are only
    /// logged at `info` level.
    #[arg(long, env = "HAZLINES_SHOW_EXCEPTIONS")]
    show_exceptions: bool,

    /// Hold the program at its first line until the bridge is configured
    #[arg(long, env = "HAZLINES_WAIT_FOR_SETUP")]
    wait_for_setup: bool,

    /// Give up on patching a stack after this many milliseconds
    #[arg(long, env = "HAZLINES_PATCH_TIMEOUT_MS", default_value_t = 5000)]
    patch_timeout_ms: u64,

    /// Script to run, followed by the arguments passed through to it
    #[arg(required = true, trailing_var_arg = true, value_name = "SCRIPT [ARGS]")]
    command: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PauseMode {
    All,
    Uncaught,
    None,
}

impl From<PauseMode> for PauseOnExceptions {
    fn from(mode: PauseMode) -> Self {
        match mode {
            PauseMode::All => PauseOnExceptions::All,
            PauseMode::Uncaught => PauseOnExceptions::Uncaught,
            PauseMode::None => PauseOnExceptions::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    /// Whether output written to `stream` gets colored
    fn enabled(self, stream: &impl IsTerminal) -> bool {
        match self {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => stream.is_terminal(),
        }
    }
}

/// How bridge events are shown on stdout
#[derive(Debug, Clone, Copy)]
struct Presentation {
    color: bool,
    show_exceptions: bool,
}

impl Presentation {
    /// Text printed for `event`, if any
    fn line(&self, event: &BridgeEvent) -> Option<String> {
        match event {
            BridgeEvent::Activated => {
                let banner = "* hazlines activated";
                Some(if self.color {
                    banner.green().to_string()
                } else {
                    banner.to_string()
                })
            }
            BridgeEvent::UncaughtException { description, trace } => {
                Some(BridgeEvent::uncaught_report(description, trace))
            }
            BridgeEvent::ExceptionThrown { description } if self.show_exceptions => {
                Some(format!("* exception thrown: {description}"))
            }
            _ => None,
        }
    }
}

impl Args {
    /// `color` applies to the stacks the debuggee prints on stderr
    fn into_configs(self, color: bool) -> (BridgeConfig, LaunchConfig) {
        let bridge = BridgeConfig {
            max_async_depth: self.async_depth,
            pause_on_exceptions: self.pause_on_exceptions.into(),
            blacklist: self.blacklist,
            color,
            run_if_waiting: self.wait_for_setup,
            patch_timeout: Duration::from_millis(self.patch_timeout_ms),
            ..Default::default()
        };
        let mut command = self.command.into_iter();
        let launch = LaunchConfig {
            runtime: self.runtime,
            script: command.next().unwrap_or_default(),
            args: command.collect(),
            wait_for_setup: self.wait_for_setup,
        };
        (bridge, launch)
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("HAZLINES_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn print_events(mut rx: broadcast::Receiver<BridgeEvent>, presentation: Presentation) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let BridgeEvent::ExceptionThrown { description } = &event {
                    tracing::info!(%description, "exception thrown");
                }
                match presentation.line(&event) {
                    Some(line) => println!("{line}"),
                    None => tracing::debug!(?event, "bridge event"),
                }
            }
            Err(RecvError::Lagged(missed)) => tracing::warn!(missed, "dropped bridge events"),
            Err(RecvError::Closed) => break,
        }
    }
}

enum Finished {
    Debuggee(bridge::Result<ExitStatus>),
    Bridge(Result<bridge::Result<SetupReport>, tokio::task::JoinError>),
}

fn report_session(result: Result<bridge::Result<SetupReport>, tokio::task::JoinError>) -> bool {
    match result {
        Ok(Ok(report)) => {
            if report.is_degraded() {
                tracing::warn!(failed = ?report.failed, "async traces may be incomplete");
            }
            true
        }
        Ok(Err(e)) => {
            tracing::error!("{}", e);
            false
        }
        Err(e) => {
            tracing::error!("bridge task failed: {}", e);
            false
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging();

    let presentation = Presentation {
        color: args.color.enabled(&std::io::stdout()),
        show_exceptions: args.show_exceptions,
    };
    let stack_color = args.color.enabled(&std::io::stderr());
    let (config, launch) = args.into_configs(stack_color);
    config.renderer().context("invalid --blacklist")?;

    let (mut debuggee, endpoint) = Debuggee::spawn(&launch)?;

    let bridge = Bridge::new(config);
    let printer = tokio::spawn(print_events(bridge.event_bus.subscribe(), presentation));

    let mut session: JoinHandle<bridge::Result<SetupReport>> = tokio::spawn(async move {
        let endpoint = endpoint.await.map_err(|_| BridgeError::EndpointNotAnnounced)?;
        bridge.attach(&endpoint).await
    });

    let finished = tokio::select! {
        status = debuggee.wait() => Finished::Debuggee(status),
        result = &mut session => Finished::Bridge(result),
    };

    let status = match finished {
        Finished::Debuggee(status) => {
            // The bridge notices the closed socket on its own; give it a moment
            if let Ok(result) = tokio::time::timeout(Duration::from_secs(2), session).await {
                report_session(result);
            }
            status?
        }
        Finished::Bridge(result) => {
            if !report_session(result) && launch.wait_for_setup {
                // Nobody will ever release the debuggee from --inspect-brk
                debuggee.kill().await?;
            }
            debuggee.wait().await?
        }
    };

    let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;
    std::process::exit(status.code().unwrap_or(1));
}
