//! Bridge Controller
//!
//! Owns one inspector session from open to teardown:
//! connect, install handlers, run the setup sequence, wait for the debuggee's
//! execution context to go away, close.

use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

use crate::cdp::protocol::{methods, CDPEvent, ExceptionThrownParams};
use crate::cdp::CDPClient;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::events::{BridgeEvent, EventBus};
use crate::inspector::Inspector;
use crate::pause::PauseHandler;

/// Outcome of the setup sequence
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SetupReport {
    pub completed: Vec<&'static str>,
    pub failed: Vec<&'static str>,
}

impl SetupReport {
    pub fn is_degraded(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// The bridge between one debuggee and its observers
pub struct Bridge {
    pub config: BridgeConfig,
    pub event_bus: EventBus,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            event_bus: EventBus::new(),
        }
    }

    /// Attach to the inspector at `endpoint` and serve until the debuggee's
    /// execution context is destroyed or the connection drops.
    pub async fn attach(&self, endpoint: &str) -> Result<SetupReport> {
        let span = tracing::info_span!("bridge", id = %self.config.id);
        self.run(endpoint).instrument(span).await
    }

    async fn run(&self, endpoint: &str) -> Result<SetupReport> {
        // Fail before connecting rather than with a half-configured session
        let renderer = self.config.renderer()?;
        match url::Url::parse(endpoint) {
            Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
            _ => return Err(BridgeError::InvalidEndpoint(endpoint.to_string())),
        }

        let client = CDPClient::connect(endpoint)
            .await
            .map_err(BridgeError::Connection)?;
        tracing::info!(%endpoint, "connected to inspector");
        self.event_bus.publish(BridgeEvent::Activated);

        let (pause_tx, pause_rx) = mpsc::unbounded_channel::<CDPEvent>();
        client.subscribe(
            methods::DEBUGGER_PAUSED,
            Arc::new(move |event: CDPEvent| {
                let _ = pause_tx.send(event);
            }),
        );

        let events = self.event_bus.clone();
        client.subscribe(
            methods::RUNTIME_EXCEPTION_THROWN,
            Arc::new(move |event: CDPEvent| {
                match event.decode::<ExceptionThrownParams>() {
                    Ok(params) => events.publish(BridgeEvent::ExceptionThrown {
                        description: params.exception_details.summary().to_string(),
                    }),
                    Err(e) => tracing::debug!("Undecodable exceptionThrown: {}", e),
                }
            }),
        );

        let (destroyed_tx, mut destroyed_rx) = watch::channel(false);
        client.subscribe(
            methods::RUNTIME_EXECUTION_CONTEXT_DESTROYED,
            Arc::new(move |_: CDPEvent| {
                destroyed_tx.send_replace(true);
            }),
        );

        let inspector: Arc<dyn Inspector> = client.clone();
        let worker = PauseHandler::new(inspector.clone(), renderer, self.event_bus.clone())
            .patch_timeout(self.config.patch_timeout)
            .spawn(pause_rx);

        let report = self.configure(inspector.as_ref()).await;

        tokio::select! {
            destroyed = destroyed_rx.wait_for(|destroyed| *destroyed) => {
                // Err: the subscriber was dropped because the session closed
                if destroyed.is_ok() {
                    tracing::info!("execution context destroyed");
                }
            }
            _ = client.closed() => {
                tracing::info!("inspector connection lost");
            }
        }

        if let Err(e) = client.close().await {
            tracing::debug!("Close failed: {}", e);
        }

        // Closing dropped the subscribers, and with them the queue's sender
        match worker.await {
            Ok(handled) => tracing::debug!(handled, "pause worker finished"),
            Err(e) => tracing::error!("Pause worker panicked: {}", e),
        }

        self.event_bus.publish(BridgeEvent::Terminated);
        Ok(report)
    }

    /// Issue the setup commands one at a time, each awaited before the next.
    /// A failing step is reported and skipped.
    pub async fn configure(&self, inspector: &dyn Inspector) -> SetupReport {
        let mut report = SetupReport::default();

        for (step, params) in self.setup_steps() {
            match inspector.call(step, params).await {
                Ok(_) => {
                    tracing::debug!(step, "setup step done");
                    report.completed.push(step);
                }
                Err(source) => {
                    let error = BridgeError::Setup { step, source };
                    tracing::warn!("{}", error);
                    self.event_bus.publish(BridgeEvent::SetupDegraded {
                        step: step.to_string(),
                        error: error.to_string(),
                    });
                    report.failed.push(step);
                }
            }
        }

        report
    }

    fn setup_steps(&self) -> Vec<(&'static str, Option<serde_json::Value>)> {
        let config = &self.config;
        let mut steps = vec![
            (methods::RUNTIME_ENABLE, None),
            (
                methods::RUNTIME_SET_ASYNC_CALL_STACK_DEPTH,
                Some(json!({ "maxDepth": config.async_depth() })),
            ),
            (
                methods::DEBUGGER_ENABLE,
                Some(json!({ "maxScriptsCacheSize": config.max_scripts_cache_size })),
            ),
            (
                methods::DEBUGGER_SET_BLACKBOX_PATTERNS,
                Some(json!({ "patterns": [config.blacklist] })),
            ),
            (
                methods::DEBUGGER_SET_PAUSE_ON_EXCEPTIONS,
                Some(json!({ "state": config.pause_on_exceptions.as_str() })),
            ),
        ];
        if config.run_if_waiting {
            steps.push((methods::RUNTIME_RUN_IF_WAITING_FOR_DEBUGGER, None));
        }
        steps
    }
}
