//! Pause Handler - Patches exception stacks while the debuggee is stopped
//!
//! Per pause:
//!
//! ```text
//! paused ──trace──▶ render ──▶ patch ──▶ resume
//!    └────────────── no trace ───────────▶ resume
//! ```
//!
//! Only thrown `Error`s are patched. Any other thrown value keeps its shape.
//!
//! Whatever happens in between, every pause ends with exactly one
//! `Debugger.resume`. Pauses are queued and handled one at a time by a single
//! worker task, so two pauses can never interleave their patch and resume.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::cdp::client::CDPError;
use crate::cdp::protocol::{methods, CDPEvent, ExceptionData, PausedParams};
use crate::error::BridgeError;
use crate::events::{BridgeEvent, EventBus};
use crate::inspector::Inspector;
use trace::Renderer;

/// Evaluated with `this` bound to the paused exception. Appends the trace and
/// collapses runs of blank lines into one; returns `false` without touching
/// values that carry no string `stack`.
pub const PATCH_FUNCTION: &str = r#"function (trace) {
  if (typeof this.stack !== 'string') return false;
  this.stack = (this.stack + trace).replace(/\n{3,}/g, '\n\n');
  return true;
}"#;

/// What happened to the exception's stack during one pause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// Plain pause, nothing to patch
    NoTrace,
    /// Trace present but the pause carries no exception object to patch
    NoExceptionObject,
    /// The thrown value is not an error with a string `stack`
    NotAnError,
    Patched,
    Failed,
}

pub struct PauseHandler {
    inspector: Arc<dyn Inspector>,
    renderer: Renderer,
    events: EventBus,
    patch_timeout: Duration,
}

impl PauseHandler {
    pub fn new(inspector: Arc<dyn Inspector>, renderer: Renderer, events: EventBus) -> Self {
        Self {
            inspector,
            renderer,
            events,
            patch_timeout: Duration::from_secs(5),
        }
    }

    pub fn patch_timeout(mut self, timeout: Duration) -> Self {
        self.patch_timeout = timeout;
        self
    }

    /// Handle one `Debugger.paused` and resume the debuggee
    pub async fn handle(&self, params: PausedParams) -> PatchOutcome {
        tracing::debug!(reason = %params.reason, "paused");

        let outcome = match params.async_stack_trace {
            None => PatchOutcome::NoTrace,
            Some(ref trace) => {
                let data = params.data.clone().unwrap_or_default();
                let outcome = self
                    .patch_exception(&data, &self.renderer.render(trace))
                    .await;

                // Printed by the observer, so never carries stack styling
                if data.uncaught {
                    self.events.publish(BridgeEvent::UncaughtException {
                        description: data.description.unwrap_or_default(),
                        trace: self.renderer.render_plain(trace),
                    });
                }
                outcome
            }
        };

        self.resume().await;
        outcome
    }

    async fn patch_exception(&self, data: &ExceptionData, text: &str) -> PatchOutcome {
        let Some(object_id) = data.object_id.as_deref() else {
            tracing::debug!("Pause has a trace but no exception object, not patching");
            return PatchOutcome::NoExceptionObject;
        };

        if data.subtype.as_deref() != Some("error") {
            tracing::debug!(kind = %data.object_type, "Thrown value is not an error, not patching");
            return PatchOutcome::NotAnError;
        }

        match self.patch(object_id, text).await {
            Ok(true) => {
                self.events.publish(BridgeEvent::TracePatched);
                PatchOutcome::Patched
            }
            Ok(false) => {
                tracing::debug!("Exception has no string stack, left untouched");
                PatchOutcome::NotAnError
            }
            Err(e) => {
                let error = BridgeError::Patch(e);
                tracing::warn!("{}", error);
                self.events.publish(BridgeEvent::PatchFailed {
                    error: error.to_string(),
                });
                PatchOutcome::Failed
            }
        }
    }

    /// Append `text` to the `stack` of the object behind `object_id`.
    /// `Ok(false)` when the object had no string `stack`.
    async fn patch(&self, object_id: &str, text: &str) -> Result<bool, CDPError> {
        let request = self.inspector.call(
            methods::RUNTIME_CALL_FUNCTION_ON,
            Some(json!({
                "objectId": object_id,
                "functionDeclaration": PATCH_FUNCTION,
                "arguments": [{ "value": text }],
                "silent": true,
                "returnByValue": true,
            })),
        );

        let result = tokio::time::timeout(self.patch_timeout, request)
            .await
            .map_err(|_| CDPError::Timeout)??;

        // The call itself succeeded but the function threw inside the debuggee
        if let Some(details) = result.get("exceptionDetails") {
            return Err(CDPError::Protocol {
                code: 0,
                message: details["text"].as_str().unwrap_or("exception").to_string(),
            });
        }
        Ok(result["result"]["value"] != Value::Bool(false))
    }

    async fn resume(&self) {
        if let Err(e) = self.inspector.call(methods::DEBUGGER_RESUME, None).await {
            tracing::warn!("Resume failed: {}", e);
        }
    }

    /// Run the pause queue until every sender is gone. Returns pauses handled.
    pub fn spawn(self, mut queue: mpsc::UnboundedReceiver<CDPEvent>) -> JoinHandle<usize> {
        let span = tracing::debug_span!("pause_worker");
        tokio::spawn(
            async move {
                let mut handled = 0;
                while let Some(event) = queue.recv().await {
                    match event.decode::<PausedParams>() {
                        Ok(params) => {
                            let outcome = self.handle(params).await;
                            tracing::debug!(?outcome, "pause handled");
                        }
                        Err(e) => {
                            tracing::warn!("Undecodable pause payload, resuming anyway: {}", e);
                            self.resume().await;
                        }
                    }
                    handled += 1;
                }
                handled
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::mock::{Answer, RecordingInspector};
    use tokio::sync::broadcast::error::TryRecvError;
    use trace::{AsyncTrace, Frame, Style};

    fn sample_trace() -> AsyncTrace {
        AsyncTrace::new(
            "setTimeout",
            vec![Frame::new("foo", "file:///app/a.js", 4, 2)],
        )
    }

    fn exception(uncaught: bool) -> ExceptionData {
        ExceptionData {
            object_type: "object".into(),
            subtype: Some("error".into()),
            class_name: Some("Error".into()),
            description: Some("Error: boom".into()),
            object_id: Some("{\"injectedScriptId\":1,\"id\":7}".into()),
            uncaught,
        }
    }

    fn paused(trace: Option<AsyncTrace>, data: Option<ExceptionData>) -> PausedParams {
        PausedParams {
            reason: "exception".into(),
            data,
            async_stack_trace: trace,
        }
    }

    fn handler(inspector: Arc<RecordingInspector>) -> (PauseHandler, EventBus) {
        let events = EventBus::new();
        let handler = PauseHandler::new(inspector, Renderer::new(), events.clone())
            .patch_timeout(Duration::from_millis(100));
        (handler, events)
    }

    #[tokio::test]
    async fn test_pause_without_trace_only_resumes() {
        let inspector = Arc::new(RecordingInspector::new());
        let (handler, _) = handler(inspector.clone());

        let outcome = handler.handle(paused(None, Some(exception(false)))).await;

        assert_eq!(outcome, PatchOutcome::NoTrace);
        assert_eq!(inspector.methods(), [methods::DEBUGGER_RESUME]);
    }

    #[tokio::test]
    async fn test_pause_with_trace_patches_then_resumes() {
        let inspector = Arc::new(RecordingInspector::new());
        let (handler, events) = handler(inspector.clone());
        let mut rx = events.subscribe();

        let outcome = handler
            .handle(paused(Some(sample_trace()), Some(exception(false))))
            .await;

        assert_eq!(outcome, PatchOutcome::Patched);
        assert_eq!(
            inspector.methods(),
            [methods::RUNTIME_CALL_FUNCTION_ON, methods::DEBUGGER_RESUME]
        );

        let params = inspector
            .params_of(methods::RUNTIME_CALL_FUNCTION_ON)
            .unwrap();
        assert_eq!(params["objectId"], "{\"injectedScriptId\":1,\"id\":7}");
        assert_eq!(params["functionDeclaration"], PATCH_FUNCTION);
        assert_eq!(
            params["arguments"][0]["value"],
            "\n  setTimeout\n    at foo (/app/a.js:5:3)\n"
        );
        assert_eq!(rx.recv().await.unwrap(), BridgeEvent::TracePatched);
    }

    #[tokio::test]
    async fn test_failed_patch_still_resumes() {
        let inspector = Arc::new(
            RecordingInspector::new().answer(methods::RUNTIME_CALL_FUNCTION_ON, Answer::Fail),
        );
        let (handler, events) = handler(inspector.clone());
        let mut rx = events.subscribe();

        let outcome = handler
            .handle(paused(Some(sample_trace()), Some(exception(false))))
            .await;

        assert_eq!(outcome, PatchOutcome::Failed);
        assert_eq!(
            inspector.methods(),
            [methods::RUNTIME_CALL_FUNCTION_ON, methods::DEBUGGER_RESUME]
        );
        assert!(matches!(
            rx.recv().await.unwrap(),
            BridgeEvent::PatchFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_hanging_patch_times_out_and_resumes() {
        let inspector = Arc::new(
            RecordingInspector::new().answer(methods::RUNTIME_CALL_FUNCTION_ON, Answer::Hang),
        );
        let (handler, _) = handler(inspector.clone());

        let outcome = handler
            .handle(paused(Some(sample_trace()), Some(exception(false))))
            .await;

        assert_eq!(outcome, PatchOutcome::Failed);
        assert_eq!(inspector.methods().last().unwrap(), methods::DEBUGGER_RESUME);
    }

    #[tokio::test]
    async fn test_trace_without_exception_object() {
        let inspector = Arc::new(RecordingInspector::new());
        let (handler, _) = handler(inspector.clone());

        let outcome = handler.handle(paused(Some(sample_trace()), None)).await;

        assert_eq!(outcome, PatchOutcome::NoExceptionObject);
        assert_eq!(inspector.methods(), [methods::DEBUGGER_RESUME]);
    }

    #[tokio::test]
    async fn test_thrown_plain_object_is_left_alone() {
        let inspector = Arc::new(RecordingInspector::new());
        let (handler, events) = handler(inspector.clone());
        let mut rx = events.subscribe();
        let thrown = ExceptionData {
            object_type: "object".into(),
            class_name: Some("Object".into()),
            description: Some("Object".into()),
            object_id: Some("{\"injectedScriptId\":1,\"id\":8}".into()),
            ..Default::default()
        };

        let outcome = handler.handle(paused(Some(sample_trace()), Some(thrown))).await;

        assert_eq!(outcome, PatchOutcome::NotAnError);
        assert_eq!(inspector.methods(), [methods::DEBUGGER_RESUME]);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_error_without_string_stack_is_left_alone() {
        let inspector = Arc::new(RecordingInspector::new().answer(
            methods::RUNTIME_CALL_FUNCTION_ON,
            Answer::Returns(json!({ "result": { "type": "boolean", "value": false } })),
        ));
        let (handler, events) = handler(inspector.clone());
        let mut rx = events.subscribe();

        let outcome = handler
            .handle(paused(Some(sample_trace()), Some(exception(false))))
            .await;

        assert_eq!(outcome, PatchOutcome::NotAnError);
        assert_eq!(
            inspector.methods(),
            [methods::RUNTIME_CALL_FUNCTION_ON, methods::DEBUGGER_RESUME]
        );
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        assert!(PATCH_FUNCTION.contains("typeof this.stack !== 'string'"));
    }

    #[tokio::test]
    async fn test_uncaught_report_is_never_styled() {
        let inspector = Arc::new(RecordingInspector::new());
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let handler = PauseHandler::new(
            inspector.clone(),
            Renderer::new().style(Style::Ansi),
            events.clone(),
        );

        handler
            .handle(paused(Some(sample_trace()), Some(exception(true))))
            .await;

        let patched = inspector
            .params_of(methods::RUNTIME_CALL_FUNCTION_ON)
            .unwrap();
        assert_eq!(
            patched["arguments"][0]["value"],
            Renderer::new().style(Style::Ansi).render(&sample_trace())
        );

        assert_eq!(rx.recv().await.unwrap(), BridgeEvent::TracePatched);
        match rx.recv().await.unwrap() {
            BridgeEvent::UncaughtException { trace, .. } => {
                assert_eq!(trace, "\n  setTimeout\n    at foo (/app/a.js:5:3)\n")
            }
            other => panic!("expected UncaughtException, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_uncaught_exception_is_reported() {
        let inspector = Arc::new(RecordingInspector::new());
        let (handler, events) = handler(inspector.clone());
        let mut rx = events.subscribe();

        handler
            .handle(paused(Some(sample_trace()), Some(exception(true))))
            .await;

        assert_eq!(rx.recv().await.unwrap(), BridgeEvent::TracePatched);
        assert_eq!(
            rx.recv().await.unwrap(),
            BridgeEvent::UncaughtException {
                description: "Error: boom".into(),
                trace: "\n  setTimeout\n    at foo (/app/a.js:5:3)\n".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_worker_resumes_every_queued_pause() {
        let inspector = Arc::new(RecordingInspector::new());
        let (handler, _) = handler(inspector.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = handler.spawn(rx);

        let with_trace = serde_json::json!({
            "reason": "exception",
            "data": { "type": "object", "subtype": "error", "objectId": "1", "uncaught": false },
            "asyncStackTrace": { "description": "setTimeout", "callFrames": [] }
        });
        for params in [with_trace, serde_json::json!({ "reason": "other" }), Value::from(17)] {
            tx.send(CDPEvent {
                method: methods::DEBUGGER_PAUSED.into(),
                params: Some(params),
            })
            .unwrap();
        }
        drop(tx);

        assert_eq!(worker.await.unwrap(), 3);
        assert_eq!(
            inspector.methods(),
            [
                methods::RUNTIME_CALL_FUNCTION_ON,
                methods::DEBUGGER_RESUME,
                methods::DEBUGGER_RESUME,
                methods::DEBUGGER_RESUME,
            ]
        );
    }
}
