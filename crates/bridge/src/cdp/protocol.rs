//! CDP Protocol Types
//!
//! These are the fundamental types for CDP communication.
//! Only what the pause/patch workflow consumes is modelled; everything else
//! stays `Value`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use trace::AsyncTrace;

/// Request ID - monotonically increasing
pub type RequestId = u64;

/// Remote object handle from the runtime
pub type RemoteObjectId = String;

/// Method names used by the bridge
pub mod methods {
    pub const RUNTIME_ENABLE: &str = "Runtime.enable";
    pub const RUNTIME_SET_ASYNC_CALL_STACK_DEPTH: &str = "Runtime.setAsyncCallStackDepth";
    pub const RUNTIME_RUN_IF_WAITING_FOR_DEBUGGER: &str = "Runtime.runIfWaitingForDebugger";
    pub const RUNTIME_CALL_FUNCTION_ON: &str = "Runtime.callFunctionOn";
    pub const DEBUGGER_ENABLE: &str = "Debugger.enable";
    pub const DEBUGGER_SET_BLACKBOX_PATTERNS: &str = "Debugger.setBlackboxPatterns";
    pub const DEBUGGER_SET_PAUSE_ON_EXCEPTIONS: &str = "Debugger.setPauseOnExceptions";
    pub const DEBUGGER_RESUME: &str = "Debugger.resume";

    pub const DEBUGGER_PAUSED: &str = "Debugger.paused";
    pub const DEBUGGER_SCRIPT_PARSED: &str = "Debugger.scriptParsed";
    pub const RUNTIME_EXCEPTION_THROWN: &str = "Runtime.exceptionThrown";
    pub const RUNTIME_EXECUTION_CONTEXT_DESTROYED: &str = "Runtime.executionContextDestroyed";
}

/// CDP Request sent to the runtime
#[derive(Debug, Clone, Serialize)]
pub struct CDPRequest {
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// CDP Response from the runtime
#[derive(Debug, Clone, Deserialize)]
pub struct CDPResponse {
    pub id: RequestId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<CDPError>,
}

/// CDP Error
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CDPError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// CDP Event from the runtime (no request ID)
#[derive(Debug, Clone, Deserialize)]
pub struct CDPEvent {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

impl CDPEvent {
    /// Decode `params` into a typed payload
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.params.clone().unwrap_or(Value::Null))
    }
}

/// Unified CDP Message (response or event)
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CDPMessage {
    Response(CDPResponse),
    Event(CDPEvent),
}

/// `Debugger.setPauseOnExceptions` state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseOnExceptions {
    #[default]
    All,
    Uncaught,
    None,
}

impl PauseOnExceptions {
    pub fn as_str(self) -> &'static str {
        match self {
            PauseOnExceptions::All => "all",
            PauseOnExceptions::Uncaught => "uncaught",
            PauseOnExceptions::None => "none",
        }
    }
}

/// Exception value attached to a pause (`Debugger.paused` `data`).
///
/// The runtime sends a `Runtime.RemoteObject` with an extra `uncaught` flag.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionData {
    #[serde(rename = "type", default)]
    pub object_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub object_id: Option<RemoteObjectId>,
    #[serde(default)]
    pub uncaught: bool,
}

/// `Debugger.paused` parameters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedParams {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub data: Option<ExceptionData>,
    #[serde(default)]
    pub async_stack_trace: Option<AsyncTrace>,
}

/// `Runtime.exceptionThrown` parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionThrownParams {
    pub exception_details: ExceptionDetails,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub line_number: u32,
    #[serde(default)]
    pub column_number: u32,
    #[serde(default)]
    pub exception: Option<ExceptionData>,
}

impl ExceptionDetails {
    /// Best human-readable summary: the exception's description, else the text
    pub fn summary(&self) -> &str {
        self.exception
            .as_ref()
            .and_then(|e| e.description.as_deref())
            .unwrap_or(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_discrimination() {
        let response: CDPMessage =
            serde_json::from_value(json!({ "id": 3, "result": {} })).unwrap();
        assert!(matches!(response, CDPMessage::Response(CDPResponse { id: 3, .. })));

        let error: CDPMessage = serde_json::from_value(json!({
            "id": 4,
            "error": { "code": -32601, "message": "not found" }
        }))
        .unwrap();
        match error {
            CDPMessage::Response(r) => assert_eq!(r.error.unwrap().code, -32601),
            other => panic!("expected response, got {other:?}"),
        }

        let event: CDPMessage = serde_json::from_value(json!({
            "method": "Debugger.resumed",
            "params": {}
        }))
        .unwrap();
        assert!(matches!(event, CDPMessage::Event(e) if e.method == "Debugger.resumed"));
    }

    #[test]
    fn test_paused_params_decode() {
        let event = CDPEvent {
            method: methods::DEBUGGER_PAUSED.to_string(),
            params: Some(json!({
                "reason": "exception",
                "callFrames": [],
                "data": {
                    "type": "object",
                    "subtype": "error",
                    "className": "Error",
                    "description": "Error: boom\n    at foo (/app/a.js:5:3)",
                    "objectId": "{\"injectedScriptId\":1,\"id\":7}",
                    "uncaught": true
                },
                "asyncStackTrace": {
                    "description": "setTimeout",
                    "callFrames": [{
                        "functionName": "main",
                        "scriptId": "61",
                        "url": "file:///app/a.js",
                        "lineNumber": 9,
                        "columnNumber": 0
                    }]
                }
            })),
        };

        let params: PausedParams = event.decode().unwrap();
        let data = params.data.unwrap();
        assert_eq!(params.reason, "exception");
        assert!(data.uncaught);
        assert_eq!(data.object_id.as_deref(), Some("{\"injectedScriptId\":1,\"id\":7}"));
        assert_eq!(params.async_stack_trace.unwrap().header(), "setTimeout");
    }

    #[test]
    fn test_exception_thrown_summary() {
        let params: ExceptionThrownParams = serde_json::from_value(json!({
            "timestamp": 1.0,
            "exceptionDetails": {
                "exceptionId": 1,
                "text": "Uncaught",
                "lineNumber": 0,
                "columnNumber": 0,
                "exception": { "type": "object", "description": "TypeError: x is not a function" }
            }
        }))
        .unwrap();
        assert_eq!(
            params.exception_details.summary(),
            "TypeError: x is not a function"
        );
    }

    #[test]
    fn test_pause_on_exceptions_wire_names() {
        assert_eq!(json!(PauseOnExceptions::Uncaught), json!("uncaught"));
        assert_eq!(PauseOnExceptions::default().as_str(), "all");
    }
}
