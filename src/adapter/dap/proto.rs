//! DAP wire envelopes and the capability tables negotiated at initialize.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// DAP request envelope.
#[derive(Debug, Deserialize)]
pub struct DapRequest {
    #[serde(default)]
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

/// DAP response envelope.
///
/// The body stays a `serde_json::Value`: the DAP specification allows
/// responses with no `body` field at all, and a `Value` keeps the envelope
/// stable across every command.
#[derive(Debug, Serialize)]
pub struct DapResponse {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// DAP event envelope.
#[derive(Debug, Serialize)]
pub struct DapEvent {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// One negotiated capability flag.
#[derive(Debug, Clone)]
pub struct Capability {
    pub name: &'static str,
    pub pretty: &'static str,
    pub supported: bool,
}

/// Server capabilities in publication order. The initialize reply body
/// carries exactly the supported entries, each mapped to `true`.
pub fn server_capabilities() -> Vec<Capability> {
    fn cap(name: &'static str, pretty: &'static str, supported: bool) -> Capability {
        Capability {
            name,
            pretty,
            supported,
        }
    }

    vec![
        cap(
            "supportsConfigurationDoneRequest",
            "configurationDone request",
            true,
        ),
        cap("supportsFunctionBreakpoints", "function breakpoints", false),
        cap(
            "supportsConditionalBreakpoints",
            "conditional breakpoints",
            false,
        ),
        cap("supportsLogPoints", "log points", false),
        cap("supportsEvaluateForHovers", "evaluate for hovers", false),
        cap("supportsSetVariable", "setVariable request", false),
        cap("supportsTerminateRequest", "terminate request", true),
        cap("supportTerminateDebuggee", "terminate debuggee on disconnect", true),
        cap("supportSuspendDebuggee", "suspend debuggee on disconnect", false),
        cap("supportsDataBreakpoints", "data breakpoints", false),
        cap(
            "supportsInstructionBreakpoints",
            "instruction breakpoints",
            false,
        ),
    ]
}

/// Client capabilities in negotiation order, with `supported` filled from
/// the initialize arguments.
pub fn client_capabilities(arguments: &Value) -> Vec<Capability> {
    fn cap(name: &'static str, pretty: &'static str, arguments: &Value) -> Capability {
        Capability {
            name,
            pretty,
            supported: arguments.get(name).and_then(Value::as_bool).unwrap_or(false),
        }
    }

    vec![
        cap("supportsVariableType", "variable type", arguments),
        cap("supportsVariablePaging", "variable paging", arguments),
        cap(
            "supportsRunInTerminalRequest",
            "runInTerminal request",
            arguments,
        ),
        cap("supportsMemoryReferences", "memory references", arguments),
        cap("supportsProgressReporting", "progress reporting", arguments),
        cap("supportsInvalidatedEvent", "invalidated event", arguments),
        cap("supportsMemoryEvent", "memory event", arguments),
        cap(
            "supportsArgsCanBeInterpretedByShell",
            "shell-interpreted arguments",
            arguments,
        ),
        cap(
            "supportsStartDebuggingRequest",
            "startDebugging request",
            arguments,
        ),
    ]
}
