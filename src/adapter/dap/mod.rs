//! Debug Adapter Protocol adapter.
//!
//! HTTP-framed JSON messages over the transport. The server keeps its own
//! monotonically increasing `seq` counter shared between replies and
//! events; every response echoes the request's `seq` in `request_seq`.

pub mod proto;

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use crate::debugger::{Event, OutputCategory, StopReason};
use crate::error::Error;
use crate::transport::{self, http, Transport, TransportError};

use super::{Adapter, EventSink, Reply, Request, RequestKind};

use proto::{Capability, DapEvent, DapRequest, DapResponse};

/// Client path reporting style negotiated at initialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathFormat {
    Path,
    Uri,
}

/// Client identity and capabilities recorded at initialize.
struct ClientInfo {
    #[allow(dead_code)]
    path_format: PathFormat,
    capabilities: Vec<Capability>,
}

pub struct DapAdapter {
    transport: Box<dyn Transport>,
    out: Arc<Mutex<DapOut>>,
    initialized: bool,
    client: Option<ClientInfo>,
}

/// Outbound half: sequence numbering plus framed writes, shared with the
/// event sink so numbering stays strictly increasing across both.
struct DapOut {
    writer: transport::SharedWriter,
    seq: i64,
}

impl DapOut {
    fn next_seq(&mut self) -> i64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    fn write<T: serde::Serialize>(&self, message: &T) -> Result<(), Error> {
        let payload = serde_json::to_vec(message)
            .map_err(|e| Error::Fatal(format!("serialize response: {e}")))?;
        http::write_framed(&self.writer, &payload)
            .map_err(|e| Error::Framing(TransportError::Io(e)))
    }

    fn send_response(
        &mut self,
        request_seq: i64,
        command: &str,
        success: bool,
        body: Option<Value>,
    ) -> Result<(), Error> {
        let response = DapResponse {
            seq: self.next_seq(),
            r#type: "response",
            request_seq,
            success,
            command: command.to_string(),
            body,
        };
        self.write(&response)
    }

    fn send_event(&mut self, event: &'static str, body: Option<Value>) -> Result<(), Error> {
        let event = DapEvent {
            seq: self.next_seq(),
            r#type: "event",
            event,
            body,
        };
        self.write(&event)
    }
}

impl DapAdapter {
    pub fn new(transport: impl Transport + 'static) -> DapAdapter {
        let writer = transport.writer();
        DapAdapter {
            transport: Box::new(transport),
            out: Arc::new(Mutex::new(DapOut { writer, seq: 1 })),
            initialized: false,
            client: None,
        }
    }

    /// Adapter name for the CLI surface.
    pub fn name(&self) -> &'static str {
        "dap"
    }

    fn respond_error(&self, request_seq: i64, command: &str, message: String) -> Result<(), Error> {
        log::debug!(target: "dap", "error {request_seq}: {message}");
        self.out.lock().unwrap().send_response(
            request_seq,
            command,
            false,
            Some(json!({ "error": message })),
        )
    }

    fn parse_command(&mut self, msg: &DapRequest) -> Result<RequestKind, Error> {
        match msg.command.as_str() {
            "initialize" => self.parse_initialize(msg),
            "configurationDone" => Ok(RequestKind::ConfigurationDone),
            "launch" => {
                let path = msg
                    .arguments
                    .get("path")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::Schema("launch: missing arguments.path".into()))?;
                let args = msg
                    .arguments
                    .get("args")
                    .and_then(Value::as_array)
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|a| a.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                let cwd = msg
                    .arguments
                    .get("cwd")
                    .and_then(Value::as_str)
                    .map(Into::into);
                Ok(RequestKind::Launch {
                    path: path.into(),
                    args,
                    cwd,
                    run: true,
                })
            }
            "attach" => {
                let pid = msg
                    .arguments
                    .get("pid")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| Error::Schema("attach: missing arguments.pid".into()))?;
                Ok(RequestKind::Attach { pid: pid as i32 })
            }
            "continue" => {
                let thread_id = msg
                    .arguments
                    .get("threadId")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| Error::Schema("continue: missing arguments.threadId".into()))?;
                Ok(RequestKind::Continue {
                    thread_id: Some(thread_id),
                })
            }
            "disconnect" => Ok(RequestKind::Close {
                terminate_debuggee: msg
                    .arguments
                    .get("terminateDebuggee")
                    .and_then(Value::as_bool),
            }),
            other => Ok(RequestKind::Unknown {
                name: other.to_string(),
            }),
        }
    }

    fn parse_initialize(&mut self, msg: &DapRequest) -> Result<RequestKind, Error> {
        if self.initialized {
            return Err(Error::StateViolation("initialize received twice".into()));
        }

        let arguments = &msg.arguments;
        let path_format = match arguments.get("pathFormat").and_then(Value::as_str) {
            None | Some("path") => PathFormat::Path,
            Some("uri") => PathFormat::Uri,
            Some(other) => {
                return Err(Error::Schema(format!("unsupported pathFormat: {other:?}")));
            }
        };

        let client_id = arguments.get("clientID").and_then(Value::as_str);
        let client_name = arguments.get("clientName").and_then(Value::as_str);
        let adapter_id = arguments
            .get("adapterID")
            .or_else(|| arguments.get("adapterId"))
            .and_then(Value::as_str);
        let locale = arguments.get("locale").and_then(Value::as_str);
        log::info!(
            target: "dap",
            "client: id={} name={} adapter={} locale={}",
            client_id.unwrap_or("?"),
            client_name.unwrap_or("?"),
            adapter_id.unwrap_or("?"),
            locale.unwrap_or("?"),
        );

        let capabilities = proto::client_capabilities(arguments);
        for capability in capabilities.iter().filter(|c| c.supported) {
            log::info!(target: "dap", "client capability: {}", capability.pretty);
        }

        self.initialized = true;
        self.client = Some(ClientInfo {
            path_format,
            capabilities,
        });
        Ok(RequestKind::Initialize)
    }
}

/// Initialize reply body: the supported server capabilities, each `true`.
fn capabilities_body() -> Value {
    let mut body = serde_json::Map::new();
    for capability in proto::server_capabilities() {
        if capability.supported {
            body.insert(capability.name.to_string(), Value::Bool(true));
        }
    }
    Value::Object(body)
}

impl Adapter for DapAdapter {
    fn connected(&mut self) -> Result<(), Error> {
        log::info!(target: "dap", "session open");
        Ok(())
    }

    fn next_request(&mut self) -> Result<Request, Error> {
        loop {
            let body = match http::read_message(self.transport.as_mut()) {
                Ok(body) => body,
                Err(TransportError::Closed) => {
                    return Err(Error::Framing(TransportError::Closed));
                }
                Err(e) => {
                    // no request to correlate with, answer at the envelope level
                    self.respond_error(0, "", format!("framing: {e}"))?;
                    continue;
                }
            };

            let msg: DapRequest = match serde_json::from_slice(&body) {
                Ok(msg) => msg,
                Err(e) => {
                    self.respond_error(0, "", format!("malformed request: {e}"))?;
                    continue;
                }
            };
            if msg.r#type != "request" {
                log::debug!(target: "dap", "ignoring message of type {:?}", msg.r#type);
                continue;
            }
            log::debug!(target: "dap", "{}: {}", msg.seq, msg.command);

            if !self.initialized && msg.command != "initialize" {
                self.respond_error(
                    msg.seq,
                    &msg.command,
                    format!("'{}' received before initialize", msg.command),
                )?;
                continue;
            }

            match self.parse_command(&msg) {
                Ok(kind) => {
                    return Ok(Request {
                        id: Some(msg.seq),
                        command: msg.command,
                        kind,
                    });
                }
                Err(Error::Schema(reason)) => {
                    self.respond_error(msg.seq, &msg.command, reason)?;
                    continue;
                }
                Err(Error::StateViolation(reason)) => {
                    self.respond_error(msg.seq, &msg.command, reason)?;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn reply(&mut self, request: &Request, reply: Reply) -> Result<(), Error> {
        let request_seq = request.id.unwrap_or(0);
        match reply {
            Reply::Success(_) => {
                let body = match request.kind {
                    RequestKind::Initialize => {
                        if let Some(client) = &self.client {
                            log::debug!(
                                target: "dap",
                                "negotiated {} client capability flags",
                                client.capabilities.len(),
                            );
                        }
                        Some(capabilities_body())
                    }
                    _ => None,
                };
                self.out
                    .lock()
                    .unwrap()
                    .send_response(request_seq, &request.command, true, body)
            }
            Reply::Error { message } => {
                self.respond_error(request_seq, &request.command, message)
            }
        }
    }

    fn event_sink(&self) -> Box<dyn EventSink> {
        Box::new(DapEventSink {
            out: self.out.clone(),
        })
    }
}

struct DapEventSink {
    out: Arc<Mutex<DapOut>>,
}

impl EventSink for DapEventSink {
    fn event(&self, event: Event) -> Result<(), Error> {
        let Some((name, body)) = format_event(&event) else {
            return Ok(());
        };
        self.out.lock().unwrap().send_event(name, body)
    }
}

fn stop_reason_name(reason: StopReason) -> &'static str {
    match reason {
        StopReason::Step => "step",
        StopReason::Breakpoint => "breakpoint",
        StopReason::Exception => "exception",
        StopReason::Pause => "pause",
        StopReason::Entry => "entry",
        StopReason::Goto => "goto",
        StopReason::FunctionBreakpoint => "function breakpoint",
        StopReason::DataBreakpoint => "data breakpoint",
        StopReason::InstructionBreakpoint => "instruction breakpoint",
    }
}

fn output_category_name(category: OutputCategory) -> &'static str {
    match category {
        OutputCategory::Console => "console",
        OutputCategory::Important => "important",
        OutputCategory::Stdout => "stdout",
        OutputCategory::Stderr => "stderr",
        OutputCategory::Telemetry => "telemetry",
    }
}

/// Translate a debugger event into its DAP event name and body.
pub(crate) fn format_event(event: &Event) -> Option<(&'static str, Option<Value>)> {
    match event {
        Event::Stopped {
            thread_id,
            reason,
            description,
            ..
        } => {
            let mut body = json!({
                "reason": stop_reason_name(*reason),
                "threadId": thread_id,
            });
            if let Some(description) = description {
                body["description"] = json!(description);
            }
            Some(("stopped", Some(body)))
        }
        Event::Continued { thread_id } => {
            Some(("continued", Some(json!({ "threadId": thread_id }))))
        }
        Event::Exited { exit_code } => Some(("exited", Some(json!({ "exitCode": exit_code })))),
        Event::Output { category, output } => Some((
            "output",
            Some(json!({
                "category": output_category_name(*category),
                "output": output,
            })),
        )),
        Event::Breakpoint { reason, breakpoint } => Some((
            "breakpoint",
            Some(json!({ "reason": reason, "breakpoint": breakpoint })),
        )),
        Event::Module { reason, module } => Some((
            "module",
            Some(json!({ "reason": reason, "module": module })),
        )),
        Event::Thread { reason, thread_id } => Some((
            "thread",
            Some(json!({ "reason": reason, "threadId": thread_id })),
        )),
        Event::Process { body } => Some(("process", Some(body.clone()))),
        Event::Memory { body } => Some(("memory", Some(body.clone()))),
        Event::LoadedSource { reason, source } => Some((
            "loadedSource",
            Some(json!({ "reason": reason, "source": source })),
        )),
        Event::Initialized => Some(("initialized", None)),
        Event::Capabilities { capabilities } => Some((
            "capabilities",
            Some(json!({ "capabilities": capabilities })),
        )),
        Event::Invalidated { areas } => {
            Some(("invalidated", Some(json!({ "areas": areas }))))
        }
        Event::ProgressStart { progress_id, title } => Some((
            "progressStart",
            Some(json!({ "progressId": progress_id, "title": title })),
        )),
        Event::ProgressUpdate {
            progress_id,
            message,
        } => {
            let mut body = json!({ "progressId": progress_id });
            if let Some(message) = message {
                body["message"] = json!(message);
            }
            Some(("progressUpdate", Some(body)))
        }
        Event::ProgressEnd { progress_id } => Some((
            "progressEnd",
            Some(json!({ "progressId": progress_id })),
        )),
        Event::Terminated => Some(("terminated", None)),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_capabilities_body_lists_only_supported() {
        let body = capabilities_body();
        let map = body.as_object().unwrap();
        assert!(map.values().all(|v| v == &Value::Bool(true)));
        assert!(map.contains_key("supportsConfigurationDoneRequest"));
        assert!(map.contains_key("supportsTerminateRequest"));
        assert!(map.contains_key("supportTerminateDebuggee"));
        assert!(!map.contains_key("supportsFunctionBreakpoints"));
    }

    #[test]
    fn test_stopped_event_body() {
        let (name, body) = format_event(&Event::Stopped {
            thread_id: 9,
            reason: StopReason::DataBreakpoint,
            exception: None,
            description: Some("watch hit".into()),
            frame: None,
        })
        .unwrap();
        assert_eq!(name, "stopped");
        assert_eq!(
            body.unwrap(),
            json!({"reason": "data breakpoint", "threadId": 9, "description": "watch hit"})
        );
    }

    #[test]
    fn test_exited_event_body() {
        let (name, body) = format_event(&Event::Exited { exit_code: 3 }).unwrap();
        assert_eq!(name, "exited");
        assert_eq!(body.unwrap(), json!({"exitCode": 3}));
    }
}
