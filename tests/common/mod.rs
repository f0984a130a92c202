//! Shared test helpers: an in-memory transport and a scripted debugger
//! backend.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex};

use serde_json::Value;

use aliceserver::adapter::dap::DapAdapter;
use aliceserver::adapter::mi::{MiAdapter, MiVersion};
use aliceserver::debugger::{Debugger, Error, Event, Frame, ThreadId};
use aliceserver::session::{Session, TargetConfig};
use aliceserver::transport::{HttpTransport, LineTransport, SharedWriter};

/// Cloneable byte sink capturing everything the server writes.
#[derive(Clone, Default)]
pub struct CaptureBuf(Arc<Mutex<Vec<u8>>>);

impl Write for CaptureBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CaptureBuf {
    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }

    pub fn string(&self) -> String {
        String::from_utf8(self.bytes()).expect("server output is UTF-8")
    }
}

/// Scripted debugger backend. Events queued up front (or pushed from a
/// test) are handed out by `wait`; every lifecycle call is recorded.
pub struct MockDebugger {
    calls: Mutex<Vec<String>>,
    events: Mutex<VecDeque<Event>>,
    cond: Condvar,
    fail_launch: bool,
    fail_attach: bool,
}

impl MockDebugger {
    pub fn new() -> MockDebugger {
        MockDebugger {
            calls: Mutex::new(Vec::new()),
            events: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
            fail_launch: false,
            fail_attach: false,
        }
    }

    pub fn with_events(self, events: impl IntoIterator<Item = Event>) -> MockDebugger {
        self.events.lock().unwrap().extend(events);
        self
    }

    pub fn with_fail_launch(mut self) -> MockDebugger {
        self.fail_launch = true;
        self
    }

    pub fn with_fail_attach(mut self) -> MockDebugger {
        self.fail_attach = true;
        self
    }

    pub fn push_event(&self, event: Event) {
        self.events.lock().unwrap().push_back(event);
        self.cond.notify_one();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

impl Debugger for MockDebugger {
    fn launch(&self, exec: &Path, args: &[String], _cwd: Option<&Path>) -> Result<(), Error> {
        if self.fail_launch {
            return Err(Error::NotFound(exec.to_path_buf()));
        }
        self.record(format!("launch {} [{}]", exec.display(), args.join(" ")));
        Ok(())
    }

    fn attach(&self, pid: i32) -> Result<(), Error> {
        if self.fail_attach {
            return Err(Error::NoSuchProcess(pid));
        }
        self.record(format!("attach {pid}"));
        Ok(())
    }

    fn continue_thread(&self, tid: ThreadId) -> Result<(), Error> {
        self.record(format!("continue {tid}"));
        Ok(())
    }

    fn terminate(&self) -> Result<(), Error> {
        self.record("terminate");
        self.push_event(Event::Terminated);
        Ok(())
    }

    fn detach(&self) -> Result<(), Error> {
        self.record("detach");
        self.push_event(Event::Terminated);
        Ok(())
    }

    fn wait(&self) -> Result<Event, Error> {
        let mut events = self.events.lock().unwrap();
        loop {
            if let Some(event) = events.pop_front() {
                return Ok(event);
            }
            events = self.cond.wait(events).unwrap();
        }
    }

    fn threads(&self) -> Result<Vec<ThreadId>, Error> {
        Ok(vec![1])
    }

    fn frame(&self, tid: ThreadId) -> Result<Frame, Error> {
        Err(Error::NoFrame(tid))
    }
}

/// Run a full MI session over `input`, returning everything written.
pub fn run_mi(input: &str, debugger: Arc<MockDebugger>, target: TargetConfig) -> String {
    let buf = CaptureBuf::default();
    let transport = LineTransport::over(
        Cursor::new(input.as_bytes().to_vec()),
        SharedWriter::new(buf.clone()),
    );
    let adapter = MiAdapter::new(transport, MiVersion::LATEST);
    Session::new(Box::new(adapter), debugger, target)
        .run()
        .expect("session run");
    buf.string()
}

/// Frame one DAP message body.
pub fn frame_msg(body: &Value) -> Vec<u8> {
    let body = serde_json::to_string(body).unwrap();
    format!("Content-Length: {}\r\n\r\n{body}", body.len()).into_bytes()
}

/// Run a full DAP session over raw input bytes, returning the parsed
/// output messages.
pub fn run_dap_raw(
    input: Vec<u8>,
    debugger: Arc<MockDebugger>,
    target: TargetConfig,
) -> Vec<Value> {
    let buf = CaptureBuf::default();
    let transport = HttpTransport::over(Cursor::new(input), SharedWriter::new(buf.clone()));
    let adapter = DapAdapter::new(transport);
    Session::new(Box::new(adapter), debugger, target)
        .run()
        .expect("session run");
    parse_frames(&buf.bytes())
}

/// Run a full DAP session over a sequence of request bodies.
pub fn run_dap(
    requests: &[Value],
    debugger: Arc<MockDebugger>,
    target: TargetConfig,
) -> Vec<Value> {
    let mut input = Vec::new();
    for request in requests {
        input.extend_from_slice(&frame_msg(request));
    }
    run_dap_raw(input, debugger, target)
}

/// Split a captured byte stream into framed DAP messages, checking that
/// every Content-Length matches its body.
pub fn parse_frames(mut bytes: &[u8]) -> Vec<Value> {
    let mut out = Vec::new();
    while !bytes.is_empty() {
        let header_end = bytes
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("frame header delimiter");
        let header = std::str::from_utf8(&bytes[..header_end]).expect("header is UTF-8");
        let len: usize = header
            .strip_prefix("Content-Length:")
            .expect("Content-Length header")
            .trim()
            .parse()
            .expect("numeric Content-Length");
        let body = &bytes[header_end + 4..header_end + 4 + len];
        assert_eq!(body.len(), len, "framed length must match the body");
        out.push(serde_json::from_slice(body).expect("JSON body"));
        bytes = &bytes[header_end + 4 + len..];
    }
    out
}
