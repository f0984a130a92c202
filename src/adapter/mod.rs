//! Protocol adapters: the request/reply model shared by the DAP and MI
//! faces, and the capability traits the session engine drives.

pub mod dap;
pub mod mi;

use std::path::PathBuf;

use crate::debugger::{Event, ThreadId};
use crate::error::Error;

/// One client request, normalized to protocol-independent form.
#[derive(Debug, Clone)]
pub struct Request {
    /// Correlation id when the client supplied one (MI token, DAP `seq`).
    pub id: Option<i64>,
    /// Command name as spelled by the client.
    pub command: String,
    pub kind: RequestKind,
}

#[derive(Debug, Clone)]
pub enum RequestKind {
    Initialize,
    Launch {
        path: PathBuf,
        args: Vec<String>,
        cwd: Option<PathBuf>,
        /// Begin execution right after a successful launch.
        run: bool,
    },
    Attach {
        pid: i32,
    },
    /// Launch from the stored target configuration and begin execution.
    Run,
    Continue {
        /// Absent when the protocol has no thread argument; the engine
        /// resolves the current thread.
        thread_id: Option<ThreadId>,
    },
    Detach,
    Terminate,
    Close {
        /// Explicit client choice; `None` applies the state-based policy
        /// (terminate a launched debuggee, detach from an attached one).
        terminate_debuggee: Option<bool>,
    },
    CwdSet {
        path: PathBuf,
    },
    ConfigurationDone,
    SetArgs {
        args: Vec<String>,
    },
    SetTarget {
        path: PathBuf,
    },
    ListFeatures,
    Show {
        topic: Option<String>,
    },
    InfoGdbMiCommand {
        name: String,
    },
    Unknown {
        name: String,
    },
}

/// Reply to one request.
#[derive(Debug, Clone)]
pub enum Reply {
    Success(Option<ReplyBody>),
    Error { message: String },
}

/// Structured payload attached to a successful reply.
#[derive(Debug, Clone)]
pub enum ReplyBody {
    Features(Vec<&'static str>),
    Version(String),
}

/// A protocol adapter: one client protocol normalized to the debugger
/// abstraction. The session engine drives `next_request`; the event thread
/// writes through the sink returned by `event_sink`.
pub trait Adapter {
    /// Greet the client once the transport is bound.
    fn connected(&mut self) -> Result<(), Error>;

    /// Block until the next client request. Malformed input that can be
    /// answered in place (framing and schema violations) is replied to
    /// internally and never surfaces here.
    fn next_request(&mut self) -> Result<Request, Error>;

    /// Send the reply for `request`.
    fn reply(&mut self, request: &Request, reply: Reply) -> Result<(), Error>;

    /// Handle for asynchronous event delivery.
    fn event_sink(&self) -> Box<dyn EventSink>;
}

/// Write half of an adapter: translates debugger events to wire messages.
/// Each message is written atomically.
pub trait EventSink: Send {
    fn event(&self, event: Event) -> Result<(), Error>;
}
