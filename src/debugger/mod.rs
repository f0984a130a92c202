//! Debugger abstraction: a uniform capability interface over a native
//! debugging backend, plus the normalized event model delivered to the
//! protocol adapters.

mod error;
pub mod host;

pub use error::Error;
pub use host::HostDebugger;

use std::path::Path;

use serde_json::Value;

/// Identifier of a debuggee thread (OS thread id).
pub type ThreadId = i64;

/// CPU architecture of a reported frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    I386,
    X86_64,
    AArch32,
    AArch64,
}

impl Architecture {
    /// Architecture of the machine the server runs on.
    pub fn host() -> Architecture {
        if cfg!(target_arch = "x86") {
            Architecture::I386
        } else if cfg!(target_arch = "arm") {
            Architecture::AArch32
        } else if cfg!(target_arch = "aarch64") {
            Architecture::AArch64
        } else {
            Architecture::X86_64
        }
    }
}

/// Top stack frame snapshot delivered with a stop.
#[derive(Debug, Clone)]
pub struct Frame {
    pub address: u64,
    pub function_name: Option<String>,
    /// Formal arguments in declaration order, name/value pairs.
    pub arguments: Vec<(String, String)>,
    pub architecture: Architecture,
}

impl Frame {
    /// Placeholder used when the backend cannot produce frame information.
    pub fn unknown() -> Frame {
        Frame {
            address: 0,
            function_name: None,
            arguments: Vec::new(),
            architecture: Architecture::host(),
        }
    }
}

/// Why the debuggee stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Step,
    Breakpoint,
    Exception,
    Pause,
    Entry,
    Goto,
    FunctionBreakpoint,
    DataBreakpoint,
    InstructionBreakpoint,
}

/// Fault class carried with exception stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    Segfault,
    IllegalInstruction,
    Arithmetic,
    Abort,
    Trap,
    Other,
}

/// Output stream classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCategory {
    Console,
    Important,
    Stdout,
    Stderr,
    Telemetry,
}

/// Normalized debugger event delivered through [`Debugger::wait`].
#[derive(Debug, Clone)]
pub enum Event {
    Stopped {
        thread_id: ThreadId,
        reason: StopReason,
        exception: Option<ExceptionKind>,
        description: Option<String>,
        frame: Option<Frame>,
    },
    Continued {
        thread_id: ThreadId,
    },
    Exited {
        exit_code: i32,
    },
    Output {
        category: OutputCategory,
        output: String,
    },
    Breakpoint {
        reason: &'static str,
        breakpoint: Value,
    },
    Module {
        reason: &'static str,
        module: Value,
    },
    Thread {
        reason: &'static str,
        thread_id: ThreadId,
    },
    Process {
        body: Value,
    },
    Memory {
        body: Value,
    },
    LoadedSource {
        reason: &'static str,
        source: Value,
    },
    Initialized,
    Capabilities {
        capabilities: Value,
    },
    Invalidated {
        areas: Vec<String>,
    },
    ProgressStart {
        progress_id: String,
        title: String,
    },
    ProgressUpdate {
        progress_id: String,
        message: Option<String>,
    },
    ProgressEnd {
        progress_id: String,
    },
    /// The backend released the debuggee (detach/terminate); the event
    /// stream ends here.
    Terminated,
}

/// Capability interface implemented by debugger backends.
///
/// Lifecycle operations are issued from the request thread while [`wait`]
/// blocks on the event thread; implementations keep their state behind
/// interior locks.
///
/// [`wait`]: Debugger::wait
pub trait Debugger: Send + Sync {
    /// Spawn a debuggee under control of the backend, leaving it stopped
    /// at its entry point.
    fn launch(&self, exec: &Path, args: &[String], cwd: Option<&Path>) -> Result<(), Error>;

    /// Take control of an already running process.
    fn attach(&self, pid: i32) -> Result<(), Error>;

    /// Resume one stopped thread.
    fn continue_thread(&self, tid: ThreadId) -> Result<(), Error>;

    /// Kill the debuggee; the process handle is cleared on success.
    fn terminate(&self) -> Result<(), Error>;

    /// Release the debuggee and let it run free; the process handle is
    /// cleared on success.
    fn detach(&self) -> Result<(), Error>;

    /// Block until the next debuggee event.
    fn wait(&self) -> Result<Event, Error>;

    /// Ids of all debuggee threads.
    fn threads(&self) -> Result<Vec<ThreadId>, Error>;

    /// Frame 0 of the given thread. Callers tolerate [`Error::NoFrame`]
    /// and fill defaults.
    fn frame(&self, tid: ThreadId) -> Result<Frame, Error>;
}
