//! Session engine: owns the adapter and the debugger handle, drives the
//! request loop, and bridges debugger events to the adapter on a
//! background thread.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::adapter::{Adapter, EventSink, Reply, ReplyBody, Request, RequestKind};
use crate::debugger::{self, Debugger, Event, OutputCategory, ThreadId};
use crate::error::Error;
use crate::transport::TransportError;
use crate::version;
use crate::weak_error;

/// Features reported by `list-features`.
const FEATURES: &[&str] = &[];

/// Debuggee lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Launched,
    Attached,
    Running,
    Stopped,
    Closed,
}

/// How the current debuggee came under control; decides whether close
/// means terminate or detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Launched,
    Attached,
}

#[derive(Debug)]
struct Lifecycle {
    state: State,
    origin: Option<Origin>,
}

/// Target configuration: what to run and how. Mutated by request handlers
/// only, read on launch.
#[derive(Debug, Clone, Default)]
pub struct TargetConfig {
    pub path: Option<PathBuf>,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

pub struct Session {
    adapter: Box<dyn Adapter>,
    debugger: Arc<dyn Debugger>,
    target: TargetConfig,
    lifecycle: Arc<Mutex<Lifecycle>>,
    event_thread: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(
        adapter: Box<dyn Adapter>,
        debugger: Arc<dyn Debugger>,
        target: TargetConfig,
    ) -> Session {
        Session {
            adapter,
            debugger,
            target,
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                state: State::Idle,
                origin: None,
            })),
            event_thread: None,
        }
    }

    /// Run the session until the client closes it or the transport ends.
    pub fn run(mut self) -> Result<(), Error> {
        self.adapter.connected()?;
        loop {
            let request = match self.adapter.next_request() {
                Ok(request) => request,
                Err(Error::Framing(TransportError::Closed)) => {
                    log::info!(target: "session", "client closed the connection");
                    break;
                }
                Err(e) => {
                    log::error!(target: "session", "request loop: {e:#}");
                    if e.is_fatal() {
                        self.teardown();
                        return Err(e);
                    }
                    break;
                }
            };
            log::debug!(target: "session", "request: {:?}", request.kind);

            match self.handle(&request) {
                Ok(false) => {}
                Ok(true) => break,
                Err(e) => {
                    // the reply path failed; without a usable transport the
                    // session is over
                    log::error!(target: "session", "reply: {e:#}");
                    break;
                }
            }
        }
        self.teardown();
        Ok(())
    }

    pub fn state(&self) -> State {
        self.lifecycle.lock().unwrap().state
    }

    /// Dispatch one request and send its reply. Returns true when the
    /// session is closed.
    fn handle(&mut self, request: &Request) -> Result<bool, Error> {
        match &request.kind {
            RequestKind::Initialize | RequestKind::ConfigurationDone => {
                self.reply_ok(request, None)?;
            }
            RequestKind::SetTarget { path } => {
                self.target.path = Some(path.clone());
                self.reply_ok(request, None)?;
            }
            RequestKind::SetArgs { args } => {
                self.target.args = args.clone();
                self.reply_ok(request, None)?;
            }
            RequestKind::CwdSet { path } => {
                self.target.cwd = Some(path.clone());
                self.reply_ok(request, None)?;
            }
            RequestKind::ListFeatures => {
                self.reply_ok(request, Some(ReplyBody::Features(FEATURES.to_vec())))?;
            }
            RequestKind::Show { topic } => {
                let body = topic
                    .as_deref()
                    .filter(|t| t.eq_ignore_ascii_case("version"))
                    .map(|_| ReplyBody::Version(version::line()));
                self.reply_ok(request, body)?;
            }
            RequestKind::InfoGdbMiCommand { .. } => {
                // existence is adapter knowledge, filled in by the reply
                self.reply_ok(request, None)?;
            }
            RequestKind::Launch {
                path,
                args,
                cwd,
                run,
            } => {
                self.target.path = Some(path.clone());
                if !args.is_empty() {
                    self.target.args = args.clone();
                }
                if let Some(cwd) = cwd {
                    self.target.cwd = Some(cwd.clone());
                }
                match self.do_launch() {
                    Ok(()) => {
                        self.reply_ok(request, None)?;
                        if *run {
                            self.do_run();
                        }
                    }
                    Err(e) => self.reply_err(request, e)?,
                }
            }
            RequestKind::Run => match self.do_launch() {
                Ok(()) => {
                    self.reply_ok(request, None)?;
                    self.do_run();
                }
                Err(e) => self.reply_err(request, e)?,
            },
            RequestKind::Attach { pid } => match self.do_attach(*pid) {
                Ok(()) => {
                    self.reply_ok(request, None)?;
                    self.spawn_event_thread();
                }
                Err(e) => self.reply_err(request, e)?,
            },
            RequestKind::Continue { thread_id } => match self.do_continue(*thread_id) {
                Ok(()) => self.reply_ok(request, None)?,
                Err(e) => self.reply_err(request, e)?,
            },
            RequestKind::Detach => match self.do_detach() {
                Ok(()) => self.reply_ok(request, None)?,
                Err(e) => self.reply_err(request, e)?,
            },
            RequestKind::Terminate => match self.do_terminate() {
                Ok(()) => self.reply_ok(request, None)?,
                Err(e) => self.reply_err(request, e)?,
            },
            RequestKind::Close { terminate_debuggee } => {
                match self.do_close(*terminate_debuggee) {
                    Ok(()) => self.reply_ok(request, None)?,
                    Err(e) => self.reply_err(request, e)?,
                }
                self.lifecycle.lock().unwrap().state = State::Closed;
                return Ok(true);
            }
            RequestKind::Unknown { name } => {
                self.reply_err(request, Error::UnknownCommand(name.clone()))?;
            }
        }
        Ok(false)
    }

    fn reply_ok(&mut self, request: &Request, body: Option<ReplyBody>) -> Result<(), Error> {
        self.adapter.reply(request, Reply::Success(body))
    }

    fn reply_err(&mut self, request: &Request, error: Error) -> Result<(), Error> {
        log::warn!(target: "session", "{}: {error:#}", request.command);
        self.adapter.reply(
            request,
            Reply::Error {
                message: error.to_string(),
            },
        )
    }

    fn do_launch(&mut self) -> Result<(), Error> {
        if self.state() != State::Idle {
            return Err(Error::StateViolation("debuggee already active".into()));
        }
        let path = self
            .target
            .path
            .clone()
            .ok_or_else(|| Error::Schema("no executable file specified".into()))?;
        self.debugger
            .launch(&path, &self.target.args, self.target.cwd.as_deref())?;
        let mut lifecycle = self.lifecycle.lock().unwrap();
        lifecycle.state = State::Launched;
        lifecycle.origin = Some(Origin::Launched);
        Ok(())
    }

    /// Begin execution of a freshly launched debuggee.
    fn do_run(&mut self) {
        self.spawn_event_thread();
        if let Err(e) = self.do_continue(None) {
            log::warn!(target: "session", "begin execution: {e:#}");
        }
    }

    fn do_attach(&mut self, pid: i32) -> Result<(), Error> {
        if self.state() != State::Idle {
            return Err(Error::StateViolation("debuggee already active".into()));
        }
        self.debugger.attach(pid)?;
        let mut lifecycle = self.lifecycle.lock().unwrap();
        lifecycle.state = State::Attached;
        lifecycle.origin = Some(Origin::Attached);
        Ok(())
    }

    fn do_continue(&mut self, thread_id: Option<ThreadId>) -> Result<(), Error> {
        let previous = self.state();
        match previous {
            State::Idle | State::Closed => {
                return Err(Error::StateViolation("no active debuggee".into()));
            }
            State::Running => {
                return Err(Error::StateViolation("debuggee already running".into()));
            }
            State::Launched | State::Attached | State::Stopped => {}
        }
        let tid = match thread_id {
            Some(tid) => tid,
            None => self
                .debugger
                .threads()
                .ok()
                .and_then(|threads| threads.first().copied())
                .unwrap_or(0),
        };
        // set before resuming so a prompt stop event cannot be overwritten
        self.lifecycle.lock().unwrap().state = State::Running;
        if let Err(e) = self.debugger.continue_thread(tid) {
            self.lifecycle.lock().unwrap().state = previous;
            return Err(e.into());
        }
        Ok(())
    }

    fn do_detach(&mut self) -> Result<(), Error> {
        if matches!(self.state(), State::Idle | State::Closed) {
            return Err(Error::StateViolation("no active debuggee".into()));
        }
        self.debugger.detach()?;
        let mut lifecycle = self.lifecycle.lock().unwrap();
        lifecycle.state = State::Idle;
        lifecycle.origin = None;
        Ok(())
    }

    fn do_terminate(&mut self) -> Result<(), Error> {
        if matches!(self.state(), State::Idle | State::Closed) {
            return Err(Error::StateViolation("no active debuggee".into()));
        }
        self.debugger.terminate()?;
        let mut lifecycle = self.lifecycle.lock().unwrap();
        lifecycle.state = State::Idle;
        lifecycle.origin = None;
        Ok(())
    }

    /// Close routing: a launched debuggee is always terminated (the server
    /// spawned it, so it must not outlive the session); an attached one is
    /// detached unless the client explicitly asked for termination. No
    /// debuggee, no op.
    fn do_close(&mut self, terminate_debuggee: Option<bool>) -> Result<(), Error> {
        let origin = self.lifecycle.lock().unwrap().origin;
        match origin {
            None => Ok(()),
            Some(Origin::Launched) => self.do_terminate(),
            Some(Origin::Attached) => {
                if terminate_debuggee == Some(true) {
                    self.do_terminate()
                } else {
                    self.do_detach()
                }
            }
        }
    }

    fn spawn_event_thread(&mut self) {
        if self
            .event_thread
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
        {
            return;
        }
        if let Some(finished) = self.event_thread.take() {
            let _ = finished.join();
        }

        let sink = self.adapter.event_sink();
        let debugger = self.debugger.clone();
        let lifecycle = self.lifecycle.clone();
        let handle = thread::Builder::new()
            .name("events".into())
            .spawn(move || event_loop(debugger, sink, lifecycle))
            .expect("spawn event thread");
        self.event_thread = Some(handle);
    }

    fn teardown(&mut self) {
        // client gone without a close request: apply the close policy so
        // the debuggee does not outlive the session
        let origin = self.lifecycle.lock().unwrap().origin;
        if origin.is_some() {
            weak_error!(self.do_close(None), "close on teardown");
        }

        if let Some(handle) = self.event_thread.take() {
            for _ in 0..50 {
                if handle.is_finished() {
                    break;
                }
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                log::warn!(target: "session", "event thread still blocked, abandoning");
            }
        }
    }
}

/// Deliver debugger events to the client until the debuggee exits or the
/// backend lets go of it.
fn event_loop(
    debugger: Arc<dyn Debugger>,
    sink: Box<dyn EventSink>,
    lifecycle: Arc<Mutex<Lifecycle>>,
) {
    loop {
        let event = match debugger.wait() {
            Ok(event) => event,
            Err(debugger::Error::NotActive) => break,
            Err(e) => {
                let _ = sink.event(Event::Output {
                    category: OutputCategory::Important,
                    output: format!("debugger error: {e}\n"),
                });
                break;
            }
        };
        let event = fill_frame(debugger.as_ref(), event);

        match &event {
            Event::Stopped { .. } => {
                lifecycle.lock().unwrap().state = State::Stopped;
            }
            Event::Exited { .. } => {
                let mut lifecycle = lifecycle.lock().unwrap();
                lifecycle.state = State::Idle;
                lifecycle.origin = None;
            }
            _ => {}
        }

        let last = matches!(event, Event::Exited { .. } | Event::Terminated);
        weak_error!(sink.event(event), "event delivery");
        if last {
            break;
        }
    }
    log::debug!(target: "session", "event thread exiting");
}

/// Attach frame 0 to a stop event; missing frame information falls back to
/// adapter-side defaults.
fn fill_frame(debugger: &dyn Debugger, event: Event) -> Event {
    match event {
        Event::Stopped {
            thread_id,
            reason,
            exception,
            description,
            frame: None,
        } => Event::Stopped {
            thread_id,
            reason,
            exception,
            description,
            frame: debugger.frame(thread_id).ok(),
        },
        other => other,
    }
}
