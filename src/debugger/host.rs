//! Debugger backend for the host OS, driving debuggees with `ptrace`.
//!
//! All ptrace requests must originate from the tracer thread, so the backend
//! funnels every lifecycle operation through one control thread that also
//! reaps debuggee wait statuses. Events flow to [`Debugger::wait`] through a
//! channel, merged with the debuggee's captured stdout/stderr.

use std::io::{self, BufRead, BufReader};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::personality::{self, Persona};
use nix::sys::ptrace;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use super::{
    Architecture, Debugger, Error, Event, ExceptionKind, Frame, OutputCategory, StopReason,
    ThreadId,
};

/// Cadence of the control thread between command polls.
const CONTROL_TICK: Duration = Duration::from_millis(20);

enum Cmd {
    Launch {
        exec: PathBuf,
        args: Vec<String>,
        cwd: Option<PathBuf>,
        reply: Sender<Result<(), Error>>,
    },
    Attach {
        pid: i32,
        reply: Sender<Result<(), Error>>,
    },
    Continue {
        tid: ThreadId,
        reply: Sender<Result<(), Error>>,
    },
    Terminate {
        reply: Sender<Result<(), Error>>,
    },
    Detach {
        reply: Sender<Result<(), Error>>,
    },
    Threads {
        reply: Sender<Result<Vec<ThreadId>, Error>>,
    },
    Frame {
        tid: ThreadId,
        reply: Sender<Result<Frame, Error>>,
    },
}

/// Native debugger backend. One debuggee at a time; the handle is cleared
/// on terminate/detach and when the exit status is reaped.
pub struct HostDebugger {
    cmd_tx: Sender<Cmd>,
    event_rx: Mutex<Receiver<Event>>,
}

impl HostDebugger {
    pub fn new() -> Result<HostDebugger, Error> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let _ = thread::Builder::new()
            .name("debugger-ctl".into())
            .spawn(move || control_loop(cmd_rx, event_tx))?;
        Ok(HostDebugger {
            cmd_tx,
            event_rx: Mutex::new(event_rx),
        })
    }

    fn call<T>(
        &self,
        build: impl FnOnce(Sender<Result<T, Error>>) -> Cmd,
    ) -> Result<T, Error> {
        let (tx, rx) = mpsc::channel();
        self.cmd_tx
            .send(build(tx))
            .map_err(|_| Error::Backend("control thread terminated".into()))?;
        rx.recv()
            .map_err(|_| Error::Backend("control thread terminated".into()))?
    }
}

impl Debugger for HostDebugger {
    fn launch(&self, exec: &Path, args: &[String], cwd: Option<&Path>) -> Result<(), Error> {
        self.call(|reply| Cmd::Launch {
            exec: exec.to_path_buf(),
            args: args.to_vec(),
            cwd: cwd.map(Path::to_path_buf),
            reply,
        })
    }

    fn attach(&self, pid: i32) -> Result<(), Error> {
        self.call(|reply| Cmd::Attach { pid, reply })
    }

    fn continue_thread(&self, tid: ThreadId) -> Result<(), Error> {
        self.call(|reply| Cmd::Continue { tid, reply })
    }

    fn terminate(&self) -> Result<(), Error> {
        self.call(|reply| Cmd::Terminate { reply })
    }

    fn detach(&self) -> Result<(), Error> {
        self.call(|reply| Cmd::Detach { reply })
    }

    fn wait(&self) -> Result<Event, Error> {
        let rx = self.event_rx.lock().unwrap();
        rx.recv()
            .map_err(|_| Error::Backend("event stream closed".into()))
    }

    fn threads(&self) -> Result<Vec<ThreadId>, Error> {
        self.call(|reply| Cmd::Threads { reply })
    }

    fn frame(&self, tid: ThreadId) -> Result<Frame, Error> {
        self.call(|reply| Cmd::Frame { tid, reply })
    }
}

/// Debuggee bookkeeping owned by the control thread.
struct Tracee {
    pid: Pid,
    /// Kept alive so the child handle is not reused; reaping goes through
    /// `waitpid` directly.
    _child: Option<std::process::Child>,
    /// The tracee is currently in a stop reported to us.
    stopped: bool,
}

fn control_loop(cmd_rx: Receiver<Cmd>, event_tx: Sender<Event>) {
    let mut tracee: Option<Tracee> = None;

    loop {
        match cmd_rx.recv_timeout(CONTROL_TICK) {
            Ok(cmd) => handle_cmd(cmd, &mut tracee, &event_tx),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if tracee.is_some() {
            poll_tracee(&mut tracee, &event_tx);
        }
    }

    log::debug!(target: "debugger", "control thread exiting");
}

fn handle_cmd(cmd: Cmd, tracee: &mut Option<Tracee>, event_tx: &Sender<Event>) {
    match cmd {
        Cmd::Launch {
            exec,
            args,
            cwd,
            reply,
        } => {
            let res = do_launch(tracee, &exec, &args, cwd.as_deref(), event_tx);
            let _ = reply.send(res);
        }
        Cmd::Attach { pid, reply } => {
            let _ = reply.send(do_attach(tracee, pid));
        }
        Cmd::Continue { tid, reply } => {
            let res = do_continue(tracee, tid, event_tx);
            let _ = reply.send(res);
        }
        Cmd::Terminate { reply } => {
            let res = do_terminate(tracee, event_tx);
            let _ = reply.send(res);
        }
        Cmd::Detach { reply } => {
            let res = do_detach(tracee, event_tx);
            let _ = reply.send(res);
        }
        Cmd::Threads { reply } => {
            let res = match tracee {
                Some(t) => thread_ids(t.pid),
                None => Err(Error::NotActive),
            };
            let _ = reply.send(res);
        }
        Cmd::Frame { tid, reply } => {
            let res = match tracee {
                Some(_) => read_frame(tid),
                None => Err(Error::NotActive),
            };
            let _ = reply.send(res);
        }
    }
}

fn do_launch(
    tracee: &mut Option<Tracee>,
    exec: &Path,
    args: &[String],
    cwd: Option<&Path>,
    event_tx: &Sender<Event>,
) -> Result<(), Error> {
    if tracee.is_some() {
        return Err(Error::Backend("debuggee already active".into()));
    }

    let exec: PathBuf = if exec.exists() {
        exec.to_path_buf()
    } else {
        which::which(exec).map_err(|_| Error::NotFound(exec.to_path_buf()))?
    };

    let (stdout_reader, stdout_writer) = os_pipe::pipe()?;
    let (stderr_reader, stderr_writer) = os_pipe::pipe()?;

    let mut command = Command::new(&exec);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(stdout_writer)
        .stderr(stderr_writer);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }
    unsafe {
        command.pre_exec(|| {
            personality::set(Persona::ADDR_NO_RANDOMIZE)?;
            ptrace::traceme()?;
            Ok(())
        });
    }

    let child = command.spawn().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::NotFound(exec.clone()),
        io::ErrorKind::PermissionDenied => Error::PermissionDenied(exec.display().to_string()),
        _ => Error::Io(e),
    })?;
    let pid = Pid::from_raw(child.id() as i32);

    // consume the exec stop; the debuggee remains stopped at entry
    waitpid(pid, None).map_err(|e| Error::Backend(format!("waitpid: {e}")))?;

    forward_output(stdout_reader, OutputCategory::Stdout, event_tx.clone());
    forward_output(stderr_reader, OutputCategory::Stderr, event_tx.clone());

    log::info!(target: "debugger", "debuggee launched: {} (pid {pid})", exec.display());
    *tracee = Some(Tracee {
        pid,
        _child: Some(child),
        stopped: true,
    });
    Ok(())
}

fn do_attach(tracee: &mut Option<Tracee>, raw_pid: i32) -> Result<(), Error> {
    if tracee.is_some() {
        return Err(Error::Backend("debuggee already active".into()));
    }

    let pid = Pid::from_raw(raw_pid);
    ptrace::attach(pid).map_err(|errno| match errno {
        Errno::ESRCH => Error::NoSuchProcess(raw_pid),
        Errno::EPERM | Errno::EACCES => Error::PermissionDenied(format!("attach pid {raw_pid}")),
        e => Error::Backend(format!("attach: {e}")),
    })?;
    // consume the attach stop
    waitpid(pid, None).map_err(|e| Error::Backend(format!("waitpid: {e}")))?;

    log::info!(target: "debugger", "attached to pid {pid}");
    *tracee = Some(Tracee {
        pid,
        _child: None,
        stopped: true,
    });
    Ok(())
}

fn do_continue(
    tracee: &mut Option<Tracee>,
    tid: ThreadId,
    event_tx: &Sender<Event>,
) -> Result<(), Error> {
    let Some(t) = tracee.as_mut() else {
        return Err(Error::NotActive);
    };
    let pid = if tid == 0 { t.pid } else { Pid::from_raw(tid as i32) };
    ptrace::cont(pid, None).map_err(|errno| match errno {
        Errno::ESRCH => Error::NotActive,
        e => Error::Backend(format!("continue: {e}")),
    })?;
    t.stopped = false;
    let _ = event_tx.send(Event::Continued {
        thread_id: pid.as_raw() as ThreadId,
    });
    Ok(())
}

fn do_terminate(tracee: &mut Option<Tracee>, event_tx: &Sender<Event>) -> Result<(), Error> {
    let Some(t) = tracee.as_ref() else {
        return Err(Error::NotActive);
    };
    let pid = t.pid;
    if let Err(e) = signal::kill(pid, Signal::SIGKILL) {
        if e != Errno::ESRCH {
            return Err(Error::Backend(format!("kill: {e}")));
        }
    }
    // reap the kill so no zombie outlives the session
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) | Err(_) => break,
            Ok(_) => continue,
        }
    }
    *tracee = None;
    log::info!(target: "debugger", "debuggee terminated (pid {pid})");
    let _ = event_tx.send(Event::Terminated);
    Ok(())
}

fn do_detach(tracee: &mut Option<Tracee>, event_tx: &Sender<Event>) -> Result<(), Error> {
    let Some(t) = tracee.as_mut() else {
        return Err(Error::NotActive);
    };
    let pid = t.pid;
    // ptrace requires a stopped tracee to detach from
    if !t.stopped {
        let _ = signal::kill(pid, Signal::SIGSTOP);
        let _ = waitpid(pid, None);
        t.stopped = true;
    }
    ptrace::detach(pid, None).map_err(|e| Error::Backend(format!("detach: {e}")))?;
    *tracee = None;
    log::info!(target: "debugger", "detached from pid {pid}");
    let _ = event_tx.send(Event::Terminated);
    Ok(())
}

fn poll_tracee(tracee: &mut Option<Tracee>, event_tx: &Sender<Event>) {
    loop {
        let Some(pid) = tracee.as_ref().map(|t| t.pid) else {
            return;
        };
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => return,
            Ok(WaitStatus::Exited(_, code)) => {
                let _ = event_tx.send(Event::Exited { exit_code: code });
                *tracee = None;
                return;
            }
            Ok(WaitStatus::Signaled(_, sig, _)) => {
                let _ = event_tx.send(Event::Exited {
                    exit_code: 128 + sig as i32,
                });
                *tracee = None;
                return;
            }
            Ok(WaitStatus::Stopped(stopped_pid, sig)) => {
                if let Some(t) = tracee.as_mut() {
                    t.stopped = true;
                }
                let _ = event_tx.send(stop_event(stopped_pid, sig));
            }
            Ok(WaitStatus::PtraceEvent(event_pid, ..)) | Ok(WaitStatus::PtraceSyscall(event_pid)) => {
                // not a stop the client asked for, keep the debuggee moving
                let _ = ptrace::cont(event_pid, None);
            }
            Ok(_) => {}
            Err(Errno::ECHILD) => {
                // reaped elsewhere or gone after detach
                let _ = event_tx.send(Event::Terminated);
                *tracee = None;
                return;
            }
            Err(e) => {
                log::warn!(target: "debugger", "waitpid: {e}");
                return;
            }
        }
    }
}

fn stop_event(pid: Pid, sig: Signal) -> Event {
    let thread_id = pid.as_raw() as ThreadId;
    let (reason, exception) = match sig {
        Signal::SIGTRAP => (StopReason::Breakpoint, None),
        Signal::SIGSTOP => (StopReason::Pause, None),
        Signal::SIGSEGV => (StopReason::Exception, Some(ExceptionKind::Segfault)),
        Signal::SIGILL => (StopReason::Exception, Some(ExceptionKind::IllegalInstruction)),
        Signal::SIGFPE => (StopReason::Exception, Some(ExceptionKind::Arithmetic)),
        Signal::SIGABRT => (StopReason::Exception, Some(ExceptionKind::Abort)),
        _ => (StopReason::Exception, Some(ExceptionKind::Other)),
    };
    Event::Stopped {
        thread_id,
        reason,
        exception,
        description: matches!(reason, StopReason::Exception).then(|| format!("{sig:?}")),
        frame: None,
    }
}

fn thread_ids(pid: Pid) -> Result<Vec<ThreadId>, Error> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(format!("/proc/{pid}/task"))? {
        let entry = entry?;
        if let Ok(tid) = entry.file_name().to_string_lossy().parse::<ThreadId>() {
            out.push(tid);
        }
    }
    out.sort_unstable();
    Ok(out)
}

#[cfg(target_arch = "x86_64")]
fn read_frame(tid: ThreadId) -> Result<Frame, Error> {
    let regs = ptrace::getregs(Pid::from_raw(tid as i32)).map_err(|_| Error::NoFrame(tid))?;
    Ok(Frame {
        address: regs.rip,
        function_name: None,
        arguments: Vec::new(),
        architecture: Architecture::host(),
    })
}

#[cfg(not(target_arch = "x86_64"))]
fn read_frame(tid: ThreadId) -> Result<Frame, Error> {
    Err(Error::NoFrame(tid))
}

fn forward_output(reader: os_pipe::PipeReader, category: OutputCategory, event_tx: Sender<Event>) {
    thread::spawn(move || {
        let mut stream = BufReader::new(reader);
        loop {
            let mut line = String::new();
            let Ok(size) = stream.read_line(&mut line) else {
                break;
            };
            if size == 0 {
                break;
            }
            if event_tx
                .send(Event::Output {
                    category,
                    output: line,
                })
                .is_err()
            {
                break;
            }
        }
    });
}
