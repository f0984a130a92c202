//! GDB/MI protocol adapter.
//!
//! Line framed: one request per line, shaped `[token][-]name args...`.
//! Replies are result records (`^done`, `^running`, `^error`), asynchronous
//! debugger events become exec-async records (`*stopped`, `*running`), and
//! every request turn ends with the `(gdb)` prompt.

pub mod value;

use crate::debugger::{
    Architecture, Event, ExceptionKind, Frame, OutputCategory, StopReason,
};
use crate::error::Error;
use crate::transport::{SharedWriter, Transport, TransportError};
use crate::util::{c_escape, split_arguments};

use super::{Adapter, EventSink, Reply, ReplyBody, Request, RequestKind};

use value::MiValue;

const PROMPT: &str = "(gdb)\n";

/// Longest accepted command token.
const MAX_TOKEN_DIGITS: usize = 10;

/// MI protocol version. Version 1 is folded to the latest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiVersion(u8);

impl MiVersion {
    pub const LATEST: MiVersion = MiVersion(4);

    pub fn new(version: u8) -> Option<MiVersion> {
        match version {
            1 => Some(MiVersion::LATEST),
            2..=4 => Some(MiVersion(version)),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            2 => "mi2",
            3 => "mi3",
            _ => "mi4",
        }
    }
}

#[derive(Clone, Copy)]
enum Handler {
    /// Normalizes the argument list into a request for the session engine.
    Request(fn(&[String]) -> Result<RequestKind, Error>),
    /// Accepted and ignored; the turn produces only the prompt.
    Silent,
}

struct CommandEntry {
    name: &'static str,
    handler: Handler,
}

/// The MI command table in publication order. Lookup is case-insensitive.
fn command_table() -> Vec<CommandEntry> {
    fn entry(name: &'static str, run: fn(&[String]) -> Result<RequestKind, Error>) -> CommandEntry {
        CommandEntry {
            name,
            handler: Handler::Request(run),
        }
    }
    fn silent(name: &'static str) -> CommandEntry {
        CommandEntry {
            name,
            handler: Handler::Silent,
        }
    }

    fn run(_: &[String]) -> Result<RequestKind, Error> {
        Ok(RequestKind::Run)
    }
    fn cont(_: &[String]) -> Result<RequestKind, Error> {
        Ok(RequestKind::Continue { thread_id: None })
    }
    fn abort(_: &[String]) -> Result<RequestKind, Error> {
        Ok(RequestKind::Terminate)
    }
    fn attach(args: &[String]) -> Result<RequestKind, Error> {
        let pid = args
            .first()
            .and_then(|a| a.parse::<i32>().ok())
            .ok_or_else(|| Error::Schema("attach: expected process pid".into()))?;
        Ok(RequestKind::Attach { pid })
    }
    fn detach(_: &[String]) -> Result<RequestKind, Error> {
        Ok(RequestKind::Detach)
    }
    fn target(args: &[String]) -> Result<RequestKind, Error> {
        match args {
            [sub, path, ..] if sub == "exec" => Ok(RequestKind::SetTarget { path: path.into() }),
            _ => Err(Error::Schema("target: expected `exec PATH`".into())),
        }
    }
    fn set_target(args: &[String]) -> Result<RequestKind, Error> {
        let path = args
            .first()
            .ok_or_else(|| Error::Schema("expected executable path".into()))?;
        Ok(RequestKind::SetTarget { path: path.into() })
    }
    fn set_args(args: &[String]) -> Result<RequestKind, Error> {
        Ok(RequestKind::SetArgs {
            args: args.to_vec(),
        })
    }
    fn cd(args: &[String]) -> Result<RequestKind, Error> {
        let path = args
            .first()
            .ok_or_else(|| Error::Schema("environment-cd: expected directory".into()))?;
        Ok(RequestKind::CwdSet { path: path.into() })
    }
    fn show(args: &[String]) -> Result<RequestKind, Error> {
        Ok(RequestKind::Show {
            topic: args.first().cloned(),
        })
    }
    fn info_command(args: &[String]) -> Result<RequestKind, Error> {
        let name = args
            .first()
            .ok_or_else(|| Error::Schema("info-gdb-mi-command: expected command name".into()))?;
        let name = name.strip_prefix('-').unwrap_or(name);
        Ok(RequestKind::InfoGdbMiCommand {
            name: name.to_string(),
        })
    }
    fn features(_: &[String]) -> Result<RequestKind, Error> {
        Ok(RequestKind::ListFeatures)
    }
    fn exit(_: &[String]) -> Result<RequestKind, Error> {
        Ok(RequestKind::Close {
            terminate_debuggee: None,
        })
    }

    vec![
        entry("exec-run", run),
        entry("exec", run),
        entry("exec-continue", cont),
        entry("continue", cont),
        entry("exec-abort", abort),
        entry("target-attach", attach),
        entry("attach", attach),
        entry("target-detach", detach),
        entry("gdb-detach", detach),
        entry("detach", detach),
        entry("target-disconnect", detach),
        entry("target", target),
        entry("file-exec-and-symbols", set_target),
        entry("exec-arguments", set_args),
        entry("environment-cd", cd),
        entry("show", show),
        entry("info-gdb-mi-command", info_command),
        entry("list-features", features),
        entry("gdb-exit", exit),
        entry("quit", exit),
        entry("q", exit),
        silent("gdb-set"),
        silent("inferior-tty-set"),
    ]
}

pub struct MiAdapter {
    transport: Box<dyn Transport>,
    version: MiVersion,
    commands: Vec<CommandEntry>,
}

impl MiAdapter {
    pub fn new(transport: impl Transport + 'static, version: MiVersion) -> MiAdapter {
        MiAdapter {
            transport: Box::new(transport),
            version,
            commands: command_table(),
        }
    }

    /// Adapter name for the CLI surface: `mi2`, `mi3` or `mi4`.
    pub fn name(&self) -> &'static str {
        self.version.name()
    }

    fn lookup(&self, name: &str) -> Option<Handler> {
        self.commands
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(|e| e.handler)
    }

    fn send(&mut self, text: &str) -> Result<(), Error> {
        self.transport
            .send(text.as_bytes())
            .map_err(Error::Framing)
    }

    /// Log-stream echo of a CLI-form command line.
    fn echo_cli(&mut self, line: &str) -> Result<(), Error> {
        self.send(&format!("&\"{}\"\n", c_escape(line)))
    }

    /// One complete reply turn: optional console record, the result
    /// record, then the prompt, written atomically.
    fn finish_turn(&mut self, console: Option<&str>, record: &str) -> Result<(), Error> {
        let mut turn = String::new();
        if let Some(text) = console {
            turn.push_str(&format!("~\"{}\"\n", c_escape(text)));
        }
        turn.push_str(record);
        turn.push_str(PROMPT);
        self.send(&turn)
    }

    fn error_turn(&mut self, id: Option<i64>, message: &str) -> Result<(), Error> {
        let mut root = MiValue::object();
        root.set("msg", MiValue::str(message)).expect("fresh object");
        let record = root.to_message(&format!("{}^error", id_prefix(id)));
        self.finish_turn(None, &record)
    }
}

fn id_prefix(id: Option<i64>) -> String {
    id.map(|id| id.to_string()).unwrap_or_default()
}

/// Split the optional numeric token off a command line.
fn parse_token(line: &str) -> Result<(Option<i64>, &str), Error> {
    let digits_end = line
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(line.len());
    if digits_end == 0 {
        return Ok((None, line));
    }
    if digits_end > MAX_TOKEN_DIGITS {
        return Err(Error::Schema("command token too long".into()));
    }
    let id = line[..digits_end]
        .parse::<i64>()
        .map_err(|_| Error::Schema("command token too long".into()))?;
    Ok((Some(id), &line[digits_end..]))
}

impl Adapter for MiAdapter {
    fn connected(&mut self) -> Result<(), Error> {
        log::info!(target: "mi", "session open ({})", self.version.name());
        self.send(PROMPT)
    }

    fn next_request(&mut self) -> Result<Request, Error> {
        loop {
            let line = self.transport.read_line().map_err(Error::Framing)?;
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\r', '\n']);

            let (id, rest) = match parse_token(line) {
                Ok(parsed) => parsed,
                Err(e) => {
                    self.error_turn(None, &e.to_string())?;
                    continue;
                }
            };

            let (is_mi, rest) = match rest.strip_prefix('-') {
                Some(stripped) => (true, stripped),
                None => (false, rest),
            };

            if rest.is_empty() {
                // empty line, lone token or lone dash: no-op success
                self.finish_turn(None, &format!("{}^done\n", id_prefix(id)))?;
                continue;
            }

            // GDB traces CLI-form commands back as a log-stream record
            if !is_mi {
                self.echo_cli(rest)?;
            }

            let mut parts = split_arguments(rest);
            if parts.is_empty() {
                // whitespace only, same as an empty line
                self.finish_turn(None, &format!("{}^done\n", id_prefix(id)))?;
                continue;
            }
            let name = parts.remove(0);
            let args = parts;

            match self.lookup(&name) {
                Some(Handler::Silent) => {
                    self.send(PROMPT)?;
                    continue;
                }
                Some(Handler::Request(run)) => match run(&args) {
                    Ok(kind) => {
                        return Ok(Request {
                            id,
                            command: name,
                            kind,
                        });
                    }
                    Err(e) => {
                        self.error_turn(id, &e.to_string())?;
                        continue;
                    }
                },
                None => {
                    return Ok(Request {
                        id,
                        command: name.clone(),
                        kind: RequestKind::Unknown { name },
                    });
                }
            }
        }
    }

    fn reply(&mut self, request: &Request, reply: Reply) -> Result<(), Error> {
        // gdb-exit and friends end the session without any record
        if matches!(request.kind, RequestKind::Close { .. }) {
            return Ok(());
        }

        match reply {
            Reply::Success(body) => {
                let class = match request.kind {
                    RequestKind::Run
                    | RequestKind::Launch { .. }
                    | RequestKind::Continue { .. }
                    | RequestKind::Attach { .. } => "^running",
                    _ => "^done",
                };
                let head = format!("{}{class}", id_prefix(request.id));

                let mut console = None;
                let details: Option<MiValue> = match (&request.kind, &body) {
                    (RequestKind::ListFeatures, Some(ReplyBody::Features(features))) => {
                        let mut root = MiValue::object();
                        root.set(
                            "features",
                            MiValue::Array(
                                features.iter().map(|f| MiValue::str(*f)).collect(),
                            ),
                        )
                        .expect("fresh object");
                        Some(root)
                    }
                    (RequestKind::InfoGdbMiCommand { name }, _) => {
                        let mut command = MiValue::object();
                        command
                            .set("exists", MiValue::Bool(self.lookup(name).is_some()))
                            .expect("fresh object");
                        let mut root = MiValue::object();
                        root.set("command", command).expect("fresh object");
                        Some(root)
                    }
                    (RequestKind::Show { .. }, Some(ReplyBody::Version(version))) => {
                        console = Some(format!("{version}\n"));
                        None
                    }
                    _ => None,
                };

                let record = match details {
                    Some(details) => details.to_message(&head),
                    None => format!("{head}\n"),
                };
                self.finish_turn(console.as_deref(), &record)
            }
            Reply::Error { message } => self.error_turn(request.id, &message),
        }
    }

    fn event_sink(&self) -> Box<dyn EventSink> {
        Box::new(MiEventSink {
            writer: self.transport.writer(),
        })
    }
}

struct MiEventSink {
    writer: SharedWriter,
}

impl EventSink for MiEventSink {
    fn event(&self, event: Event) -> Result<(), Error> {
        let Some(record) = format_event(&event) else {
            log::debug!(target: "mi", "event without MI form: {event:?}");
            return Ok(());
        };
        self.writer
            .send(record.as_bytes())
            .map_err(|e| Error::Framing(TransportError::Io(e)))
    }
}

fn arch_name(arch: Architecture) -> &'static str {
    match arch {
        Architecture::I386 => "i386",
        Architecture::X86_64 => "i386:x86_64",
        Architecture::AArch32 => "arm",
        Architecture::AArch64 => "aarch64",
    }
}

fn reason_name(reason: StopReason) -> &'static str {
    match reason {
        StopReason::Step => "step",
        StopReason::Breakpoint => "breakpoint-hit",
        StopReason::Exception => "signal-received",
        _ => "unknown",
    }
}

/// Signal identity shown for signal-backed stops.
fn signal_info(
    reason: StopReason,
    exception: Option<ExceptionKind>,
) -> Option<(&'static str, &'static str)> {
    match reason {
        StopReason::Step | StopReason::Breakpoint => {
            Some(("SIGTRAP", "Trace/breakpoint trap"))
        }
        StopReason::Exception => Some(match exception {
            Some(ExceptionKind::Segfault) => ("SIGSEGV", "Segmentation fault"),
            Some(ExceptionKind::IllegalInstruction) => ("SIGILL", "Illegal instruction"),
            Some(ExceptionKind::Arithmetic) => ("SIGFPE", "Arithmetic exception"),
            Some(ExceptionKind::Abort) => ("SIGABRT", "Aborted"),
            Some(ExceptionKind::Trap) | None => ("SIGTRAP", "Trace/breakpoint trap"),
            Some(ExceptionKind::Other) => ("SIGUSR1", "Unknown signal"),
        }),
        _ => None,
    }
}

/// Translate a debugger event to its MI record, if it has one.
pub(crate) fn format_event(event: &Event) -> Option<String> {
    match event {
        Event::Continued { .. } => {
            let mut root = MiValue::object();
            root.set("thread-id", MiValue::str("all"))
                .expect("fresh object");
            Some(root.to_message("*running"))
        }
        Event::Exited { exit_code: 0 } => {
            let mut root = MiValue::object();
            root.set("reason", MiValue::str("exited-normally"))
                .expect("fresh object");
            Some(root.to_message("*stopped"))
        }
        Event::Exited { exit_code } => {
            let mut root = MiValue::object();
            root.set("reason", MiValue::str("exited"))
                .expect("fresh object");
            root.set("exit-code", MiValue::Int(i64::from(*exit_code)))
                .expect("fresh object");
            Some(root.to_message("*stopped"))
        }
        Event::Stopped {
            thread_id,
            reason,
            exception,
            frame,
            ..
        } => {
            let mut root = MiValue::object();
            root.set("reason", MiValue::str(reason_name(*reason)))
                .expect("fresh object");
            if let Some((name, meaning)) = signal_info(*reason, *exception) {
                root.set("signal-name", MiValue::str(name))
                    .expect("fresh object");
                root.set("signal-meaning", MiValue::str(meaning))
                    .expect("fresh object");
            }

            let frame = frame.clone().unwrap_or_else(Frame::unknown);
            let mut frame_obj = MiValue::object();
            frame_obj
                .set("addr", MiValue::str(format!("{:#x}", frame.address)))
                .expect("fresh object");
            frame_obj
                .set(
                    "func",
                    MiValue::str(frame.function_name.as_deref().unwrap_or("??")),
                )
                .expect("fresh object");
            frame_obj
                .set(
                    "args",
                    MiValue::Array(
                        frame
                            .arguments
                            .iter()
                            .map(|(name, value)| {
                                let mut arg = MiValue::object();
                                arg.set("name", MiValue::str(name)).expect("fresh object");
                                arg.set("value", MiValue::str(value)).expect("fresh object");
                                arg
                            })
                            .collect(),
                    ),
                )
                .expect("fresh object");
            frame_obj
                .set("arch", MiValue::str(arch_name(frame.architecture)))
                .expect("fresh object");
            root.set("frame", frame_obj).expect("fresh object");

            root.set("thread-id", MiValue::Int(*thread_id))
                .expect("fresh object");
            root.set("stopped-threads", MiValue::str("all"))
                .expect("fresh object");
            Some(root.to_message("*stopped"))
        }
        Event::Output { category, output } => {
            let record = match category {
                OutputCategory::Stdout | OutputCategory::Stderr => {
                    format!("@\"{}\"\n", c_escape(output))
                }
                OutputCategory::Important => format!("&\"{}\"\n", c_escape(output)),
                OutputCategory::Console | OutputCategory::Telemetry => {
                    format!("~\"{}\"\n", c_escape(output))
                }
            };
            Some(record)
        }
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_token() {
        assert_eq!(parse_token("").unwrap(), (None, ""));
        assert_eq!(parse_token("-exec-run").unwrap(), (None, "-exec-run"));
        assert_eq!(parse_token("22").unwrap(), (Some(22), ""));
        assert_eq!(
            parse_token("7foo bar").unwrap(),
            (Some(7), "foo bar")
        );
        assert_eq!(
            parse_token("123-exec-run").unwrap(),
            (Some(123), "-exec-run")
        );
        assert!(parse_token("12345678901foo").is_err());
    }

    #[test]
    fn test_version_folding() {
        assert_eq!(MiVersion::new(1), Some(MiVersion::LATEST));
        assert_eq!(MiVersion::new(2).unwrap().name(), "mi2");
        assert_eq!(MiVersion::new(3).unwrap().name(), "mi3");
        assert_eq!(MiVersion::new(4).unwrap().name(), "mi4");
        assert_eq!(MiVersion::new(5), None);
    }

    #[test]
    fn test_exit_event_records() {
        let normal = format_event(&Event::Exited { exit_code: 0 }).unwrap();
        assert_eq!(normal, "*stopped,reason=\"exited-normally\"\n");

        let coded = format_event(&Event::Exited { exit_code: 7 }).unwrap();
        assert_eq!(coded, "*stopped,reason=\"exited\",exit-code=\"7\"\n");
    }

    #[test]
    fn test_continued_record() {
        let record = format_event(&Event::Continued { thread_id: 4 }).unwrap();
        assert_eq!(record, "*running,thread-id=\"all\"\n");
    }

    #[test]
    fn test_stopped_record_defaults() {
        let record = format_event(&Event::Stopped {
            thread_id: 2,
            reason: StopReason::Breakpoint,
            exception: None,
            description: None,
            frame: None,
        })
        .unwrap();
        let arch = arch_name(Architecture::host());
        assert_eq!(
            record,
            format!(
                "*stopped,reason=\"breakpoint-hit\",signal-name=\"SIGTRAP\",\
                 signal-meaning=\"Trace/breakpoint trap\",\
                 frame={{addr=\"0x0\",func=\"??\",args=[],arch=\"{arch}\"}},\
                 thread-id=\"2\",stopped-threads=\"all\"\n"
            )
        );
    }

    #[test]
    fn test_stopped_record_with_frame() {
        let record = format_event(&Event::Stopped {
            thread_id: 1,
            reason: StopReason::Exception,
            exception: Some(ExceptionKind::Segfault),
            description: None,
            frame: Some(Frame {
                address: 0x7f00,
                function_name: Some("main".into()),
                arguments: vec![("argc".into(), "2".into())],
                architecture: Architecture::X86_64,
            }),
        })
        .unwrap();
        assert_eq!(
            record,
            "*stopped,reason=\"signal-received\",signal-name=\"SIGSEGV\",\
             signal-meaning=\"Segmentation fault\",\
             frame={addr=\"0x7f00\",func=\"main\",args=[{name=\"argc\",value=\"2\"}],\
             arch=\"i386:x86_64\"},thread-id=\"1\",stopped-threads=\"all\"\n"
        );
    }
}
