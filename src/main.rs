//! Aliceserver entry point: CLI parsing, logging setup, and the session
//! over stdio.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;
use strum_macros::{Display, EnumString, IntoStaticStr};

use aliceserver::adapter::dap::DapAdapter;
use aliceserver::adapter::mi::{MiAdapter, MiVersion};
use aliceserver::adapter::Adapter;
use aliceserver::debugger::HostDebugger;
use aliceserver::session::{Session, TargetConfig};
use aliceserver::transport::{HttpTransport, LineTransport};
use aliceserver::version;

#[derive(Debug, Clone, Copy, PartialEq, EnumString, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
enum AdapterKind {
    Dap,
    Mi,
    Mi2,
    Mi3,
    Mi4,
}

#[derive(Parser, Debug)]
#[command(author, about, long_about = None, disable_version_flag = true)]
struct Args {
    /// Protocol adapter to serve (dap, mi, mi2, mi3, mi4).
    #[clap(short = 'a', long, default_value = "dap")]
    adapter: AdapterKind,

    /// List available adapters and exit.
    #[clap(long)]
    list_adapters: bool,

    /// Enable logging (stderr unless --logfile is given).
    #[clap(long)]
    log: bool,

    /// Write logs to a file instead of stderr.
    #[clap(long, value_name = "PATH")]
    logfile: Option<PathBuf>,

    /// Maximum log level (error, warn, info, debug, trace).
    #[clap(long, value_name = "LEVEL")]
    loglevel: Option<LevelFilter>,

    /// Print the version string and exit.
    #[clap(long)]
    ver: bool,

    /// Print detailed version information and exit.
    #[clap(long)]
    version: bool,

    /// Debuggee executable path.
    target: Option<PathBuf>,

    /// Debuggee arguments.
    #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
    target_args: Vec<String>,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    if let Err(e) = run(args) {
        log::error!("fatal: {e:#}");
        eprintln!("fatal: {e:#}");
        std::process::exit(2);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    if args.ver {
        println!("{}", version::short());
        return Ok(());
    }
    if args.version {
        print!("{}", version::block());
        return Ok(());
    }
    if args.list_adapters {
        for name in version::ADAPTERS {
            if *name == "dap" {
                println!("{name} (default)");
            } else {
                println!("{name}");
            }
        }
        return Ok(());
    }

    init_logging(&args)?;

    let target = TargetConfig {
        path: args.target.clone(),
        args: args.target_args.clone(),
        cwd: None,
    };

    let debugger = Arc::new(HostDebugger::new().context("start debugger backend")?);

    let adapter: Box<dyn Adapter> = match args.adapter {
        AdapterKind::Dap => Box::new(DapAdapter::new(HttpTransport::stdio())),
        AdapterKind::Mi | AdapterKind::Mi4 => Box::new(MiAdapter::new(
            LineTransport::stdio(),
            MiVersion::LATEST,
        )),
        AdapterKind::Mi2 => Box::new(MiAdapter::new(
            LineTransport::stdio(),
            MiVersion::new(2).expect("valid version"),
        )),
        AdapterKind::Mi3 => Box::new(MiAdapter::new(
            LineTransport::stdio(),
            MiVersion::new(3).expect("valid version"),
        )),
    };

    log::info!(
        target: "session",
        "{} serving {} on stdio",
        version::line(),
        args.adapter,
    );

    Session::new(adapter, debugger, target)
        .run()
        .context("session")?;
    Ok(())
}

/// Log targets this server emits records under.
const LOG_TARGETS: &[&str] = &["session", "dap", "mi", "debugger"];

/// Install the logger once, before the session starts. Without any log
/// flag (or `RUST_LOG`) no logger is installed and the process stays
/// silent; stdout is the protocol channel either way, so the sink is
/// stderr or a file.
fn init_logging(args: &Args) -> anyhow::Result<()> {
    let logging_requested = args.log
        || args.logfile.is_some()
        || args.loglevel.is_some()
        || std::env::var_os("RUST_LOG").is_some();
    if !logging_requested {
        return Ok(());
    }

    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        // scope the requested level to this server's own targets; noise
        // from dependencies stays at warn
        let level = args.loglevel.unwrap_or(LevelFilter::Info);
        builder.filter_level(LevelFilter::Warn);
        for target in LOG_TARGETS {
            builder.filter(Some(*target), level);
        }
    } else if let Some(level) = args.loglevel {
        for target in LOG_TARGETS {
            builder.filter(Some(*target), level);
        }
    }
    match &args.logfile {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        None => {
            builder.target(env_logger::Target::Stderr);
        }
    }

    let logger = builder.build();
    log::set_max_level(logger.filter());
    log::set_boxed_logger(Box::new(logger)).context("install logger")?;
    Ok(())
}
