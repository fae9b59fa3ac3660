#![forbid(unsafe_code)]

mod constants;
mod ipc;
mod lifecycle;
mod migration;
mod orchestrator;
mod screens;
mod store;
mod surface;
mod types;
mod vfs;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;
use tracing::{info, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;

use ipc::ShellServer;
use orchestrator::{LoopOutcome, Orchestrator};
use screens::X11Backend;
use store::StateStore;
use vfs::Vfs;

/// Session and surface orchestrator for the simulated desktop environment
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Shell socket path (defaults to the runtime directory)
    #[arg(long)]
    socket: Option<PathBuf>,

    /// State directory override (defaults to the user data directory)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Clear the install marker and exit
    #[arg(long)]
    reset: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse log level from environment variable
    let log_level = match std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let store = match &args.data_dir {
        Some(dir) => StateStore::at(dir.clone()),
        None => StateStore::at_default_location(),
    };
    info!(dir = %store.dir().display(), "State directory resolved");

    if args.reset {
        store.clear_install_marker()?;
        info!("Install marker cleared");
        return Ok(());
    }

    let backend = X11Backend::connect()?;

    let server = match &args.socket {
        Some(path) => ShellServer::bind_to(path.clone())?,
        None => ShellServer::bind()?,
    };
    info!(socket = %server.path().display(), "Shell socket bound");

    let (tx, rx) = mpsc::channel();
    let _acceptor = ipc::spawn_acceptor(server, tx);

    let mut orchestrator = Orchestrator::new(
        store,
        Box::new(backend.clone()),
        Box::new(backend),
        Vfs::new(),
    );
    orchestrator.start()?;

    match orchestrator.run(&rx)? {
        LoopOutcome::Shutdown => {
            info!("Event channel closed, shutting down");
            Ok(())
        }
        LoopOutcome::Restart => restart_process(),
    }
}

/// Replace this process with a fresh copy of itself, carrying the original
/// arguments, so the new process re-reads the persisted state from scratch
fn restart_process() -> Result<(), Box<dyn std::error::Error>> {
    let exe = std::env::current_exe().context("Failed to resolve current executable")?;
    info!(exe = %exe.display(), "Restarting process");
    std::process::Command::new(exe)
        .args(std::env::args_os().skip(1))
        .spawn()
        .context("Failed to spawn replacement process")?;
    std::process::exit(0);
}
