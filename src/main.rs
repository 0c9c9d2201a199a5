//! ptproxy: pluggable-transport proxy daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   argv ──▶ config::Cli ──▶ validate ──▶ LaunchConfig ──▶ logging::init
//!                                              │
//!                                              ▼
//!                                       launch::dispatch
//!                                  ┌───────────┴───────────┐
//!                                  ▼                       ▼
//!                          external launcher        managed launcher
//!                                  └───────────┬───────────┘
//!                                              ▼
//!   ┌──────────────────────────── lifecycle::Lifecycle ───────────────────────────┐
//!   │  initialize: crypto → reactor → resolver → SIGPIPE → watchers → heartbeat   │
//!   │  run:        dispatch loop ◀── SIGINT/SIGTERM ── ShutdownCoordinator        │
//!   │  teardown:   heartbeat → watchers → listeners → reactor → resolver → crypto │
//!   └─────────────────────────────────────────────────────────────────────────────┘
//! ```

use std::process::ExitCode;

use clap::{CommandFactory, Parser};

use ptproxy::config::Cli;
use ptproxy::launch::{self, LaunchError, ProxyLauncher};
use ptproxy::lifecycle::LifecycleOptions;
use ptproxy::protocol;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut launcher = ProxyLauncher::new(LifecycleOptions::default());

    match launch::run(cli, &mut launcher) {
        Ok(()) => ExitCode::SUCCESS,
        Err(LaunchError::Usage(reason)) => {
            eprintln!("ptproxy: {reason}");
            print_usage();
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "Exiting after fatal error");
            eprintln!("ptproxy: {e}");
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    let mut command = Cli::command();
    eprintln!("{}", command.render_usage());
    let protocols: Vec<String> = protocol::SUPPORTED_PROTOCOLS
        .iter()
        .map(|name| format!("[{name}]"))
        .collect();
    eprintln!("* Available protocols: {}", protocols.join(" "));
}
