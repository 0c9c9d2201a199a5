//! Command-line options.

use std::path::PathBuf;

use clap::Parser;

use crate::observability::logging::Severity;

/// Raw command-line options, before mode and logging validation.
#[derive(Debug, Parser)]
#[command(name = "ptproxy", version)]
#[command(about = "Pluggable-transport proxy daemon", long_about = None)]
#[command(
    override_usage = "ptproxy [OPTIONS] <PROTOCOL> [PROTOCOL_ARGS]... [<PROTOCOL> [PROTOCOL_ARGS]...]..."
)]
pub struct Cli {
    /// Write log output to this file (appended, created if missing)
    #[arg(long, value_name = "FILE", conflicts_with = "no_log")]
    pub log_file: Option<PathBuf>,

    /// Minimum severity to log (default: notice)
    #[arg(long, value_enum, value_name = "SEVERITY", ignore_case = true)]
    pub log_min_severity: Option<Severity>,

    /// Disable logging
    #[arg(long, conflicts_with = "log_min_severity")]
    pub no_log: bool,

    /// Log connection addresses instead of scrubbing them
    #[arg(long)]
    pub no_safe_logging: bool,

    /// Run as a managed proxy configured by the parent process
    #[arg(long)]
    pub managed: bool,

    /// Protocol name followed by its arguments; may repeat
    #[arg(value_name = "PROTOCOL_ARGS", trailing_var_arg = true)]
    pub protocol_args: Vec<String>,
}
