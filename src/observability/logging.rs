//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for the chosen sink
//! - Map command-line severities onto tracing levels
//! - Scrub peer addresses from log output (safe logging)
//!
//! # Design Decisions
//! - Uses the tracing crate for structured logging
//! - `RUST_LOG` applies only when no severity was given explicitly
//! - A disabled sink installs no subscriber at all

use std::fmt;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Whether addresses are scrubbed from log output. On by default.
static SAFE_LOGGING: AtomicBool = AtomicBool::new(true);

/// Minimum severity, as spelled on the command line.
///
/// There is no `notice` level in tracing, so everything is shifted down
/// by one: notice maps to INFO, info to DEBUG, debug to TRACE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, clap::ValueEnum)]
pub enum Severity {
    Error,
    Warn,
    #[default]
    Notice,
    Info,
    Debug,
}

impl Severity {
    pub fn level_filter(self) -> LevelFilter {
        match self {
            Severity::Error => LevelFilter::ERROR,
            Severity::Warn => LevelFilter::WARN,
            Severity::Notice => LevelFilter::INFO,
            Severity::Info => LevelFilter::DEBUG,
            Severity::Debug => LevelFilter::TRACE,
        }
    }
}

/// Where log output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    Stderr,
    File(PathBuf),
    Disabled,
}

/// Validated logging setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub sink: LogSink,
    /// `None` means "not given": `RUST_LOG` or the notice default applies.
    pub severity: Option<Severity>,
    pub safe_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            sink: LogSink::Stderr,
            severity: None,
            safe_logging: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed creating logfile {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("logging already initialized: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Install the global subscriber for `config`.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    set_safe_logging(config.safe_logging);

    let filter = match config.severity {
        Some(severity) => EnvFilter::default().add_directive(severity.level_filter().into()),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::default().add_directive(Severity::Notice.level_filter().into())),
    };

    match &config.sink {
        LogSink::Disabled => {}
        LogSink::Stderr => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init()?;
        }
        LogSink::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LoggingError::LogFile {
                    path: path.clone(),
                    source,
                })?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .try_init()?;
        }
    }

    Ok(())
}

pub fn set_safe_logging(enabled: bool) {
    SAFE_LOGGING.store(enabled, Ordering::Relaxed);
}

pub fn safe_logging() -> bool {
    SAFE_LOGGING.load(Ordering::Relaxed)
}

/// Wrap an address for logging; renders `[scrubbed]` while safe logging is on.
pub fn scrub<T: fmt::Display>(address: T) -> Scrubbed<T> {
    Scrubbed(address)
}

pub struct Scrubbed<T>(T);

impl<T: fmt::Display> fmt::Display for Scrubbed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if safe_logging() {
            f.write_str("[scrubbed]")
        } else {
            self.0.fmt(f)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severities_shift_onto_tracing_levels() {
        assert_eq!(Severity::Warn.level_filter(), LevelFilter::WARN);
        assert_eq!(Severity::Notice.level_filter(), LevelFilter::INFO);
        assert_eq!(Severity::Info.level_filter(), LevelFilter::DEBUG);
        assert_eq!(Severity::Debug.level_filter(), LevelFilter::TRACE);
        assert_eq!(Severity::default(), Severity::Notice);
    }

    #[test]
    fn scrubbing_follows_the_flag() {
        // Tests in this binary never turn safe logging off, so the
        // default holds here.
        assert!(safe_logging());
        assert_eq!(scrub("10.0.0.1:443").to_string(), "[scrubbed]");
    }

    #[test]
    fn disabled_sink_installs_nothing() {
        let config = LoggingConfig {
            sink: LogSink::Disabled,
            severity: None,
            safe_logging: true,
        };
        assert!(init(&config).is_ok());
    }

    #[test]
    fn unwritable_log_file_is_fatal() {
        let config = LoggingConfig {
            sink: LogSink::File(PathBuf::from("/nonexistent-dir/ptproxy/log.txt")),
            severity: Some(Severity::Info),
            safe_logging: true,
        };
        assert!(matches!(init(&config), Err(LoggingError::LogFile { .. })));
    }
}
