//! Configuration validation.
//!
//! # Responsibilities
//! - Pick the operating mode (external vs managed), once
//! - Resolve the logging destination and severity
//! - Reject managed-mode setups that would log to the console
//!
//! # Design Decisions
//! - Validation is a pure function: Cli → Result<LaunchConfig, ConfigError>
//! - Runs before logging is initialized and before any launcher

use thiserror::Error;

use crate::config::Cli;
use crate::observability::logging::{LogSink, LoggingConfig};

/// Which launcher runs. Chosen once at startup, never revisited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatingMode {
    /// Configured from our own command line: protocol name plus
    /// protocol arguments, passed verbatim to the external launcher.
    External { args: Vec<String> },
    /// Configured by a supervising parent process over stdout/env.
    Managed,
}

/// Validated startup configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    pub mode: OperatingMode,
    pub logging: LoggingConfig,
}

/// Fatal configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("managed proxy mode can only log to a file")]
    ManagedConsoleLogging,

    #[error("managed proxy mode takes no protocol arguments (got '{0}')")]
    ManagedWithArguments(String),
}

impl Cli {
    /// Validate the parsed options into a [`LaunchConfig`].
    pub fn validate(self) -> Result<LaunchConfig, ConfigError> {
        let severity = if self.no_log { None } else { self.log_min_severity };

        let (mode, sink) = if self.managed {
            if let Some(first) = self.protocol_args.first() {
                return Err(ConfigError::ManagedWithArguments(first.clone()));
            }
            let sink = match (self.log_file, severity) {
                (Some(path), _) => LogSink::File(path),
                (None, Some(_)) => return Err(ConfigError::ManagedConsoleLogging),
                // Managed proxies without a log file must not log at all.
                (None, None) => LogSink::Disabled,
            };
            (OperatingMode::Managed, sink)
        } else {
            let sink = match self.log_file {
                Some(path) => LogSink::File(path),
                None if self.no_log => LogSink::Disabled,
                None => LogSink::Stderr,
            };
            (OperatingMode::External { args: self.protocol_args }, sink)
        };

        Ok(LaunchConfig {
            mode,
            logging: LoggingConfig {
                sink,
                severity,
                safe_logging: !self.no_safe_logging,
            },
        })
    }
}
