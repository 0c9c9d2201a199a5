//! Launchers and the mode dispatcher.
//!
//! # Data Flow
//! ```text
//! Cli → Cli::validate → LaunchConfig
//!     → logging::init, "Starting."
//!     → dispatch(mode)
//!         External { args } → Launcher::launch_external(args)   (external.rs)
//!         Managed           → Launcher::launch_managed()        (managed.rs)
//! ```
//!
//! # Design Decisions
//! - The mode is decided once; exactly one launcher runs
//! - Launchers sit behind a trait so dispatch can be checked with a recorder
//! - Every launcher failure surfaces as a `LaunchError` and a non-zero exit

pub mod external;
pub mod managed;

use thiserror::Error;

use crate::config::{Cli, ConfigError, OperatingMode};
use crate::lifecycle::{LifecycleOptions, StartupError};
use crate::net::ListenerError;
use crate::observability::logging::{self, LoggingError};
use crate::protocol::ProtocolError;

pub use managed::ManagedError;

#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bad command line; the caller prints usage.
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Startup(#[from] StartupError),

    #[error("Failed to open listeners for configuration {index}: {source}")]
    Listener {
        index: usize,
        #[source]
        source: ListenerError,
    },

    #[error(transparent)]
    Managed(#[from] ManagedError),
}

/// The two ways the proxy can be brought up.
pub trait Launcher {
    /// Configure from our own command line. `args` is everything after
    /// the options, verbatim.
    fn launch_external(&mut self, args: &[String]) -> Result<(), LaunchError>;

    /// Configure from the supervising parent's environment.
    fn launch_managed(&mut self) -> Result<(), LaunchError>;
}

/// Hand the validated mode to exactly one launcher.
pub fn dispatch<L>(mode: &OperatingMode, launcher: &mut L) -> Result<(), LaunchError>
where
    L: Launcher + ?Sized,
{
    match mode {
        OperatingMode::External { args } => launcher.launch_external(args),
        OperatingMode::Managed => launcher.launch_managed(),
    }
}

/// Validate, set up logging, dispatch.
pub fn run<L>(cli: Cli, launcher: &mut L) -> Result<(), LaunchError>
where
    L: Launcher + ?Sized,
{
    let config = cli.validate()?;
    logging::init(&config.logging)?;
    tracing::info!("Starting.");
    dispatch(&config.mode, launcher)
}

/// The real launchers.
#[derive(Debug, Clone, Default)]
pub struct ProxyLauncher {
    options: LifecycleOptions,
}

impl ProxyLauncher {
    pub fn new(options: LifecycleOptions) -> Self {
        Self { options }
    }
}

impl Launcher for ProxyLauncher {
    fn launch_external(&mut self, args: &[String]) -> Result<(), LaunchError> {
        external::launch(args, &self.options)
    }

    fn launch_managed(&mut self) -> Result<(), LaunchError> {
        managed::launch(&self.options)
    }
}
