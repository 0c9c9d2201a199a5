//! Pluggable-transport proxy daemon core.
//!
//! Owns the reactor loop, turns SIGINT/SIGTERM into a two-phase
//! shutdown, logs an hourly heartbeat, and dispatches to the external or
//! managed launcher.

// Startup surfaces
pub mod config;
pub mod launch;

// Reactor, signals, shutdown
pub mod lifecycle;

// Collaborators
pub mod crypto;
pub mod net;
pub mod protocol;

// Cross-cutting concerns
pub mod observability;

pub use config::{Cli, LaunchConfig, OperatingMode};
pub use lifecycle::{Lifecycle, LifecycleOptions, ShutdownPhase};
