//! Startup configuration subsystem.
//!
//! # Data Flow
//! ```text
//! argv
//!     → cli.rs (clap: syntax, duplicates, conflicts, unknown options)
//!     → validation.rs (mode/logging rules)
//!     → LaunchConfig { mode, logging } (validated, immutable)
//!     → consumed once by launch::dispatch
//! ```
//!
//! # Design Decisions
//! - Parsing and validation are separate so each is testable alone
//! - Everything from the first positional argument on belongs to the
//!   external launcher and is passed through verbatim
//! - Managed mode never logs to the console: stdout is its control channel

pub mod cli;
pub mod validation;

pub use cli::Cli;
pub use validation::{ConfigError, LaunchConfig, OperatingMode};
