//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (manager.rs):
//!     crypto → reactor → resolver → SIGPIPE policy → signal watchers → heartbeat
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → watcher task → reactor run queue (mpsc)
//!
//! Dispatch (reactor.rs):
//!     run queue → ShutdownCoordinator::on_signal (shutdown.rs)
//!               → close listeners / LoopControl::request_exit(Graceful | Forceful)
//!     Graceful: exit once tracked work is idle
//!     Forceful: exit now
//!
//! Teardown (manager.rs):
//!     heartbeat → watchers → listeners → reactor → resolver → crypto → connection registry
//! ```
//!
//! # Design Decisions
//! - One current-thread runtime: every callback runs on the same thread,
//!   so the shutdown phase needs no lock
//! - Signals are messages, never handler code in interrupt context
//! - First SIGINT drains, second SIGINT or any SIGTERM terminates
//! - Startup failures are fatal; nothing retries

pub mod heartbeat;
pub mod manager;
pub mod reactor;
pub mod shutdown;
pub mod signals;

pub use manager::{Component, Lifecycle, LifecycleOptions, StartupError, TeardownReport};
pub use reactor::{ExitMode, LoopControl, Reactor};
pub use shutdown::{ShutdownActions, ShutdownCoordinator, ShutdownPhase};
pub use signals::SignalKind;
