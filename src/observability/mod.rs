//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, address scrubbing)
//!     → metrics.rs (counters)
//!     → status.rs (connection/uptime counters for the heartbeat)
//!
//! Consumers:
//!     → stderr or a log file (external mode), a log file or nothing (managed mode)
//!     → whatever metrics recorder the embedding process installs
//!     → the hourly heartbeat
//! ```
//!
//! # Design Decisions
//! - Logging is configured once, after option validation
//! - Peer addresses are scrubbed unless explicitly allowed
//! - Metrics are cheap (atomic increments, no-op without a recorder)

pub mod logging;
pub mod metrics;
pub mod status;
