//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, one task per listener)
//!     → connection.rs (registry entry, status counters)
//!     → relay.rs (resolve target via resolver.rs, copy both ways)
//!       or socks.rs first, for SOCKS client listeners (the client names the target)
//!
//! Shutdown:
//!     first signal → ListenerRegistry::close_all (no new connections)
//!     graceful exit waits for every relay to finish
//! ```
//!
//! # Design Decisions
//! - Relays are tracked reactor work; listeners are not
//! - Peer addresses only reach the logs through `logging::scrub`

pub mod connection;
pub mod listener;
pub mod relay;
pub mod resolver;
pub mod socks;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionRegistry};
pub use listener::{ListenerError, ListenerRegistry};
pub use resolver::Resolver;
