//! Connection registry.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Keep the set of open connections until teardown
//! - Feed the status board and metrics on every accept

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::observability::logging::scrub;
use crate::observability::metrics;
use crate::observability::status::StatusBoard;

/// Relaxed ordering is enough: IDs only need to be unique.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Open connections, keyed by ID.
#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    open: Arc<DashMap<ConnectionId, SocketAddr>>,
    status: Arc<StatusBoard>,
}

impl ConnectionRegistry {
    pub fn new(status: Arc<StatusBoard>) -> Self {
        Self {
            open: Arc::new(DashMap::new()),
            status,
        }
    }

    /// Record a new connection from `peer`. Returns a guard that
    /// unregisters it on drop.
    pub fn track(&self, peer: SocketAddr) -> ConnectionGuard {
        let id = ConnectionId::new();
        self.open.insert(id, peer);
        self.status.note_connection(peer);
        metrics::record_connection();
        tracing::debug!(connection_id = %id, peer = %scrub(peer), "Connection opened");

        ConnectionGuard {
            open: Arc::clone(&self.open),
            id,
        }
    }

    pub fn active_count(&self) -> usize {
        self.open.len()
    }

    /// Forget every remaining connection. Runs after the reactor is
    /// gone, so any connection still listed was cut off by a forceful
    /// exit. Returns how many there were.
    pub fn close_all(self) -> usize {
        let remaining = self.open.len();
        if remaining > 0 {
            tracing::debug!(remaining, "Dropping connections left open at exit");
        }
        self.open.clear();
        remaining
    }
}

/// Tracks one connection's lifetime.
#[derive(Debug)]
pub struct ConnectionGuard {
    open: Arc<DashMap<ConnectionId, SocketAddr>>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.open.remove(&self.id);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (ConnectionRegistry, Arc<StatusBoard>) {
        let status = Arc::new(StatusBoard::new());
        (ConnectionRegistry::new(Arc::clone(&status)), status)
    }

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("conn-"));
    }

    #[test]
    fn registry_counts_open_connections() {
        let (registry, status) = registry();
        assert_eq!(registry.active_count(), 0);

        let guard1 = registry.track("10.0.0.1:1000".parse().unwrap());
        let guard2 = registry.track("10.0.0.1:1001".parse().unwrap());
        assert_eq!(registry.active_count(), 2);
        assert_ne!(guard1.id(), guard2.id());

        drop(guard1);
        assert_eq!(registry.active_count(), 1);

        drop(guard2);
        assert_eq!(registry.active_count(), 0);

        assert_eq!(status.connections(), 2);
        assert_eq!(status.unique_addresses(), 1);
    }

    #[test]
    fn close_all_reports_leftovers() {
        let (registry, _status) = registry();
        let guard = registry.track("10.0.0.1:1000".parse().unwrap());
        let handle = registry.clone();

        assert_eq!(registry.close_all(), 1);
        assert_eq!(handle.active_count(), 0);
        drop(guard);
        assert_eq!(handle.active_count(), 0);
    }
}
