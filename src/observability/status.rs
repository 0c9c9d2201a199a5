//! Status counters reported by the heartbeat.
//!
//! # Responsibilities
//! - Count connections and unique peer addresses since the last reset
//! - Report uptime and connection stats on each heartbeat
//! - Reset the counters once a day

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashSet;
use tokio::time::Instant;

use crate::lifecycle::heartbeat::HeartbeatReporter;
use crate::observability::metrics;

/// Connection counters are reset this often.
pub const COUNTER_RESET_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// One heartbeat's worth of status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub uptime_days: u64,
    pub uptime_hours: u64,
    pub uptime_minutes: u64,
    /// Hours since the counters were last reset.
    pub window_hours: u64,
    pub connections: u64,
    pub unique_addresses: usize,
}

/// Process-wide status counters.
///
/// Uses `tokio::time::Instant` so a paused test clock drives uptime.
#[derive(Debug)]
pub struct StatusBoard {
    started: Instant,
    /// Seconds after `started` at which counters were last reset.
    last_reset_secs: AtomicU64,
    connections: AtomicU64,
    addresses: DashSet<IpAddr>,
    heartbeats: AtomicU64,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            last_reset_secs: AtomicU64::new(0),
            connections: AtomicU64::new(0),
            addresses: DashSet::new(),
            heartbeats: AtomicU64::new(0),
        }
    }

    /// Note that we saw a new connection from `peer`.
    pub fn note_connection(&self, peer: SocketAddr) {
        self.addresses.insert(peer.ip());
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn unique_addresses(&self) -> usize {
        self.addresses.len()
    }

    pub fn heartbeats(&self) -> u64 {
        self.heartbeats.load(Ordering::Relaxed)
    }

    /// Build the report for the current instant, resetting the counters
    /// if a full reset period has passed.
    pub fn heartbeat(&self) -> HeartbeatReport {
        let uptime = self.started.elapsed().as_secs();
        let last_reset = self.last_reset_secs.load(Ordering::Relaxed);
        let report = HeartbeatReport {
            uptime_days: uptime / 86_400,
            uptime_hours: (uptime % 86_400) / 3_600,
            uptime_minutes: (uptime % 3_600) / 60,
            window_hours: uptime.saturating_sub(last_reset) / 3_600,
            connections: self.connections(),
            unique_addresses: self.unique_addresses(),
        };

        if uptime.saturating_sub(last_reset) >= COUNTER_RESET_PERIOD.as_secs() {
            tracing::debug!("Resetting connection counters");
            self.reset_counters();
            self.last_reset_secs
                .store(last_reset + COUNTER_RESET_PERIOD.as_secs(), Ordering::Relaxed);
        }

        self.heartbeats.fetch_add(1, Ordering::Relaxed);
        report
    }

    /// Log the heartbeat report.
    pub fn log_heartbeat(&self) {
        let report = self.heartbeat();
        tracing::info!(
            "Heartbeat: uptime is {} day(s), {} hour(s), and {} minute(s).",
            report.uptime_days,
            report.uptime_hours,
            report.uptime_minutes
        );
        if report.unique_addresses > 0 {
            tracing::info!(
                "Heartbeat: During the last {} hour(s) we saw {} connection(s) from {} unique address(es).",
                report.window_hours,
                report.connections,
                report.unique_addresses
            );
        }
        metrics::record_heartbeat();
    }

    /// Drop all connection counters. Called at teardown.
    pub fn clear(&self) {
        self.reset_counters();
    }

    fn reset_counters(&self) {
        self.connections.store(0, Ordering::Relaxed);
        self.addresses.clear();
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatReporter for std::sync::Arc<StatusBoard> {
    fn report(&mut self) {
        self.log_heartbeat();
    }
}
