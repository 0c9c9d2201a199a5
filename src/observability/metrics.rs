//! Metrics collection.
//!
//! # Metrics
//! - `ptproxy_connections_total` (counter): accepted inbound connections
//! - `ptproxy_listeners_opened_total` (counter): listeners bound, by protocol
//! - `ptproxy_heartbeats_total` (counter): heartbeat firings
//! - `ptproxy_signals_total` (counter): shutdown signals handled, by signal
//!
//! No exporter is installed here; without a recorder these are no-ops.

use metrics::counter;

use crate::lifecycle::signals::SignalKind;

pub fn record_connection() {
    counter!("ptproxy_connections_total").increment(1);
}

pub fn record_listener_opened(protocol: &'static str) {
    counter!("ptproxy_listeners_opened_total", "protocol" => protocol).increment(1);
}

pub fn record_heartbeat() {
    counter!("ptproxy_heartbeats_total").increment(1);
}

pub fn record_signal(kind: SignalKind) {
    counter!("ptproxy_signals_total", "signal" => kind.as_str()).increment(1);
}
