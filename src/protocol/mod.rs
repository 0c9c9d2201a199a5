//! Transport registry.
//!
//! # Data Flow
//! ```text
//! External: ["dummy", "client", "127.0.0.1:5000", "10.0.0.9:11253"]
//!     → TransportConfig::from_args → dummy.rs
//! Managed:  ("dummy", role, bindaddr, ORPort)
//!     → TransportConfig::managed → dummy.rs
//!
//! TransportConfig → net::listener (bind + accept) → net::relay
//! ```
//!
//! # Design Decisions
//! - Listen addresses are numeric; targets may be host names and are
//!   resolved per connection
//! - Obfuscating transports plug in here; only `dummy` (no obfuscation)
//!   ships with the core

pub mod dummy;

use std::net::SocketAddr;

use thiserror::Error;

/// Names accepted as the start of an external-mode configuration.
pub const SUPPORTED_PROTOCOLS: &[&str] = &[dummy::NAME];

pub fn is_supported(name: &str) -> bool {
    SUPPORTED_PROTOCOLS.contains(&name)
}

/// Which side of the circuit a listener serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenMode {
    /// Accepts cleartext and always connects to the same target.
    SimpleClient,
    /// Accepts SOCKS requests naming an arbitrary target.
    SocksClient,
    /// Accepts transport traffic and connects to the same target.
    SimpleServer,
}

/// Role of a managed proxy, decided by the parent's environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyRole {
    Client,
    Server,
}

/// One listener's worth of transport configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub protocol: &'static str,
    pub mode: ListenMode,
    pub listen_addr: SocketAddr,
    /// `host:port` to connect to; `None` for SOCKS listeners.
    pub target: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown protocol '{0}'")]
    Unknown(String),

    #[error("invalid {protocol} configuration: {reason}\n{usage}")]
    Syntax {
        protocol: &'static str,
        reason: String,
        usage: &'static str,
    },

    #[error("invalid address '{0}'")]
    Address(String),
}

impl TransportConfig {
    /// Build a config from `[protocol, options...]` as given on the command line.
    pub fn from_args(args: &[String]) -> Result<Self, ProtocolError> {
        let (name, options) = args
            .split_first()
            .ok_or_else(|| ProtocolError::Unknown(String::new()))?;
        match name.as_str() {
            dummy::NAME => dummy::from_args(options),
            other => Err(ProtocolError::Unknown(other.to_string())),
        }
    }

    /// Build a config for a listener requested by the managing parent.
    pub fn managed(
        protocol: &str,
        role: ProxyRole,
        bindaddr: &str,
        or_port: Option<&str>,
    ) -> Result<Self, ProtocolError> {
        match protocol {
            dummy::NAME => dummy::managed(role, bindaddr, or_port),
            other => Err(ProtocolError::Unknown(other.to_string())),
        }
    }
}

/// Parse a numeric listen address, filling in `default_port` when the
/// port is missing.
pub fn parse_listen_addr(address: &str, default_port: u16) -> Result<SocketAddr, ProtocolError> {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }
    address
        .parse::<std::net::IpAddr>()
        .map(|ip| SocketAddr::new(ip, default_port))
        .map_err(|_| ProtocolError::Address(address.to_string()))
}

/// Check a `host:port` target. Host names are allowed; the port is required.
pub fn parse_target(address: &str) -> Result<String, ProtocolError> {
    if address.parse::<SocketAddr>().is_ok() {
        return Ok(address.to_string());
    }
    match address.rsplit_once(':') {
        Some((host, port))
            if !host.is_empty() && !host.contains(':') && port.parse::<u16>().is_ok() =>
        {
            Ok(address.to_string())
        }
        _ => Err(ProtocolError::Address(address.to_string())),
    }
}
