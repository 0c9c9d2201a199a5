//! Managed mode: configured by a supervising parent process.
//!
//! # Data Flow
//! ```text
//! TOR_PT_* environment → ManagedEnv::from_lookup
//!     → validate server bind addresses
//!     → version negotiation          stdout: VERSION 1 | VERSION-ERROR no-version
//!     → Lifecycle::initialize
//!     → one listener per transport   stdout: CMETHOD/SMETHOD lines, then {C,S}METHODS DONE
//!     → Lifecycle::run → teardown
//! ```
//!
//! Any environment problem is reported as `ENV-ERROR <message>` before
//! the launcher gives up.

use std::io::{self, Write};

use thiserror::Error;

use crate::launch::LaunchError;
use crate::lifecycle::{Lifecycle, LifecycleOptions};
use crate::observability::logging::{safe_logging, scrub};
use crate::protocol::{ProxyRole, TransportConfig};

/// Managed-proxy protocol versions we speak.
const SUPPORTED_VERSIONS: &[&str] = &["1"];

/// Client listeners let the OS pick the port.
const CLIENT_BINDADDR: &str = "127.0.0.1:0";

#[derive(Debug, Error)]
pub enum ManagedError {
    #[error("failed on {0}")]
    Env(&'static str),

    #[error("no supported managed-proxy protocol version")]
    NoVersion,

    #[error("could not launch any listener")]
    NoListeners,

    #[error("failed writing to the control channel: {0}")]
    ControlChannel(#[from] io::Error),
}

/// The environment the parent prepared for us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedEnv {
    pub state_location: String,
    pub transport_versions: String,
    pub role: ProxyRole,
    pub transports: String,
    pub extended_port: String,
    pub or_port: Option<String>,
    pub bindaddrs: Option<String>,
}

impl ManagedEnv {
    /// Read the environment through `lookup` (normally `std::env::var`).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ManagedError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &'static str| lookup(name).ok_or(ManagedError::Env(name));

        let state_location = require("TOR_PT_STATE_LOCATION")?;
        let transport_versions = require("TOR_PT_MANAGED_TRANSPORT_VER")?;

        if let Some(transports) = lookup("TOR_PT_CLIENT_TRANSPORTS") {
            return Ok(Self {
                state_location,
                transport_versions,
                role: ProxyRole::Client,
                transports,
                extended_port: String::new(),
                or_port: None,
                bindaddrs: None,
            });
        }

        let extended_port = lookup("TOR_PT_EXTENDED_SERVER_PORT").unwrap_or_default();
        let or_port = require("TOR_PT_ORPORT")?;
        let bindaddrs = require("TOR_PT_SERVER_BINDADDR")?;
        let transports = require("TOR_PT_SERVER_TRANSPORTS")?;

        Ok(Self {
            state_location,
            transport_versions,
            role: ProxyRole::Server,
            transports,
            extended_port,
            or_port: Some(or_port),
            bindaddrs: Some(bindaddrs),
        })
    }

    /// Check everything that can be checked before starting up.
    pub fn validate(&self) -> Result<(), ManagedError> {
        if let Some(bindaddrs) = &self.bindaddrs {
            if server_bindings(bindaddrs, &self.transports).is_none() {
                return Err(ManagedError::Env("TOR_PT_SERVER_BINDADDR"));
            }
        }
        Ok(())
    }

    /// `(transport, bind address)` for every listener to open.
    pub fn listeners(&self) -> Vec<(&str, &str)> {
        match (&self.role, &self.bindaddrs) {
            (ProxyRole::Server, Some(bindaddrs)) => server_bindings(bindaddrs, &self.transports).unwrap_or_default(),
            _ => split_list(&self.transports).map(|t| (t, CLIENT_BINDADDR)).collect(),
        }
    }
}

/// Comma-separated list, whitespace trimmed, blanks skipped.
fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Pair up `<transport>-<addr:port>` entries with the transport list.
/// Names must match one to one and in order; each address must be a
/// numeric socket address.
fn server_bindings<'a>(bindaddrs: &'a str, transports: &'a str) -> Option<Vec<(&'a str, &'a str)>> {
    let bindaddrs: Vec<&str> = split_list(bindaddrs).collect();
    let transports: Vec<&str> = split_list(transports).collect();
    if bindaddrs.len() != transports.len() {
        return None;
    }

    bindaddrs
        .into_iter()
        .zip(transports)
        .map(|(entry, transport)| {
            let parts: Vec<&str> = entry.split('-').map(str::trim).filter(|s| !s.is_empty()).collect();
            match parts.as_slice() {
                [name, addr] if *name == transport && addr.parse::<std::net::SocketAddr>().is_ok() => {
                    Some((transport, *addr))
                }
                _ => None,
            }
        })
        .collect()
}

/// Check a server bind address list against the transport list.
pub fn validate_bindaddrs(bindaddrs: &str, transports: &str) -> bool {
    server_bindings(bindaddrs, transports).is_some()
}

/// Pick the first version the parent offers that we support.
pub fn negotiate_version(offered: &str) -> Option<&str> {
    split_list(offered).find(|v| SUPPORTED_VERSIONS.contains(v))
}

/// Line-oriented writer for the managed-proxy protocol (normally stdout).
#[derive(Debug)]
pub struct ControlChannel<W: Write> {
    out: W,
}

impl<W: Write> ControlChannel<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Write one protocol line and flush it. Lines carry bridge
    /// addresses, so they are only logged with safe logging off.
    pub fn line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.out, "{line}")?;
        self.out.flush()?;
        if !safe_logging() {
            tracing::debug!("We sent: {line}");
        }
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn method_line(role: ProxyRole, transport: &str, addr: std::net::SocketAddr) -> String {
    match role {
        ProxyRole::Server => format!("SMETHOD {transport} {addr}"),
        ProxyRole::Client => format!("CMETHOD {transport} socks5 {addr}"),
    }
}

fn method_error_line(role: ProxyRole, transport: &str, reason: &str) -> String {
    match role {
        ProxyRole::Server => format!("SMETHOD-ERROR {transport} {reason}"),
        ProxyRole::Client => format!("CMETHOD-ERROR {transport} {reason}"),
    }
}

fn methods_done_line(role: ProxyRole) -> &'static str {
    match role {
        ProxyRole::Server => "SMETHODS DONE",
        ProxyRole::Client => "CMETHODS DONE",
    }
}

/// Read and validate the environment and negotiate the protocol version.
pub fn prepare<F, W>(lookup: F, channel: &mut ControlChannel<W>) -> Result<ManagedEnv, ManagedError>
where
    F: Fn(&str) -> Option<String>,
    W: Write,
{
    let env = match ManagedEnv::from_lookup(lookup).and_then(|env| env.validate().map(|()| env)) {
        Ok(env) => env,
        Err(e) => {
            channel.line(&format!("ENV-ERROR {e}"))?;
            return Err(e);
        }
    };
    tracing::debug!(
        state_location = %env.state_location,
        transports = %env.transports,
        role = ?env.role,
        "Managed proxy environment"
    );

    match negotiate_version(&env.transport_versions) {
        Some(version) => channel.line(&format!("VERSION {version}"))?,
        None => {
            channel.line("VERSION-ERROR no-version")?;
            return Err(ManagedError::NoVersion);
        }
    }
    Ok(env)
}

/// Open one listener per requested transport, reporting each on the
/// control channel. Returns how many opened.
pub fn open_listeners<W: Write>(
    lifecycle: &mut Lifecycle,
    env: &ManagedEnv,
    channel: &mut ControlChannel<W>,
) -> Result<usize, ManagedError> {
    let mut configs = Vec::new();
    for (transport, bindaddr) in env.listeners() {
        match TransportConfig::managed(transport, env.role, bindaddr, env.or_port.as_deref()) {
            Ok(config) => configs.push((transport, config)),
            Err(e) => {
                tracing::warn!(transport, error = %e, "Could not set up transport");
                channel.line(&method_error_line(env.role, transport, "could not setup protocol"))?;
            }
        }
    }

    let mut opened = 0;
    for (transport, config) in &configs {
        match lifecycle.open_listeners(config) {
            Ok(addr) => {
                opened += 1;
                channel.line(&method_line(env.role, transport, addr))?;
            }
            Err(e) => {
                tracing::warn!(transport = *transport, address = %scrub(config.listen_addr), error = %e, "Could not launch listener");
                channel.line(&method_error_line(env.role, transport, "could not launch listener"))?;
            }
        }
    }

    channel.line(methods_done_line(env.role))?;
    Ok(opened)
}

/// Run as a managed proxy, reading `lookup` and talking on `out`.
pub fn launch_with<F, W>(lookup: F, out: W, options: &LifecycleOptions) -> Result<(), LaunchError>
where
    F: Fn(&str) -> Option<String>,
    W: Write,
{
    let mut channel = ControlChannel::new(out);
    let env = prepare(lookup, &mut channel)?;

    let mut lifecycle = Lifecycle::initialize(options)?;
    let opened = match open_listeners(&mut lifecycle, &env, &mut channel) {
        Ok(opened) => opened,
        Err(e) => {
            lifecycle.teardown();
            return Err(e.into());
        }
    };
    if opened == 0 {
        lifecycle.teardown();
        return Err(ManagedError::NoListeners.into());
    }

    lifecycle.run();
    lifecycle.teardown();
    Ok(())
}

/// Run as a managed proxy configured by the process environment.
pub fn launch(options: &LifecycleOptions) -> Result<(), LaunchError> {
    launch_with(|name| std::env::var(name).ok(), io::stdout(), options)
}
