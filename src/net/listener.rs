//! Transport listeners.
//!
//! # Responsibilities
//! - Bind the configured listen address on the reactor
//! - Accept incoming TCP connections and spawn a tracked relay for each
//! - Front SOCKS client listeners with the SOCKS handshake
//! - Close every listener on the first shutdown signal (idempotent)
//! - Ride out transient accept errors without dropping the listener

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::lifecycle::reactor::{Reactor, WorkSpawner};
use crate::net::connection::ConnectionRegistry;
use crate::net::relay::relay;
use crate::net::resolver::Resolver;
use crate::net::socks;
use crate::observability::logging::scrub;
use crate::observability::metrics;
use crate::protocol::{ListenMode, TransportConfig};

/// Back-off after a failed accept (e.g. out of file descriptors).
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug)]
struct OpenListener {
    local_addr: SocketAddr,
    protocol: &'static str,
    task: JoinHandle<()>,
}

/// Every listener the proxy has opened.
#[derive(Debug)]
pub struct ListenerRegistry {
    listeners: Vec<OpenListener>,
    connections: ConnectionRegistry,
    resolver: Resolver,
}

impl ListenerRegistry {
    pub fn new(connections: ConnectionRegistry, resolver: Resolver) -> Self {
        Self {
            listeners: Vec::new(),
            connections,
            resolver,
        }
    }

    /// Bind `config.listen_addr` and start accepting. Returns the bound
    /// address (useful when the port was 0).
    pub fn open(&mut self, reactor: &Reactor, config: &TransportConfig) -> Result<SocketAddr, ListenerError> {
        // SOCKS clients name their own target.
        let target = match (config.mode, &config.target) {
            (ListenMode::SocksClient, _) => None,
            (_, Some(target)) => Some(target.clone()),
            (_, None) => {
                return Err(ListenerError::Bind {
                    addr: config.listen_addr,
                    source: io::Error::new(io::ErrorKind::InvalidInput, "listener has no target"),
                })
            }
        };

        let bind_error = |source| ListenerError::Bind {
            addr: config.listen_addr,
            source,
        };
        let std_listener = std::net::TcpListener::bind(config.listen_addr).map_err(bind_error)?;
        std_listener.set_nonblocking(true).map_err(bind_error)?;
        let local_addr = std_listener.local_addr().map_err(bind_error)?;

        let listener = {
            let _enter = reactor.handle().enter();
            TcpListener::from_std(std_listener).map_err(bind_error)?
        };

        let task = reactor.handle().spawn(accept_loop(
            listener,
            target,
            reactor.spawner(),
            self.connections.clone(),
            self.resolver.clone(),
        ));

        tracing::info!(
            address = %scrub(local_addr),
            protocol = config.protocol,
            mode = ?config.mode,
            "Listening"
        );
        metrics::record_listener_opened(config.protocol);

        self.listeners.push(OpenListener {
            local_addr,
            protocol: config.protocol,
            task,
        });
        Ok(local_addr)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.iter().map(|l| l.local_addr).collect()
    }

    /// Stop accepting on every listener. Connections already accepted
    /// are left alone. Calling this again is a no-op.
    pub fn close_all(&mut self) {
        if self.listeners.is_empty() {
            return;
        }
        for listener in self.listeners.drain(..) {
            listener.task.abort();
            tracing::debug!(
                address = %scrub(listener.local_addr),
                protocol = listener.protocol,
                "Listener closed"
            );
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    target: Option<String>,
    spawner: WorkSpawner,
    connections: ConnectionRegistry,
    resolver: Resolver,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let guard = connections.track(peer);
                match &target {
                    Some(target) => spawner.spawn(relay(stream, target.clone(), resolver.clone(), guard)),
                    None => spawner.spawn(socks::serve(stream, resolver.clone(), guard)),
                };
            }
            Err(e) => {
                tracing::warn!(error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}
