//! Asynchronous name resolution for relay targets.
//!
//! The resolver is bound to the reactor it was created for: every
//! lookup runs on that reactor's handle, whichever task asks. Results
//! are cached for the life of the process; numeric targets skip the cache.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::lookup_host;
use tokio::runtime::Handle;

use crate::observability::logging::scrub;

#[derive(Debug, Clone)]
pub struct Resolver {
    handle: Handle,
    cache: Arc<DashMap<String, Vec<SocketAddr>>>,
}

impl Resolver {
    pub fn new(handle: &Handle) -> Self {
        tracing::debug!("Resolver created");
        Self {
            handle: handle.clone(),
            cache: Arc::new(DashMap::new()),
        }
    }

    /// Resolve `host:port` to one or more socket addresses.
    pub async fn resolve(&self, target: &str) -> io::Result<Vec<SocketAddr>> {
        if let Ok(addr) = target.parse::<SocketAddr>() {
            return Ok(vec![addr]);
        }
        if let Some(cached) = self.cache.get(target) {
            return Ok(cached.clone());
        }

        let owned = target.to_string();
        let lookup = self
            .handle
            .spawn(async move { lookup_host(owned).await.map(|addrs| addrs.collect::<Vec<_>>()) });
        let addrs = lookup.await.map_err(io::Error::other)??;
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses for {}", scrub(target)),
            ));
        }
        tracing::trace!(target = %scrub(target), count = addrs.len(), "Resolved");
        self.cache.insert(target.to_string(), addrs.clone());
        Ok(addrs)
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Release the resolver. Must happen after the reactor is gone so no
    /// lookup is still in flight.
    pub fn shutdown(self) {
        self.cache.clear();
        tracing::debug!("Resolver released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::reactor::Reactor;

    #[tokio::test]
    async fn numeric_targets_bypass_cache() {
        let resolver = Resolver::new(&Handle::current());
        let addrs = resolver.resolve("127.0.0.1:9005").await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:9005".parse().unwrap()]);
        assert_eq!(resolver.cached(), 0);
    }

    #[tokio::test]
    async fn names_are_cached() {
        let resolver = Resolver::new(&Handle::current());
        let addrs = resolver.resolve("localhost:9005").await.unwrap();
        assert!(addrs.iter().all(|addr| addr.port() == 9005));
        assert_eq!(resolver.cached(), 1);

        resolver.resolve("localhost:9005").await.unwrap();
        assert_eq!(resolver.cached(), 1);
        resolver.shutdown();
    }

    #[test]
    fn lookups_run_on_the_bound_reactor() {
        let reactor = Reactor::new().unwrap();
        let resolver = Resolver::new(reactor.handle());

        // Ask from another runtime; the answer only arrives while the
        // resolver's own reactor is being driven.
        let (tx, rx) = tokio::sync::oneshot::channel();
        let asking = resolver.clone();
        let driver = std::thread::spawn(move || {
            let other = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let _ = tx.send(other.block_on(asking.resolve("localhost:9005")));
        });

        let addrs = reactor.block_on(rx).unwrap().unwrap();
        driver.join().unwrap();

        assert!(addrs.iter().all(|addr| addr.port() == 9005));
        assert_eq!(resolver.cached(), 1);
    }
}
