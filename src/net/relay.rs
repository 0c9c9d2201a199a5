//! Byte relay between an accepted connection and its target.

use std::io;

use tokio::io::copy_bidirectional;
use tokio::net::TcpStream;

use crate::net::connection::{ConnectionGuard, ConnectionId};
use crate::net::resolver::Resolver;
use crate::observability::logging::scrub;

/// Connect to `target` and shuttle bytes until either side closes.
///
/// `guard` is held for the whole relay so the connection stays
/// registered until both directions are done.
pub async fn relay(mut inbound: TcpStream, target: String, resolver: Resolver, guard: ConnectionGuard) {
    let id = guard.id();
    match connect(&target, &resolver).await {
        Ok(mut outbound) => pump(&mut inbound, &mut outbound, id).await,
        Err(e) => {
            tracing::debug!(
                connection_id = %id,
                target = %scrub(&target),
                error = %e,
                "Relay failed"
            );
        }
    }
}

/// Copy both ways until either side closes.
pub(crate) async fn pump(inbound: &mut TcpStream, outbound: &mut TcpStream, id: ConnectionId) {
    match copy_bidirectional(inbound, outbound).await {
        Ok((sent, received)) => {
            tracing::debug!(connection_id = %id, sent, received, "Relay finished");
        }
        Err(e) => {
            tracing::debug!(connection_id = %id, error = %e, "Relay aborted");
        }
    }
}

/// Try each resolved address in turn.
pub(crate) async fn connect(target: &str, resolver: &Resolver) -> io::Result<TcpStream> {
    let mut last_error = None;
    for addr in resolver.resolve(target).await? {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address to connect to")))
}
