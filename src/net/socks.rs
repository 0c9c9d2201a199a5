//! SOCKS front end for client-side listeners.
//!
//! # Responsibilities
//! - Speak the server half of SOCKS 4, 4a and 5 (no authentication)
//! - Accept CONNECT only; anything else gets a failure reply
//! - Connect to the requested target through the resolver, reply, relay
//!
//! # Data Flow
//! ```text
//! accepted stream → handshake (version byte selects 4/4a or 5)
//!     → SocksRequest { version, target "host:port" }
//!     → relay::connect(target) → reply (success with bound address | failure)
//!     → relay::pump
//! ```

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::net::connection::ConnectionGuard;
use crate::net::relay;
use crate::net::resolver::Resolver;
use crate::observability::logging::scrub;

const SOCKS4_VERSION: u8 = 0x04;
const SOCKS5_VERSION: u8 = 0x05;

const CMD_CONNECT: u8 = 0x01;

const SOCKS4_GRANTED: u8 = 0x5A;
const SOCKS4_REJECTED: u8 = 0x5B;

const SOCKS5_METHOD_NOAUTH: u8 = 0x00;
const SOCKS5_METHOD_NONE_ACCEPTABLE: u8 = 0xFF;

const SOCKS5_ATYP_IPV4: u8 = 0x01;
const SOCKS5_ATYP_FQDN: u8 = 0x03;
const SOCKS5_ATYP_IPV6: u8 = 0x04;

const SOCKS5_SUCCEEDED: u8 = 0x00;
const SOCKS5_GENERAL_FAILURE: u8 = 0x01;
const SOCKS5_REFUSED: u8 = 0x05;
const SOCKS5_COMMAND_UNSUPPORTED: u8 = 0x07;
const SOCKS5_ADDRESS_UNSUPPORTED: u8 = 0x08;

/// Upper bound for the SOCKS 4 user id and the 4a hostname.
const MAX_FIELD_LEN: usize = 255;

#[derive(Debug, Error)]
pub enum SocksError {
    #[error("socks I/O: {0}")]
    Io(#[from] io::Error),

    #[error("unsupported SOCKS version {0:#04x}")]
    Version(u8),

    #[error("client offered no acceptable authentication method")]
    NoAcceptableMethod,

    #[error("unsupported SOCKS command {0:#04x}")]
    Command(u8),

    #[error("unsupported SOCKS address type {0:#04x}")]
    AddressType(u8),

    #[error("malformed SOCKS request")]
    Malformed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksVersion {
    V4,
    V5,
}

/// A parsed CONNECT request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocksRequest {
    pub version: SocksVersion,
    /// `host:port`, ready for the resolver.
    pub target: String,
}

/// Read a CONNECT request. Protocol-level refusals are answered on
/// `stream` before the error is returned.
pub async fn handshake<S>(stream: &mut S) -> Result<SocksRequest, SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match stream.read_u8().await? {
        SOCKS5_VERSION => handshake_v5(stream).await,
        SOCKS4_VERSION => handshake_v4(stream).await,
        other => Err(SocksError::Version(other)),
    }
}

async fn handshake_v5<S>(stream: &mut S) -> Result<SocksRequest, SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let n_methods = stream.read_u8().await? as usize;
    let mut methods = vec![0u8; n_methods];
    stream.read_exact(&mut methods).await?;
    if !methods.contains(&SOCKS5_METHOD_NOAUTH) {
        stream.write_all(&[SOCKS5_VERSION, SOCKS5_METHOD_NONE_ACCEPTABLE]).await?;
        return Err(SocksError::NoAcceptableMethod);
    }
    stream.write_all(&[SOCKS5_VERSION, SOCKS5_METHOD_NOAUTH]).await?;

    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    let [version, command, reserved, atyp] = header;
    if version != SOCKS5_VERSION || reserved != 0 {
        return Err(SocksError::Malformed);
    }
    if command != CMD_CONNECT {
        write_v5_reply(stream, SOCKS5_COMMAND_UNSUPPORTED, None).await?;
        return Err(SocksError::Command(command));
    }

    let host = match atyp {
        SOCKS5_ATYP_IPV4 => {
            let mut octets = [0u8; 4];
            stream.read_exact(&mut octets).await?;
            Host::Ip(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        SOCKS5_ATYP_IPV6 => {
            let mut octets = [0u8; 16];
            stream.read_exact(&mut octets).await?;
            Host::Ip(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        SOCKS5_ATYP_FQDN => {
            let len = stream.read_u8().await? as usize;
            let mut name = vec![0u8; len];
            stream.read_exact(&mut name).await?;
            Host::Name(String::from_utf8(name).map_err(|_| SocksError::Malformed)?)
        }
        other => {
            write_v5_reply(stream, SOCKS5_ADDRESS_UNSUPPORTED, None).await?;
            return Err(SocksError::AddressType(other));
        }
    };
    let port = stream.read_u16().await?;

    Ok(SocksRequest {
        version: SocksVersion::V5,
        target: host.with_port(port),
    })
}

async fn handshake_v4<S>(stream: &mut S) -> Result<SocksRequest, SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let command = stream.read_u8().await?;
    let port = stream.read_u16().await?;
    let mut octets = [0u8; 4];
    stream.read_exact(&mut octets).await?;
    let _user_id = read_nul_terminated(stream).await?;

    // 0.0.0.x with x != 0 marks a 4a request: the hostname follows.
    let host = if octets[..3] == [0, 0, 0] && octets[3] != 0 {
        let name = read_nul_terminated(stream).await?;
        Host::Name(String::from_utf8(name).map_err(|_| SocksError::Malformed)?)
    } else {
        Host::Ip(IpAddr::V4(Ipv4Addr::from(octets)))
    };

    if command != CMD_CONNECT {
        write_v4_reply(stream, SOCKS4_REJECTED, None).await?;
        return Err(SocksError::Command(command));
    }

    Ok(SocksRequest {
        version: SocksVersion::V4,
        target: host.with_port(port),
    })
}

enum Host {
    Ip(IpAddr),
    Name(String),
}

impl Host {
    fn with_port(self, port: u16) -> String {
        match self {
            Host::Ip(ip) => SocketAddr::new(ip, port).to_string(),
            Host::Name(name) => format!("{name}:{port}"),
        }
    }
}

async fn read_nul_terminated<S>(stream: &mut S) -> Result<Vec<u8>, SocksError>
where
    S: AsyncRead + Unpin,
{
    let mut field = Vec::new();
    loop {
        match stream.read_u8().await? {
            0 => return Ok(field),
            _ if field.len() == MAX_FIELD_LEN => return Err(SocksError::Malformed),
            byte => field.push(byte),
        }
    }
}

/// Tell the client the connection is up, naming our outbound address.
pub async fn reply_success<S>(stream: &mut S, version: SocksVersion, bound: SocketAddr) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    match version {
        SocksVersion::V5 => write_v5_reply(stream, SOCKS5_SUCCEEDED, Some(bound)).await,
        SocksVersion::V4 => write_v4_reply(stream, SOCKS4_GRANTED, Some(bound)).await,
    }
}

/// Tell the client the connection to its target failed.
pub async fn reply_failure<S>(stream: &mut S, version: SocksVersion, error: &io::Error) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    match version {
        SocksVersion::V5 => {
            let code = match error.kind() {
                io::ErrorKind::ConnectionRefused => SOCKS5_REFUSED,
                _ => SOCKS5_GENERAL_FAILURE,
            };
            write_v5_reply(stream, code, None).await
        }
        SocksVersion::V4 => write_v4_reply(stream, SOCKS4_REJECTED, None).await,
    }
}

async fn write_v5_reply<S>(stream: &mut S, code: u8, bound: Option<SocketAddr>) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let bound = bound.unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0));
    let mut reply = vec![SOCKS5_VERSION, code, 0x00];
    match bound.ip() {
        IpAddr::V4(ip) => {
            reply.push(SOCKS5_ATYP_IPV4);
            reply.extend_from_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            reply.push(SOCKS5_ATYP_IPV6);
            reply.extend_from_slice(&ip.octets());
        }
    }
    reply.extend_from_slice(&bound.port().to_be_bytes());
    stream.write_all(&reply).await?;
    stream.flush().await
}

async fn write_v4_reply<S>(stream: &mut S, code: u8, bound: Option<SocketAddr>) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let (ip, port) = match bound {
        Some(SocketAddr::V4(addr)) => (addr.ip().octets(), addr.port()),
        _ => ([0; 4], 0),
    };
    let mut reply = [0u8; 8];
    reply[1] = code;
    reply[2..4].copy_from_slice(&port.to_be_bytes());
    reply[4..].copy_from_slice(&ip);
    stream.write_all(&reply).await?;
    stream.flush().await
}

/// Serve one SOCKS client: handshake, connect, reply, relay.
pub async fn serve(mut inbound: TcpStream, resolver: Resolver, guard: ConnectionGuard) {
    let id = guard.id();

    let request = match handshake(&mut inbound).await {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(connection_id = %id, error = %e, "SOCKS handshake failed");
            return;
        }
    };

    let mut outbound = match relay::connect(&request.target, &resolver).await {
        Ok(outbound) => outbound,
        Err(e) => {
            tracing::debug!(
                connection_id = %id,
                target = %scrub(&request.target),
                error = %e,
                "SOCKS connect failed"
            );
            let _ = reply_failure(&mut inbound, request.version, &e).await;
            return;
        }
    };

    let bound = outbound
        .local_addr()
        .unwrap_or_else(|_| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0));
    if let Err(e) = reply_success(&mut inbound, request.version, bound).await {
        tracing::debug!(connection_id = %id, error = %e, "SOCKS reply failed");
        return;
    }

    relay::pump(&mut inbound, &mut outbound, id).await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::io::duplex;
    use tokio::net::TcpListener;
    use tokio::runtime::Handle;

    use super::*;
    use crate::net::connection::ConnectionRegistry;
    use crate::observability::status::StatusBoard;

    #[tokio::test]
    async fn socks5_connect_by_name() {
        let (mut client, mut server) = duplex(256);
        let parse = tokio::spawn(async move { handshake(&mut server).await });

        client.write_all(&[5, 1, 0]).await.unwrap();
        let mut choice = [0u8; 2];
        client.read_exact(&mut choice).await.unwrap();
        assert_eq!(choice, [5, 0]);

        let mut request = vec![5, 1, 0, 3, 11];
        request.extend_from_slice(b"example.org");
        request.extend_from_slice(&443u16.to_be_bytes());
        client.write_all(&request).await.unwrap();

        let request = parse.await.unwrap().unwrap();
        assert_eq!(request.version, SocksVersion::V5);
        assert_eq!(request.target, "example.org:443");
    }

    #[tokio::test]
    async fn socks5_ipv6_target() {
        let (mut client, mut server) = duplex(256);
        let parse = tokio::spawn(async move { handshake(&mut server).await });

        client.write_all(&[5, 1, 0]).await.unwrap();
        let mut choice = [0u8; 2];
        client.read_exact(&mut choice).await.unwrap();

        let mut request = vec![5, 1, 0, 4];
        request.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        request.extend_from_slice(&80u16.to_be_bytes());
        client.write_all(&request).await.unwrap();

        assert_eq!(parse.await.unwrap().unwrap().target, "[::1]:80");
    }

    #[tokio::test]
    async fn socks5_requires_noauth() {
        let (mut client, mut server) = duplex(256);
        let parse = tokio::spawn(async move { handshake(&mut server).await });

        client.write_all(&[5, 1, 2]).await.unwrap();
        let mut choice = [0u8; 2];
        client.read_exact(&mut choice).await.unwrap();

        assert_eq!(choice, [5, 0xFF]);
        assert!(matches!(parse.await.unwrap(), Err(SocksError::NoAcceptableMethod)));
    }

    #[tokio::test]
    async fn socks5_bind_is_refused() {
        let (mut client, mut server) = duplex(256);
        let parse = tokio::spawn(async move { handshake(&mut server).await });

        client.write_all(&[5, 1, 0]).await.unwrap();
        let mut choice = [0u8; 2];
        client.read_exact(&mut choice).await.unwrap();
        client.write_all(&[5, 2, 0, 1, 127, 0, 0, 1, 0, 80]).await.unwrap();

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[1], SOCKS5_COMMAND_UNSUPPORTED);
        assert!(matches!(parse.await.unwrap(), Err(SocksError::Command(2))));
    }

    #[tokio::test]
    async fn socks4_and_4a_requests() {
        let (mut client, mut server) = duplex(256);
        client.write_all(&[4, 1, 0x1F, 0x90, 10, 0, 0, 1, b'u', 0]).await.unwrap();
        let request = handshake(&mut server).await.unwrap();
        assert_eq!(request.version, SocksVersion::V4);
        assert_eq!(request.target, "10.0.0.1:8080");

        let mut request = vec![4, 1, 0x01, 0xBB, 0, 0, 0, 1, 0];
        request.extend_from_slice(b"bridge.example.org\0");
        client.write_all(&request).await.unwrap();
        assert_eq!(handshake(&mut server).await.unwrap().target, "bridge.example.org:443");
    }

    #[tokio::test]
    async fn unknown_version_is_rejected() {
        let (mut client, mut server) = duplex(16);
        client.write_all(&[0x47]).await.unwrap();
        assert!(matches!(handshake(&mut server).await, Err(SocksError::Version(0x47))));
    }

    #[tokio::test]
    async fn socks4_reply_layout() {
        let (mut client, mut server) = duplex(16);
        reply_success(&mut server, SocksVersion::V4, "10.0.0.1:8080".parse().unwrap())
            .await
            .unwrap();
        let mut reply = [0u8; 8];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0, 0x5A, 0x1F, 0x90, 10, 0, 0, 1]);
    }

    #[tokio::test]
    async fn serve_relays_after_connect() {
        let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend_addr = backend.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = backend.accept().await.unwrap();
            let (mut rd, mut wr) = stream.split();
            let _ = tokio::io::copy(&mut rd, &mut wr).await;
        });

        let front = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let registry = ConnectionRegistry::new(Arc::new(StatusBoard::new()));
        let mut client = TcpStream::connect(front.local_addr().unwrap()).await.unwrap();
        let (inbound, peer) = front.accept().await.unwrap();
        let session = tokio::spawn(serve(inbound, Resolver::new(&Handle::current()), registry.track(peer)));

        client.write_all(&[5, 1, 0]).await.unwrap();
        let mut choice = [0u8; 2];
        client.read_exact(&mut choice).await.unwrap();

        let mut request = vec![5, 1, 0, 1, 127, 0, 0, 1];
        request.extend_from_slice(&backend_addr.port().to_be_bytes());
        client.write_all(&request).await.unwrap();
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[..2], [5, SOCKS5_SUCCEEDED]);

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        drop(client);
        session.await.unwrap();
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn serve_reports_refused_target() {
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let front = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let registry = ConnectionRegistry::new(Arc::new(StatusBoard::new()));
        let mut client = TcpStream::connect(front.local_addr().unwrap()).await.unwrap();
        let (inbound, peer) = front.accept().await.unwrap();
        let session = tokio::spawn(serve(inbound, Resolver::new(&Handle::current()), registry.track(peer)));

        let mut request = vec![4, 1];
        request.extend_from_slice(&closed.port().to_be_bytes());
        request.extend_from_slice(&[127, 0, 0, 1, 0]);
        client.write_all(&request).await.unwrap();

        let mut reply = [0u8; 8];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[1], SOCKS4_REJECTED);
        session.await.unwrap();
    }
}
