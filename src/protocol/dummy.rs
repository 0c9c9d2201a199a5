//! The `dummy` transport: relays traffic unmodified. Testing only.

use crate::protocol::{parse_listen_addr, parse_target, ListenMode, ProtocolError, ProxyRole, TransportConfig};

pub const NAME: &str = "dummy";

const CLIENT_PORT: u16 = 48988;
const SOCKS_PORT: u16 = 23548;
const SERVER_PORT: u16 = 11253;

const USAGE: &str = "dummy syntax:\n\
    \tdummy <mode> <listen_address> [<target_address>]\n\
    \t\tmode ~ server|client|socks\n\
    \t\tlisten_address, target_address ~ host:port\n\
    \ttarget_address is required for server and client mode,\n\
    \tand forbidden for socks mode.\n\
    Examples:\n\
    \tptproxy dummy socks 127.0.0.1:5000\n\
    \tptproxy dummy client 127.0.0.1:5000 192.168.1.99:11253\n\
    \tptproxy dummy server 192.168.1.99:11253 127.0.0.1:9005";

fn syntax(reason: impl Into<String>) -> ProtocolError {
    ProtocolError::Syntax {
        protocol: NAME,
        reason: reason.into(),
        usage: USAGE,
    }
}

/// Parse `<mode> <listen_address> [<target_address>]`.
pub fn from_args(options: &[String]) -> Result<TransportConfig, ProtocolError> {
    let (mode_name, rest) = options
        .split_first()
        .ok_or_else(|| syntax("missing mode"))?;

    let (mode, default_port) = match mode_name.as_str() {
        "client" => (ListenMode::SimpleClient, CLIENT_PORT),
        "socks" => (ListenMode::SocksClient, SOCKS_PORT),
        "server" => (ListenMode::SimpleServer, SERVER_PORT),
        other => return Err(syntax(format!("unknown mode '{other}'"))),
    };

    let expected = if mode == ListenMode::SocksClient { 1 } else { 2 };
    if rest.len() != expected {
        return Err(syntax(format!(
            "{mode_name} mode takes {expected} address(es), got {}",
            rest.len()
        )));
    }

    let listen_addr = parse_listen_addr(&rest[0], default_port)?;
    let target = match rest.get(1) {
        Some(target) => Some(parse_target(target)?),
        None => None,
    };

    Ok(TransportConfig {
        protocol: NAME,
        mode,
        listen_addr,
        target,
    })
}

/// Managed servers relay to the parent's ORPort; managed clients speak SOCKS.
pub fn managed(role: ProxyRole, bindaddr: &str, or_port: Option<&str>) -> Result<TransportConfig, ProtocolError> {
    match role {
        ProxyRole::Server => {
            let or_port = or_port.ok_or_else(|| syntax("managed server needs an ORPort"))?;
            Ok(TransportConfig {
                protocol: NAME,
                mode: ListenMode::SimpleServer,
                listen_addr: parse_listen_addr(bindaddr, SERVER_PORT)?,
                target: Some(parse_target(or_port)?),
            })
        }
        ProxyRole::Client => Ok(TransportConfig {
            protocol: NAME,
            mode: ListenMode::SocksClient,
            listen_addr: parse_listen_addr(bindaddr, SOCKS_PORT)?,
            target: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn client_mode() {
        let config = from_args(&args(&["client", "127.0.0.1:5000", "192.168.1.99:11253"])).unwrap();
        assert_eq!(config.mode, ListenMode::SimpleClient);
        assert_eq!(config.listen_addr, "127.0.0.1:5000".parse().unwrap());
        assert_eq!(config.target.as_deref(), Some("192.168.1.99:11253"));
    }

    #[test]
    fn server_mode_default_port() {
        let config = from_args(&args(&["server", "0.0.0.0", "127.0.0.1:9005"])).unwrap();
        assert_eq!(config.mode, ListenMode::SimpleServer);
        assert_eq!(config.listen_addr.port(), SERVER_PORT);
    }

    #[test]
    fn socks_mode_forbids_target() {
        let config = from_args(&args(&["socks", "127.0.0.1"])).unwrap();
        assert_eq!(config.mode, ListenMode::SocksClient);
        assert_eq!(config.listen_addr.port(), SOCKS_PORT);
        assert_eq!(config.target, None);

        assert!(from_args(&args(&["socks", "127.0.0.1:5000", "10.0.0.1:80"])).is_err());
    }

    #[test]
    fn client_mode_requires_target() {
        let err = from_args(&args(&["client", "127.0.0.1:5000"])).unwrap_err();
        assert!(matches!(err, ProtocolError::Syntax { .. }));
        assert!(err.to_string().contains("dummy <mode>"));
    }

    #[test]
    fn unknown_mode() {
        assert!(from_args(&args(&["relay", "127.0.0.1:5000", "10.0.0.1:80"])).is_err());
        assert!(from_args(&[]).is_err());
    }

    #[test]
    fn managed_configs() {
        let server = managed(ProxyRole::Server, "0.0.0.0:4000", Some("127.0.0.1:9001")).unwrap();
        assert_eq!(server.mode, ListenMode::SimpleServer);
        assert_eq!(server.target.as_deref(), Some("127.0.0.1:9001"));
        assert!(managed(ProxyRole::Server, "0.0.0.0:4000", None).is_err());

        let client = managed(ProxyRole::Client, "127.0.0.1:0", None).unwrap();
        assert_eq!(client.mode, ListenMode::SocksClient);
        assert_eq!(client.listen_addr.port(), 0);
    }
}
