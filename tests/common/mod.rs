//! Shared utilities for integration testing.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tokio::net::TcpListener;

/// Start an echo backend on an ephemeral port.
///
/// The backend gets its own thread and runtime so the reactor under test
/// stays the only thing driving the proxy.
pub fn start_echo_backend() -> SocketAddr {
    let (addr_tx, addr_rx) = mpsc::channel();

    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            addr_tx.send(listener.local_addr().unwrap()).unwrap();

            loop {
                match listener.accept().await {
                    Ok((mut socket, _)) => {
                        tokio::spawn(async move {
                            let (mut rd, mut wr) = socket.split();
                            let _ = tokio::io::copy(&mut rd, &mut wr).await;
                        });
                    }
                    Err(_) => break,
                }
            }
        });
    });

    addr_rx.recv_timeout(Duration::from_secs(5)).unwrap()
}

/// Connect with timeouts so a broken relay fails the test instead of hanging it.
pub fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.set_write_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
}

/// Open a SOCKS 5 CONNECT to the IPv4 `target` through `proxy`.
pub fn socks5_connect(proxy: SocketAddr, target: SocketAddr) -> TcpStream {
    let SocketAddr::V4(target) = target else {
        panic!("IPv4 target expected");
    };
    let mut stream = connect(proxy);

    stream.write_all(&[5, 1, 0]).unwrap();
    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).unwrap();
    assert_eq!(choice, [5, 0]);

    let mut request = vec![5, 1, 0, 1];
    request.extend_from_slice(&target.ip().octets());
    request.extend_from_slice(&target.port().to_be_bytes());
    stream.write_all(&request).unwrap();
    let mut reply = [0u8; 10];
    stream.read_exact(&mut reply).unwrap();
    assert_eq!(reply[..2], [5, 0], "SOCKS reply");

    stream
}

/// Send `message` and expect it echoed back.
pub fn round_trip(stream: &mut TcpStream, message: &[u8]) {
    stream.write_all(message).unwrap();
    let mut buf = vec![0u8; message.len()];
    stream.read_exact(&mut buf).unwrap();
    assert_eq!(buf, message);
}
