//! Test utilities for Spleen integration tests

#![allow(dead_code)]

use spleen::config::{parse_config, Config};
use spleen::Server;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::broadcast;

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Relay configuration bound to an ephemeral loopback port
pub fn test_config() -> Config {
    parse_config(
        r#"
[server]
local_ip = "127.0.0.1"
local_port = 0

[server.relay]
udp_reply_timeout = 5
"#,
    )
    .unwrap()
}

/// Start a relay; keep the sender alive for as long as the relay should run
pub async fn start_relay() -> (SocketAddr, broadcast::Sender<bool>) {
    let server = Server::bind(&test_config()).await.unwrap();
    let addr = server.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(server.run(shutdown_rx));
    (addr, shutdown_tx)
}

/// Spawn a TCP echo server
pub async fn spawn_tcp_echo() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    serve_echo(listener);
    addr
}

/// Spawn a TCP echo server on the address `localhost` resolves to first
pub async fn spawn_localhost_echo() -> SocketAddr {
    let ip = tokio::net::lookup_host(("localhost", 0))
        .await
        .unwrap()
        .next()
        .unwrap()
        .ip();
    let listener = TcpListener::bind((ip, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    serve_echo(listener);
    addr
}

fn serve_echo(listener: TcpListener) {
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut r, mut w) = stream.split();
                let _ = tokio::io::copy(&mut r, &mut w).await;
            });
        }
    });
}

/// Spawn a UDP echo server
pub async fn spawn_udp_echo() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 65535];
        while let Ok((len, from)) = socket.recv_from(&mut buf).await {
            let _ = socket.send_to(&buf[..len], from).await;
        }
    });
    addr
}

/// Send the no-auth greeting and check the method selection
pub async fn greet(stream: &mut TcpStream) {
    stream.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x00]);
}

/// Mock SOCKS5 request frames
pub mod socks5_mock {
    use spleen::socks::*;
    use std::net::{IpAddr, SocketAddr};

    fn request(command: u8, addr: SocketAddr) -> Vec<u8> {
        let mut cmd = vec![SOCKS5_VERSION, command, SOCKS5_RESERVED];
        match addr.ip() {
            IpAddr::V4(ip) => {
                cmd.push(SOCKS5_ADDR_TYPE_IPV4);
                cmd.extend_from_slice(&ip.octets());
            }
            IpAddr::V6(ip) => {
                cmd.push(SOCKS5_ADDR_TYPE_IPV6);
                cmd.extend_from_slice(&ip.octets());
            }
        }
        cmd.extend_from_slice(&addr.port().to_be_bytes());
        cmd
    }

    /// CONNECT to an IP address
    pub fn connect(addr: SocketAddr) -> Vec<u8> {
        request(SOCKS5_CMD_TCP_CONNECT, addr)
    }

    /// CONNECT to a domain name
    pub fn connect_domain(domain: &str, port: u16) -> Vec<u8> {
        let mut cmd = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_DOMAIN,
            domain.len() as u8,
        ];
        cmd.extend_from_slice(domain.as_bytes());
        cmd.extend_from_slice(&port.to_be_bytes());
        cmd
    }

    /// UDP ASSOCIATE declaring the client's UDP source
    pub fn udp_associate(source: SocketAddr) -> Vec<u8> {
        request(SOCKS5_CMD_UDP_ASSOCIATE, source)
    }

    /// SOCKS5 UDP datagram addressed to `target`
    pub fn udp_datagram(frag: u8, target: SocketAddr, data: &[u8]) -> Vec<u8> {
        let mut datagram = vec![0x00, 0x00, frag];
        let addr = request(0, target);
        datagram.extend_from_slice(&addr[3..]);
        datagram.extend_from_slice(data);
        datagram
    }
}
