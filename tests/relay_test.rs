//! End-to-end tests against a running relay

mod common;

use common::socks5_mock;
use common::{greet, spawn_tcp_echo, spawn_udp_echo, start_relay};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_connect_scenario_bytes() {
    let (listener, target) = common::create_test_listener().await;
    let (relay, _shutdown) = start_relay().await;

    let mut client = TcpStream::connect(relay).await.unwrap();
    greet(&mut client).await;

    client.write_all(&socks5_mock::connect(target)).await.unwrap();
    let (mut remote, _) = listener.accept().await.unwrap();

    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);

    client.write_all(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();
    let mut request = [0u8; 18];
    remote.read_exact(&mut request).await.unwrap();
    assert_eq!(&request, b"GET / HTTP/1.0\r\n\r\n");

    remote.write_all(b"HTTP/1.0 200 OK\r\n").await.unwrap();
    let mut response = [0u8; 17];
    client.read_exact(&mut response).await.unwrap();
    assert_eq!(&response, b"HTTP/1.0 200 OK\r\n");
}

#[tokio::test]
async fn test_connect_large_transfer_in_order() {
    let echo = spawn_tcp_echo().await;
    let (relay, _shutdown) = start_relay().await;

    let mut client = TcpStream::connect(relay).await.unwrap();
    greet(&mut client).await;
    client.write_all(&socks5_mock::connect(echo)).await.unwrap();
    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 0x00);

    let data: Vec<u8> = (0..200_000u32).map(|i| (i % 253) as u8).collect();
    let (mut read_half, mut write_half) = client.into_split();
    let expected = data.clone();
    let writer = tokio::spawn(async move {
        write_half.write_all(&data).await.unwrap();
        write_half
    });

    let mut received = vec![0u8; expected.len()];
    tokio::time::timeout(TIMEOUT, read_half.read_exact(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, expected);
    let _write_half = writer.await.unwrap();
}

#[tokio::test]
async fn test_connect_by_domain() {
    let echo = common::spawn_localhost_echo().await;
    let (relay, _shutdown) = start_relay().await;

    let mut client = TcpStream::connect(relay).await.unwrap();
    greet(&mut client).await;
    client
        .write_all(&socks5_mock::connect_domain("localhost", echo.port()))
        .await
        .unwrap();

    let mut reply = [0u8; 10];
    tokio::time::timeout(TIMEOUT, client.read_exact(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply, [0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);

    client.write_all(b"hi").await.unwrap();
    let mut buf = [0u8; 2];
    tokio::time::timeout(TIMEOUT, client.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"hi");
}

#[tokio::test]
async fn test_remote_close_closes_client() {
    let (listener, target) = common::create_test_listener().await;
    let (relay, _shutdown) = start_relay().await;

    let mut client = TcpStream::connect(relay).await.unwrap();
    greet(&mut client).await;
    client.write_all(&socks5_mock::connect(target)).await.unwrap();
    let (remote, _) = listener.accept().await.unwrap();
    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();

    drop(remote);

    let mut buf = [0u8; 8];
    let n = tokio::time::timeout(TIMEOUT, client.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_socks4_greeting_is_dropped_silently() {
    let (relay, _shutdown) = start_relay().await;

    let mut client = TcpStream::connect(relay).await.unwrap();
    client.write_all(&[0x04, 0x01, 0x00]).await.unwrap();

    let mut buf = Vec::new();
    tokio::time::timeout(TIMEOUT, client.read_to_end(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert!(buf.is_empty());
}

#[tokio::test]
async fn test_unsupported_address_type_is_dropped() {
    let (relay, _shutdown) = start_relay().await;

    let mut client = TcpStream::connect(relay).await.unwrap();
    greet(&mut client).await;
    client
        .write_all(&[0x05, 0x01, 0x00, 0x05, 127, 0, 0, 1, 0, 80])
        .await
        .unwrap();

    let mut buf = Vec::new();
    tokio::time::timeout(TIMEOUT, client.read_to_end(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert!(buf.is_empty());
}

/// Run UDP ASSOCIATE and return the control stream and relay address
async fn associate(relay: SocketAddr, source: SocketAddr) -> (TcpStream, SocketAddr) {
    let mut control = TcpStream::connect(relay).await.unwrap();
    greet(&mut control).await;
    control
        .write_all(&socks5_mock::udp_associate(source))
        .await
        .unwrap();

    let mut reply = [0u8; 10];
    control.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply[..4], &[0x05, 0x00, 0x00, 0x01]);
    assert_eq!(&reply[4..8], &[127, 0, 0, 1]);
    let port = u16::from_be_bytes([reply[8], reply[9]]);
    (control, SocketAddr::new(relay.ip(), port))
}

async fn recv(socket: &UdpSocket, wait: Duration) -> Option<Vec<u8>> {
    let mut buf = [0u8; 65535];
    match tokio::time::timeout(wait, socket.recv(&mut buf)).await {
        Ok(Ok(n)) => Some(buf[..n].to_vec()),
        _ => None,
    }
}

#[tokio::test]
async fn test_udp_associate_round_trip() {
    let echo = spawn_udp_echo().await;
    let (relay, _shutdown) = start_relay().await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let (_control, relay_udp) = associate(relay, client.local_addr().unwrap()).await;

    let datagram = socks5_mock::udp_datagram(0, echo, b"dns query");
    client.send_to(&datagram, relay_udp).await.unwrap();

    let reply = recv(&client, TIMEOUT).await.unwrap();
    assert_eq!(&reply[..10], &datagram[..10]);
    assert_eq!(&reply[10..], b"dns query");
}

#[tokio::test]
async fn test_udp_wildcard_declaration() {
    let echo = spawn_udp_echo().await;
    let (relay, _shutdown) = start_relay().await;

    let (_control, relay_udp) = associate(relay, "0.0.0.0:0".parse().unwrap()).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(&socks5_mock::udp_datagram(0, echo, b"any port"), relay_udp)
        .await
        .unwrap();

    let reply = recv(&client, TIMEOUT).await.unwrap();
    assert_eq!(&reply[10..], b"any port");
}

#[tokio::test]
async fn test_udp_wrong_source_port_dropped() {
    let echo = spawn_udp_echo().await;
    let (relay, _shutdown) = start_relay().await;

    let declared = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let (_control, relay_udp) = associate(relay, declared.local_addr().unwrap()).await;

    let intruder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    intruder
        .send_to(&socks5_mock::udp_datagram(0, echo, b"nope"), relay_udp)
        .await
        .unwrap();

    assert!(recv(&intruder, Duration::from_millis(300)).await.is_none());
    assert!(recv(&declared, Duration::from_millis(50)).await.is_none());
}

#[tokio::test]
async fn test_udp_fragment_discarded_session_continues() {
    let echo = spawn_udp_echo().await;
    let (relay, _shutdown) = start_relay().await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let (_control, relay_udp) = associate(relay, client.local_addr().unwrap()).await;

    client
        .send_to(&socks5_mock::udp_datagram(1, echo, b"frag"), relay_udp)
        .await
        .unwrap();
    assert!(recv(&client, Duration::from_millis(200)).await.is_none());

    client
        .send_to(&socks5_mock::udp_datagram(0, echo, b"whole"), relay_udp)
        .await
        .unwrap();
    let reply = recv(&client, TIMEOUT).await.unwrap();
    assert_eq!(&reply[10..], b"whole");
}
