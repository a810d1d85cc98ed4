//! SOCKS5 handshake negotiation
//!
//! Drives the two-round handshake on a client connection:
//!
//! 1. Greeting: `[VER][NMETHODS][METHODS...]`, answered with `[0x05, 0x00]`
//! 2. Request: `[VER][CMD][RSV][ATYP][DST.ADDR][DST.PORT]`
//!
//! Each round is a single read of whatever the client has sent. CONNECT
//! yields the resolved destination without replying; the caller replies
//! once the outbound leg is up. UDP ASSOCIATE binds a relay socket, replies
//! with its address and hands the association off to a background task.

use super::codec::{decode_address, decode_trailing_port, encode_bind_reply, GREETING_REPLY};
use super::consts::*;
use super::types::{DestinationAddr, Host, RelayContext, SocksCommand};
use super::udp::{bind_relay_socket, ClientIdentity, UdpRelaySession};
use crate::error::Socks5Error;
use std::net::{IpAddr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A parsed SOCKS5 request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Requested command
    pub command: SocksCommand,
    /// Requested destination, not yet resolved
    pub destination: DestinationAddr,
}

/// Outcome of a successful handshake
#[derive(Debug)]
pub enum Negotiated {
    /// CONNECT accepted; dial this address, then send the success reply
    Connect(SocketAddr),
    /// UDP ASSOCIATE accepted and handed off to a relay task
    UdpAssociated(UdpAssociation),
}

/// A running UDP association spawned by the handshake
#[derive(Debug)]
pub struct UdpAssociation {
    /// Address of the bound relay socket
    pub local_addr: SocketAddr,
    /// The client allowed to use the relay
    pub client: ClientIdentity,
    /// Relay task; ends when its socket fails or it is aborted
    pub task: JoinHandle<Result<(), Socks5Error>>,
}

/// Run the greeting and request rounds on `stream`.
///
/// `peer` is the client's TCP address, used to authorise UDP datagrams when
/// the request does not name a concrete source IP.
pub async fn negotiate<S>(
    stream: &mut S,
    peer: SocketAddr,
    ctx: &RelayContext,
) -> Result<Negotiated, Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; BUFFER_SIZE];

    let n = read_frame(stream, &mut buf).await?;
    check_greeting(&buf[..n])?;
    stream
        .write_all(&GREETING_REPLY)
        .await
        .map_err(Socks5Error::HandshakeWriteFailed)?;

    let n = read_frame(stream, &mut buf).await?;
    let request = parse_request(&buf[..n], ctx.options.allow_udp)?;
    debug!("Parsed SOCKS5 request: {} to {}", request.command, request.destination);

    let destination = request.destination.resolve().await?;

    match request.command {
        SocksCommand::Connect => Ok(Negotiated::Connect(destination)),
        SocksCommand::UdpAssociate => {
            let client = ClientIdentity::new(
                expected_client_ip(&request.destination.host, destination.ip(), peer),
                destination.port(),
            );
            associate_udp(stream, client, ctx)
                .await
                .map(Negotiated::UdpAssociated)
        }
    }
}

/// Validate the greeting; only the version byte matters
pub fn check_greeting(frame: &[u8]) -> Result<(), Socks5Error> {
    match frame.first() {
        Some(&SOCKS5_VERSION) => Ok(()),
        Some(&other) => Err(Socks5Error::UnsupportedProtocolVersion(other)),
        None => Err(Socks5Error::ConnectionClosed),
    }
}

/// Parse a request frame.
///
/// The port is taken from the trailing two bytes of the frame. With
/// `allow_udp` unset, UDP ASSOCIATE is rejected like any unknown command.
pub fn parse_request(frame: &[u8], allow_udp: bool) -> Result<Request, Socks5Error> {
    let cmd_byte = *frame.get(1).ok_or_else(|| {
        Socks5Error::MalformedRequest(format!("request too short: {} bytes", frame.len()))
    })?;

    let command = SocksCommand::from_byte(cmd_byte)?;
    if command == SocksCommand::UdpAssociate && !allow_udp {
        return Err(Socks5Error::UnsupportedCommand(cmd_byte));
    }

    let address = decode_address(frame, REQUEST_ATYP_OFFSET)?;
    if frame.len() < REQUEST_ATYP_OFFSET + address.consumed + 2 {
        return Err(Socks5Error::MalformedRequest(
            "request too short for port".to_string(),
        ));
    }
    let port = decode_trailing_port(frame)?;

    Ok(Request {
        command,
        destination: DestinationAddr {
            atyp: address.atyp,
            host: address.host,
            port,
        },
    })
}

/// Bind the relay socket, reply with its address and spawn the relay task
async fn associate_udp<S>(
    stream: &mut S,
    client: ClientIdentity,
    ctx: &RelayContext,
) -> Result<UdpAssociation, Socks5Error>
where
    S: AsyncWrite + Unpin,
{
    let socket = bind_relay_socket(ctx.bind_ip(), ctx.options.udp_bind_attempts).await?;
    let local_addr = socket.local_addr()?;

    let reply = encode_bind_reply(ctx.bind_ip(), local_addr.port());
    stream
        .write_all(&reply)
        .await
        .map_err(Socks5Error::HandshakeWriteFailed)?;

    info!("UDP ASSOCIATE relaying on {} for {}", local_addr, client);

    let session = UdpRelaySession::new(socket, client, ctx.options.udp_reply_timeout());
    let task = tokio::spawn(session.run());

    Ok(UdpAssociation {
        local_addr,
        client,
        task,
    })
}

/// Pick the IP datagrams must come from.
///
/// A concrete DST.ADDR names the client's UDP source; an unspecified one
/// (the usual `0.0.0.0`) falls back to the TCP peer.
fn expected_client_ip(requested: &Host, resolved: IpAddr, peer: SocketAddr) -> IpAddr {
    match requested {
        Host::Ip(ip) if ip.is_unspecified() => peer.ip(),
        _ => resolved,
    }
}

/// Read one frame; EOF or a read error means the client went away
async fn read_frame<S>(stream: &mut S, buf: &mut [u8]) -> Result<usize, Socks5Error>
where
    S: AsyncRead + Unpin,
{
    match stream.read(buf).await {
        Ok(0) => Err(Socks5Error::ConnectionClosed),
        Ok(n) => Ok(n),
        Err(e) => {
            debug!("Handshake read failed: {}", e);
            Err(Socks5Error::ConnectionClosed)
        }
    }
}
