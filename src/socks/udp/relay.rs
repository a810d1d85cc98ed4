//! UDP relay session
//!
//! One session per UDP ASSOCIATE. It owns the bound relay socket and serves
//! datagrams from the authorised client only, one exchange at a time.

use super::packet::{encode_reply_datagram, parse_udp_header};
use crate::error::Socks5Error;
use crate::socks::consts::UDP_BUFFER_SIZE;
use rand::Rng;
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// The UDP source a session accepts datagrams from.
///
/// Port `0` is a wildcard: any source port from the expected IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIdentity {
    ip: IpAddr,
    port: u16,
}

impl ClientIdentity {
    /// Create an identity; `port == 0` accepts any source port
    pub fn new(ip: IpAddr, port: u16) -> Self {
        ClientIdentity {
            ip: canonical_ip(ip),
            port,
        }
    }

    /// Whether the port is the wildcard
    pub fn is_any_port(&self) -> bool {
        self.port == 0
    }

    /// Whether a datagram from `source` may use the relay
    pub fn admits(&self, source: SocketAddr) -> bool {
        canonical_ip(source.ip()) == self.ip && (self.is_any_port() || source.port() == self.port)
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any_port() {
            write!(f, "{}:*", self.ip)
        } else {
            write!(f, "{}", SocketAddr::new(self.ip, self.port))
        }
    }
}

/// IPv4-mapped IPv6 addresses compare equal to their IPv4 form
fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}

/// Bind the relay socket on `ip`.
///
/// The first attempt lets the OS choose a port; later attempts try random
/// unprivileged ports. Gives up after `attempts` failures.
pub async fn bind_relay_socket(ip: IpAddr, attempts: u32) -> Result<UdpSocket, Socks5Error> {
    let mut last_err = io::Error::new(io::ErrorKind::AddrNotAvailable, "no bind attempts made");

    for attempt in 0..attempts {
        let port = if attempt == 0 {
            0
        } else {
            rand::thread_rng().gen_range(1024..=u16::MAX)
        };

        match UdpSocket::bind(SocketAddr::new(ip, port)).await {
            Ok(socket) => return Ok(socket),
            Err(e) => {
                debug!("UDP bind on {}:{} failed: {}", ip, port, e);
                last_err = e;
            }
        }
    }

    Err(Socks5Error::Io(last_err))
}

/// A bound relay socket serving a single client
#[derive(Debug)]
pub struct UdpRelaySession {
    socket: UdpSocket,
    client: ClientIdentity,
    reply_timeout: Option<Duration>,
}

impl UdpRelaySession {
    /// Create a session; `reply_timeout` bounds each destination exchange.
    ///
    /// Exchanges run one at a time, so with no timeout a destination that
    /// never answers holds up every later datagram of the association.
    pub fn new(socket: UdpSocket, client: ClientIdentity, reply_timeout: Option<Duration>) -> Self {
        UdpRelaySession {
            socket,
            client,
            reply_timeout,
        }
    }

    /// Serve datagrams until the relay socket fails.
    ///
    /// Malformed, fragmented or unauthorised datagrams are dropped, as are
    /// datagrams whose destination cannot be reached. Only errors on the
    /// relay socket itself end the session.
    pub async fn run(self) -> Result<(), Socks5Error> {
        let mut buf = vec![0u8; UDP_BUFFER_SIZE];
        let mut reply_buf = vec![0u8; UDP_BUFFER_SIZE];

        loop {
            let (len, source) = self.socket.recv_from(&mut buf).await.map_err(|e| {
                warn!("UDP relay socket read failed: {}", e);
                Socks5Error::Io(e)
            })?;
            if len == 0 {
                continue;
            }
            let datagram = &buf[..len];

            let header = match parse_udp_header(datagram) {
                Ok(header) => header,
                Err(e) => {
                    warn!("Dropping UDP datagram from {}: {}", source, e);
                    continue;
                }
            };

            if !self.client.admits(source) {
                debug!(
                    "Dropping UDP datagram from {}: expected {}",
                    source, self.client
                );
                continue;
            }

            let target = match header.destination.resolve().await {
                Ok(target) => target,
                Err(e) => {
                    warn!("UDP destination {} unusable: {}", header.destination, e);
                    continue;
                }
            };

            let payload = &datagram[header.payload_offset..];
            let reply_len = match self.exchange(target, payload, &mut reply_buf).await {
                Ok(n) => n,
                Err(e) => {
                    warn!("UDP exchange with {} failed: {}", target, e);
                    continue;
                }
            };
            debug!(
                "UDP relay: {} bytes to {}, {} bytes back",
                payload.len(),
                target,
                reply_len
            );

            let reply = encode_reply_datagram(
                &datagram[..header.payload_offset],
                &reply_buf[..reply_len],
            );
            self.socket.send_to(&reply, source).await.map_err(|e| {
                warn!("UDP relay socket write to {} failed: {}", source, e);
                Socks5Error::Io(e)
            })?;
        }
    }

    /// Send `payload` to `target` from a fresh socket and wait for one reply
    async fn exchange(
        &self,
        target: SocketAddr,
        payload: &[u8],
        reply_buf: &mut [u8],
    ) -> io::Result<usize> {
        let local: SocketAddr = match target {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let outbound = UdpSocket::bind(local).await?;
        outbound.connect(target).await?;
        outbound.send(payload).await?;

        match self.reply_timeout {
            Some(limit) => tokio::time::timeout(limit, outbound.recv(reply_buf))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no UDP reply"))?,
            None => outbound.recv(reply_buf).await,
        }
    }
}
