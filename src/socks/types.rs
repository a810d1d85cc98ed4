//! SOCKS5 type definitions
//!
//! Defines the core types used in SOCKS5 protocol handling.

use super::consts::*;
use crate::config::{RelayOptions, ServerConfig};
use crate::error::Socks5Error;
use crate::transport::SocketOpts;
use anyhow::Result;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// SOCKS5 command types accepted by the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksCommand {
    /// TCP CONNECT - establish a TCP connection to target
    Connect,
    /// UDP ASSOCIATE - establish UDP relay
    UdpAssociate,
}

impl SocksCommand {
    /// Parse a command byte. BIND and unknown bytes are rejected.
    pub fn from_byte(byte: u8) -> Result<Self, Socks5Error> {
        match byte {
            SOCKS5_CMD_TCP_CONNECT => Ok(SocksCommand::Connect),
            SOCKS5_CMD_UDP_ASSOCIATE => Ok(SocksCommand::UdpAssociate),
            other => Err(Socks5Error::UnsupportedCommand(other)),
        }
    }
}

impl fmt::Display for SocksCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksCommand::Connect => write!(f, "CONNECT"),
            SocksCommand::UdpAssociate => write!(f, "UDP ASSOCIATE"),
        }
    }
}

/// The ATYP tag of a SOCKS5 address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrType {
    /// 4 raw bytes
    Ipv4,
    /// 1 length byte + name
    Domain,
    /// 16 raw bytes
    Ipv6,
}

impl AddrType {
    /// Parse an ATYP byte
    pub fn from_byte(byte: u8) -> Result<Self, Socks5Error> {
        match byte {
            SOCKS5_ADDR_TYPE_IPV4 => Ok(AddrType::Ipv4),
            SOCKS5_ADDR_TYPE_DOMAIN => Ok(AddrType::Domain),
            SOCKS5_ADDR_TYPE_IPV6 => Ok(AddrType::Ipv6),
            other => Err(Socks5Error::UnsupportedAddressType(other)),
        }
    }
}

/// Host part of a SOCKS5 address, before name resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    /// Literal IPv4 or IPv6 address
    Ip(IpAddr),
    /// Domain name still to be resolved
    Domain(String),
}

impl Host {
    /// Resolve to an IP address.
    ///
    /// Literal IPs return immediately; domain names go through the system
    /// resolver and the first address wins.
    pub async fn resolve(&self) -> Result<IpAddr, Socks5Error> {
        match self {
            Host::Ip(ip) => Ok(*ip),
            Host::Domain(domain) => {
                let mut addrs = tokio::net::lookup_host((domain.as_str(), 0))
                    .await
                    .map_err(|e| {
                        Socks5Error::AddressResolutionFailed(format!("{}: {}", domain, e))
                    })?;
                addrs
                    .next()
                    .map(|addr| addr.ip())
                    .ok_or_else(|| Socks5Error::AddressResolutionFailed(domain.clone()))
            }
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Host::Ip(ip) => write!(f, "{}", ip),
            Host::Domain(domain) => write!(f, "{}", domain),
        }
    }
}

/// A parsed SOCKS5 destination: address tag, host and port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationAddr {
    /// ATYP the client used
    pub atyp: AddrType,
    /// Literal IP or domain name
    pub host: Host,
    /// Port in host byte order
    pub port: u16,
}

impl DestinationAddr {
    /// Resolve the destination to a socket address
    pub async fn resolve(&self) -> Result<SocketAddr, Socks5Error> {
        let ip = self.host.resolve().await?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl fmt::Display for DestinationAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Host::Ip(IpAddr::V6(ip)) => write!(f, "[{}]:{}", ip, self.port),
            host => write!(f, "{}:{}", host, self.port),
        }
    }
}

/// Immutable per-listener settings handed to every session.
#[derive(Debug, Clone)]
pub struct RelayContext {
    /// Address the TCP listener is bound to
    pub bind: SocketAddr,
    /// Relay tunables
    pub options: RelayOptions,
    /// Socket options for client and destination TCP streams
    pub socket_opts: SocketOpts,
}

impl RelayContext {
    /// Build the context from server configuration
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        Ok(RelayContext {
            bind: config.bind_addr()?,
            options: config.relay.clone(),
            socket_opts: SocketOpts::from_tcp_config(&config.tcp),
        })
    }

    /// IP advertised in UDP ASSOCIATE replies and used for relay sockets
    pub fn bind_ip(&self) -> IpAddr {
        self.bind.ip()
    }
}
