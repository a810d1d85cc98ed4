//! Server configuration types
//!
//! Defines the bind address and relay tunables for the SOCKS5 relay.

use super::TcpConfig;
use crate::error::RelayError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
}

/// Listener configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// IP to listen on; also advertised in UDP ASSOCIATE replies
    pub local_ip: String,

    /// TCP port to listen on
    pub local_port: u16,

    /// Relay behaviour
    #[serde(default)]
    pub relay: RelayOptions,

    /// Socket options
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl ServerConfig {
    /// Parse `local_ip` and `local_port` into a socket address
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .local_ip
            .parse()
            .with_context(|| format!("Invalid local_ip: {}", self.local_ip))?;
        Ok(SocketAddr::new(ip, self.local_port))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;
        if self.relay.udp_bind_attempts == 0 {
            return Err(
                RelayError::Config("udp_bind_attempts must be at least 1".to_string()).into(),
            );
        }
        Ok(())
    }
}

fn default_allow_udp() -> bool {
    true
}

/// Default cap on UDP bind retries
fn default_udp_bind_attempts() -> u32 {
    100
}

/// Relay tunables. Absent timeouts mean "block until the peer acts".
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RelayOptions {
    /// Accept the UDP ASSOCIATE command
    #[serde(default = "default_allow_udp")]
    pub allow_udp: bool,

    /// Maximum attempts at binding the UDP relay socket
    #[serde(default = "default_udp_bind_attempts")]
    pub udp_bind_attempts: u32,

    /// Dial deadline for CONNECT destinations, in seconds
    #[serde(default)]
    pub connect_timeout: Option<u64>,

    /// Idle deadline while relaying TCP, in seconds; traffic in either
    /// direction resets it
    #[serde(default)]
    pub idle_timeout: Option<u64>,

    /// Deadline for a UDP destination's reply datagram, in seconds.
    ///
    /// An association relays one datagram at a time. Left unset, a
    /// destination that never replies stalls the association for good and
    /// its later datagrams are never relayed.
    #[serde(default)]
    pub udp_reply_timeout: Option<u64>,
}

impl Default for RelayOptions {
    fn default() -> Self {
        RelayOptions {
            allow_udp: default_allow_udp(),
            udp_bind_attempts: default_udp_bind_attempts(),
            connect_timeout: None,
            idle_timeout: None,
            udp_reply_timeout: None,
        }
    }
}

impl RelayOptions {
    /// Dial deadline as a duration
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout.map(Duration::from_secs)
    }

    /// Idle read deadline as a duration
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout.map(Duration::from_secs)
    }

    /// UDP reply deadline as a duration
    pub fn udp_reply_timeout(&self) -> Option<Duration> {
        self.udp_reply_timeout.map(Duration::from_secs)
    }
}
