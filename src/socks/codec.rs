//! SOCKS5 address encoding and decoding
//!
//! Handles the ATYP/DST.ADDR fields shared by requests and UDP headers,
//! and builds the fixed-size replies the relay sends.
//!
//! Replies always use ATYP IPv4, whatever address family the client asked
//! for. Existing clients of the relay depend on this 10-byte reply, so a
//! bind IP that is not IPv4 is reported as `0.0.0.0`.

use super::consts::*;
use super::types::{AddrType, Host};
use crate::error::Socks5Error;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Reply to the greeting: version 5, no authentication required
pub const GREETING_REPLY: [u8; 2] = [SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE];

/// CONNECT success reply; the bound address is always reported as 0.0.0.0:0
pub const CONNECT_SUCCESS_REPLY: [u8; 10] = [
    SOCKS5_VERSION,
    SOCKS5_REPLY_SUCCEEDED,
    SOCKS5_RESERVED,
    SOCKS5_ADDR_TYPE_IPV4,
    0,
    0,
    0,
    0,
    0,
    0,
];

/// An address decoded from a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAddress {
    /// ATYP tag
    pub atyp: AddrType,
    /// Literal IP or unresolved domain name
    pub host: Host,
    /// Bytes consumed, including the ATYP byte
    pub consumed: usize,
}

/// Decode an address starting at the ATYP byte at `offset`.
///
/// ```text
/// +------+----------+
/// | ATYP | DST.ADDR |
/// +------+----------+
/// |  1   | Variable |
/// +------+----------+
/// ```
pub fn decode_address(buf: &[u8], offset: usize) -> Result<DecodedAddress, Socks5Error> {
    let atyp_byte = *buf
        .get(offset)
        .ok_or_else(|| Socks5Error::MalformedRequest("missing address type".to_string()))?;
    let atyp = AddrType::from_byte(atyp_byte)?;
    let body = &buf[offset + 1..];

    let (host, len) = match atyp {
        AddrType::Ipv4 => {
            let octets: [u8; 4] = body
                .get(..4)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| short("IPv4 address"))?;
            (Host::Ip(IpAddr::V4(Ipv4Addr::from(octets))), 4)
        }
        AddrType::Domain => {
            let name_len = *body.first().ok_or_else(|| short("domain length"))? as usize;
            if name_len == 0 {
                return Err(Socks5Error::MalformedRequest(
                    "empty domain name".to_string(),
                ));
            }
            let name = body.get(1..1 + name_len).ok_or_else(|| short("domain name"))?;
            let domain = String::from_utf8(name.to_vec()).map_err(|_| {
                Socks5Error::MalformedRequest("invalid UTF-8 in domain name".to_string())
            })?;
            (Host::Domain(domain), 1 + name_len)
        }
        AddrType::Ipv6 => {
            let octets: [u8; 16] = body
                .get(..16)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| short("IPv6 address"))?;
            (Host::Ip(IpAddr::V6(Ipv6Addr::from(octets))), 16)
        }
    };

    Ok(DecodedAddress {
        atyp,
        host,
        consumed: 1 + len,
    })
}

/// Decode a big-endian port at `offset`
pub fn decode_port(buf: &[u8], offset: usize) -> Result<u16, Socks5Error> {
    buf.get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| short("port"))
}

/// Decode the port held in the trailing two bytes of a frame
pub fn decode_trailing_port(frame: &[u8]) -> Result<u16, Socks5Error> {
    let offset = frame.len().checked_sub(2).ok_or_else(|| short("port"))?;
    decode_port(frame, offset)
}

/// Build the 10-byte success reply carrying a bound address.
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' | X'01'|    4     |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
pub fn encode_bind_reply(ip: IpAddr, port: u16) -> [u8; 10] {
    let ipv4 = match ip {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(v6) => v6.to_ipv4_mapped().unwrap_or(Ipv4Addr::UNSPECIFIED),
    };

    let mut reply = CONNECT_SUCCESS_REPLY;
    reply[4..8].copy_from_slice(&ipv4.octets());
    reply[8..10].copy_from_slice(&port.to_be_bytes());
    reply
}

fn short(field: &str) -> Socks5Error {
    Socks5Error::MalformedRequest(format!("buffer too short for {}", field))
}
