//! SOCKS5 protocol constants
//!
//! Defines the constants used by the relay's subset of SOCKS5.

/// SOCKS5 protocol version
pub const SOCKS5_VERSION: u8 = 0x05;

/// No authentication required; the only method ever selected
pub const SOCKS5_AUTH_METHOD_NONE: u8 = 0x00;

// Commands
/// TCP CONNECT command
pub const SOCKS5_CMD_TCP_CONNECT: u8 = 0x01;
/// UDP ASSOCIATE command
pub const SOCKS5_CMD_UDP_ASSOCIATE: u8 = 0x03;

// Address types
/// IPv4 address
pub const SOCKS5_ADDR_TYPE_IPV4: u8 = 0x01;
/// Domain name
pub const SOCKS5_ADDR_TYPE_DOMAIN: u8 = 0x03;
/// IPv6 address
pub const SOCKS5_ADDR_TYPE_IPV6: u8 = 0x04;

/// Succeeded
pub const SOCKS5_REPLY_SUCCEEDED: u8 = 0x00;

/// Reserved byte value (always 0x00)
pub const SOCKS5_RESERVED: u8 = 0x00;

// Buffer sizes
/// Chunk size for handshake reads and TCP relaying
pub const BUFFER_SIZE: usize = 4 * 1024;
/// Receive buffer for one UDP datagram
pub const UDP_BUFFER_SIZE: usize = 65536;

/// Offset of the FRAG byte in a SOCKS5 UDP header
pub const UDP_FRAG_OFFSET: usize = 2;
/// Offset of the ATYP byte in a SOCKS5 UDP header
pub const UDP_ATYP_OFFSET: usize = 3;
/// Offset of the ATYP byte in a SOCKS5 request
pub const REQUEST_ATYP_OFFSET: usize = 3;
