//! UDP ASSOCIATE support for SOCKS5
//!
//! Unwraps SOCKS5 UDP headers from client datagrams, forwards the payload to
//! the real destination and relays the reply back with the header restored.

mod packet;
mod relay;

pub use packet::{encode_reply_datagram, parse_udp_header, UdpHeader};
pub use relay::{bind_relay_socket, ClientIdentity, UdpRelaySession};
