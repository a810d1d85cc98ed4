//! SOCKS5 relay core
//!
//! Implements the relay's subset of SOCKS5: no-authentication greeting,
//! CONNECT and UDP ASSOCIATE. Every accepted client connection is handed
//! to [`supervise`], which owns it until the session ends.

pub mod codec;
mod consts;
pub mod handshake;
mod supervisor;
mod tcp_relay;
mod types;
pub mod udp;

pub use codec::{decode_address, encode_bind_reply, CONNECT_SUCCESS_REPLY, GREETING_REPLY};
pub use consts::*;
pub use handshake::{negotiate, Negotiated, UdpAssociation};
pub use supervisor::{run_session, supervise};
pub use tcp_relay::{relay, relay_bidirectional};
pub use types::{AddrType, DestinationAddr, Host, RelayContext, SocksCommand};
pub use udp::{ClientIdentity, UdpRelaySession};
