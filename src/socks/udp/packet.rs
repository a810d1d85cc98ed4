//! SOCKS5 UDP header decoding
//!
//! ```text
//! +----+------+------+----------+----------+----------+
//! |RSV | FRAG | ATYP | DST.ADDR | DST.PORT |   DATA   |
//! +----+------+------+----------+----------+----------+
//! | 2  |  1   |  1   | Variable |    2     | Variable |
//! +----+------+------+----------+----------+----------+
//! ```

use crate::error::Socks5Error;
use crate::socks::codec::{decode_address, decode_port};
use crate::socks::consts::*;
use crate::socks::types::DestinationAddr;
use bytes::{BufMut, Bytes, BytesMut};

/// Decoded header of a client datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpHeader {
    /// Where the payload should go
    pub destination: DestinationAddr,
    /// Offset of DATA; everything before it is the header
    pub payload_offset: usize,
}

/// Parse the SOCKS5 UDP header at the start of `datagram`.
///
/// Fragmented datagrams (FRAG != 0) are rejected.
pub fn parse_udp_header(datagram: &[u8]) -> Result<UdpHeader, Socks5Error> {
    if datagram.len() <= UDP_ATYP_OFFSET {
        return Err(Socks5Error::MalformedRequest(format!(
            "UDP datagram too short: {} bytes",
            datagram.len()
        )));
    }

    let frag = datagram[UDP_FRAG_OFFSET];
    if frag != 0 {
        return Err(Socks5Error::FragmentedDatagramDiscarded(frag));
    }

    let address = decode_address(datagram, UDP_ATYP_OFFSET)?;
    let port_offset = UDP_ATYP_OFFSET + address.consumed;
    let port = decode_port(datagram, port_offset)?;

    Ok(UdpHeader {
        destination: DestinationAddr {
            atyp: address.atyp,
            host: address.host,
            port,
        },
        payload_offset: port_offset + 2,
    })
}

/// Prepend the client's original header to a destination's reply
pub fn encode_reply_datagram(header: &[u8], payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(header.len() + payload.len());
    buf.put_slice(header);
    buf.put_slice(payload);
    buf.freeze()
}
