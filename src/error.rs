//! Error types for Spleen
//!
//! This module defines all custom error types used throughout the relay.

use std::io;
use thiserror::Error;

/// Main error type for Spleen operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors raised while negotiating or relaying a single SOCKS5 session.
///
/// None of these are fatal to the listener; they end one client session
/// (or, for UDP, one datagram) only.
#[derive(Error, Debug)]
pub enum Socks5Error {
    /// First byte of the greeting was not 0x05
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedProtocolVersion(u8),

    /// Request command was neither CONNECT nor UDP ASSOCIATE
    #[error("Command not supported: {0}")]
    UnsupportedCommand(u8),

    /// ATYP was not IPv4, domain or IPv6
    #[error("Address type not supported: {0}")]
    UnsupportedAddressType(u8),

    /// Domain name could not be resolved to an IP
    #[error("Failed to resolve domain: {0}")]
    AddressResolutionFailed(String),

    /// A handshake reply could not be written to the client
    #[error("Failed to write handshake reply: {0}")]
    HandshakeWriteFailed(#[source] io::Error),

    /// The CONNECT destination could not be reached
    #[error("Failed to connect to {addr}: {source}")]
    DestinationDialFailed {
        /// Destination that was dialed
        addr: String,
        /// Underlying dial error
        #[source]
        source: io::Error,
    },

    /// Writer accepted fewer bytes than were read
    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite {
        /// Bytes read from the source
        expected: usize,
        /// Bytes the destination accepted
        written: usize,
    },

    /// Peer closed the connection; the normal way a session ends
    #[error("Connection closed")]
    ConnectionClosed,

    /// UDP datagram carried a non-zero FRAG byte
    #[error("Fragmented UDP datagram discarded (frag {0})")]
    FragmentedDatagramDiscarded(u8),

    /// Frame too short for the fields it declares
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// IO error on a socket owned by the session
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Socks5Error {
    /// Whether this error is a normal peer disconnect rather than a failure
    pub fn is_closed(&self) -> bool {
        matches!(self, Socks5Error::ConnectionClosed)
    }
}
