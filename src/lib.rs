//! # Spleen - Transparent SOCKS5 Relay
//!
//! Spleen accepts SOCKS5 clients, negotiates the handshake, and relays raw
//! bytes to the requested destination until either side closes.
//!
//! ## Features
//!
//! - **No-Auth Greeting**: always selects "no authentication required"
//! - **TCP CONNECT**: bidirectional stream relay in 4 KiB chunks
//! - **UDP ASSOCIATE**: per-client UDP relay socket with source authorisation
//! - **One Task Per Flow**: each client, and each UDP association, runs on its
//!   own tokio task and owns its sockets exclusively
//!
//! ## Usage
//!
//! ```rust,ignore
//! use spleen::config::load_config;
//! use spleen::server::run_server;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config(".server.toml")?;
//!     let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_server(config, shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! accept loop -> supervise -> negotiate -> { relay_bidirectional | UdpRelaySession }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod server;
pub mod socks;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{RelayError, Socks5Error};
pub use server::{run_server, Server};

/// Version of the Spleen library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
