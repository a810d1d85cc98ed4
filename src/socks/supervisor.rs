//! Per-client session supervision
//!
//! Owns one accepted client connection from handshake to teardown: runs the
//! handshake, then either relays a CONNECT or holds a UDP association open.

use super::codec::CONNECT_SUCCESS_REPLY;
use super::handshake::{negotiate, Negotiated, UdpAssociation};
use super::tcp_relay::relay_bidirectional;
use super::types::RelayContext;
use crate::error::Socks5Error;
use crate::transport::connect_tcp;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Serve one client and report how the session ended.
///
/// Never fails: errors are logged here, at the session boundary.
pub async fn supervise<S>(stream: S, peer: SocketAddr, ctx: Arc<RelayContext>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    match run_session(stream, peer, &ctx).await {
        Ok(()) => debug!("Session from {} finished", peer),
        Err(e) if e.is_closed() => debug!("Connection from {} closed", peer),
        Err(e) => warn!("Session from {} failed: {}", peer, e),
    }
}

/// Run the handshake and whatever the client asked for
pub async fn run_session<S>(
    mut stream: S,
    peer: SocketAddr,
    ctx: &RelayContext,
) -> Result<(), Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    match negotiate(&mut stream, peer, ctx).await? {
        Negotiated::Connect(destination) => {
            let remote = connect_tcp(
                destination,
                ctx.options.connect_timeout(),
                &ctx.socket_opts,
            )
            .await
            .map_err(|source| Socks5Error::DestinationDialFailed {
                addr: destination.to_string(),
                source,
            })?;

            stream
                .write_all(&CONNECT_SUCCESS_REPLY)
                .await
                .map_err(Socks5Error::HandshakeWriteFailed)?;

            info!("SOCKS5 tunnel established {} -> {}", peer, destination);
            relay_bidirectional(stream, remote, ctx.options.idle_timeout()).await
        }
        Negotiated::UdpAssociated(association) => hold_association(stream, association).await,
    }
}

/// Keep the association alive for as long as its control connection is open.
///
/// Closing the TCP connection tears the relay task down; a relay task that
/// ends on its own closes the control connection in turn.
async fn hold_association<S>(mut control: S, association: UdpAssociation) -> Result<(), Socks5Error>
where
    S: AsyncRead + Unpin,
{
    let UdpAssociation {
        local_addr,
        mut task,
        ..
    } = association;

    let result = tokio::select! {
        _ = watch_control(&mut control) => {
            task.abort();
            debug!("Control connection closed, UDP relay on {} stopped", local_addr);
            Ok(())
        }
        joined = &mut task => match joined {
            Ok(result) => result,
            Err(e) => {
                warn!("UDP relay task on {} ended abnormally: {}", local_addr, e);
                Ok(())
            }
        },
    };

    info!("UDP ASSOCIATE session on {} ended", local_addr);
    result
}

/// Wait for the control connection to close
async fn watch_control<S>(stream: &mut S)
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; 64];

    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => debug!("Ignoring {} bytes on UDP control connection", n),
            Err(e) => {
                debug!("Control connection error: {}", e);
                break;
            }
        }
    }
}
