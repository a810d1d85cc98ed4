//! TCP listener and accept loop
//!
//! Binds the configured address and spawns one supervised session per
//! accepted client.

use crate::config::Config;
use crate::error::RelayError;
use crate::socks::{supervise, RelayContext};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// A bound SOCKS5 relay listener
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    ctx: Arc<RelayContext>,
}

impl Server {
    /// Bind the listener. Failing here is the only fatal error of the relay.
    pub async fn bind(config: &Config) -> Result<Self> {
        let ctx = RelayContext::from_config(&config.server)?;

        let listener = TcpListener::bind(ctx.bind)
            .await
            .map_err(RelayError::Io)
            .with_context(|| format!("Failed to listen on {}", ctx.bind))?;

        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            ctx: Arc::new(ctx),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients until a shutdown signal arrives
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("Accepted connection from {}", peer);
                            if let Err(e) = self.ctx.socket_opts.apply(&stream) {
                                warn!("Failed to apply socket options for {}: {}", peer, e);
                            }
                            tokio::spawn(supervise(stream, peer, self.ctx.clone()));
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping listener");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Bind the configured address and serve until shutdown
pub async fn run_server(config: Config, shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    Server::bind(&config).await?.run(shutdown_rx).await
}
