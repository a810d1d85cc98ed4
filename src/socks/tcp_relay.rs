//! TCP relay for SOCKS5 CONNECT
//!
//! Copies bytes between the client and the destination in both directions
//! until either side closes or fails.

use super::consts::BUFFER_SIZE;
use crate::error::Socks5Error;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::debug;

/// Idle deadline shared by the directions of one relay.
///
/// Every successful read pushes the deadline out, so a session only times
/// out once no direction has moved data for `limit`.
#[derive(Debug)]
pub struct IdleTimer {
    limit: Duration,
    started: Instant,
    last_active_us: AtomicU64,
}

impl IdleTimer {
    /// Start a timer whose first deadline is `limit` from now
    pub fn new(limit: Duration) -> Self {
        IdleTimer {
            limit,
            started: Instant::now(),
            last_active_us: AtomicU64::new(0),
        }
    }

    /// Record activity now
    pub fn touch(&self) {
        let elapsed = self.started.elapsed().as_micros() as u64;
        self.last_active_us.fetch_max(elapsed, Ordering::Relaxed);
    }

    /// Instant at which the relay counts as idle
    pub fn deadline(&self) -> Instant {
        let last = Duration::from_micros(self.last_active_us.load(Ordering::Relaxed));
        self.started + last + self.limit
    }
}

/// Read once, waiting no longer than the shared idle deadline
async fn read_chunk<R>(
    source: &mut R,
    buf: &mut [u8],
    idle: Option<&IdleTimer>,
) -> Result<usize, Socks5Error>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let timer = match idle {
        Some(timer) => timer,
        None => return Ok(source.read(buf).await?),
    };

    loop {
        match tokio::time::timeout_at(timer.deadline(), source.read(buf)).await {
            Ok(read) => {
                let n = read?;
                timer.touch();
                return Ok(n);
            }
            // The other direction may have moved the deadline while we waited.
            Err(_) if timer.deadline() > Instant::now() => continue,
            Err(_) => {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "relay idle timeout").into())
            }
        }
    }
}

/// Copy `source` into `destination` in 4 KiB chunks.
///
/// End of stream on `source` is success and yields the byte count. A write
/// that accepts zero bytes before the chunk is fully written is reported as
/// [`Socks5Error::ShortWrite`]. With `idle` set, the copy fails once no read
/// has completed for that long.
pub async fn relay<R, W>(
    source: &mut R,
    destination: &mut W,
    idle: Option<Duration>,
) -> Result<u64, Socks5Error>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let timer = idle.map(IdleTimer::new);
    copy_chunks(source, destination, timer.as_ref()).await
}

async fn copy_chunks<R, W>(
    source: &mut R,
    destination: &mut W,
    idle: Option<&IdleTimer>,
) -> Result<u64, Socks5Error>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = [0u8; BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let read = read_chunk(source, &mut buf, idle).await?;
        if read == 0 {
            return Ok(total);
        }

        let mut written = 0;
        while written < read {
            let n = destination.write(&buf[written..read]).await?;
            if n == 0 {
                return Err(Socks5Error::ShortWrite {
                    expected: read,
                    written,
                });
            }
            written += n;
        }
        destination.flush().await?;

        total += read as u64;
    }
}

/// Relay data bidirectionally between the client and the destination.
///
/// Both directions run concurrently. As soon as either one finishes, for any
/// reason, the other is cancelled and both streams are dropped, which closes
/// each of them exactly once. `idle` applies to the pair: traffic in either
/// direction keeps the whole session alive.
pub async fn relay_bidirectional<A, B>(
    client: A,
    remote: B,
    idle: Option<Duration>,
) -> Result<(), Socks5Error>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut remote_read, mut remote_write) = tokio::io::split(remote);
    let timer = idle.map(IdleTimer::new);

    let upstream = copy_chunks(&mut client_read, &mut remote_write, timer.as_ref());
    let downstream = copy_chunks(&mut remote_read, &mut client_write, timer.as_ref());

    let result = tokio::select! {
        result = upstream => {
            match &result {
                Ok(bytes) => debug!("client->remote finished: {} bytes", bytes),
                Err(e) => debug!("client->remote error: {}", e),
            }
            result
        }
        result = downstream => {
            match &result {
                Ok(bytes) => debug!("remote->client finished: {} bytes", bytes),
                Err(e) => debug!("remote->client error: {}", e),
            }
            result
        }
    };

    result.map(|_| ())
}
