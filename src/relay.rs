//! Bidirectional relay loop (§4.7) between an authenticated client and its
//! connected target, with half-close propagation, an idle timeout, and
//! shared byte counters for the stats reporter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{self, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// A client is disconnected if no bytes cross the relay in either direction
/// for this long.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

const BUF_SIZE: usize = 16 * 1024;

/// Global traffic counters (§3, Counters), read and zeroed by the stats
/// reporter (§4.9) and added to by every relay task.
#[derive(Default)]
pub struct Counters {
    pub bytes_in: AtomicU64,
    pub bytes_out: AtomicU64,
}

impl Counters {
    /// Atomically swaps both counters to zero and returns their prior
    /// values, for the periodic stats report.
    pub fn take(&self) -> (u64, u64) {
        (
            self.bytes_in.swap(0, Ordering::Relaxed),
            self.bytes_out.swap(0, Ordering::Relaxed),
        )
    }
}

/// Relays bytes between `client` and `target` in both directions until
/// both sides have reached EOF or gone idle past [`IDLE_TIMEOUT`]. Both
/// directions run concurrently to completion; a side reaching EOF (or
/// timing out) has its peer's write half shut down so the other direction
/// can keep draining to its own EOF rather than being cut short.
pub async fn relay(client: TcpStream, target: TcpStream, counters: &Counters) -> io::Result<()> {
    let (mut client_rd, mut client_wr) = client.into_split();
    let (mut target_rd, mut target_wr) = target.into_split();

    let client_to_target = pump(&mut client_rd, &mut target_wr, &counters.bytes_out);
    let target_to_client = pump(&mut target_rd, &mut client_wr, &counters.bytes_in);

    let (a, b) = tokio::join!(client_to_target, target_to_client);
    a?;
    b?;
    Ok(())
}

/// Copies from `rd` to `wr` until EOF, a read error, or [`IDLE_TIMEOUT`] of
/// inactivity — whichever comes first. The idle timeout resets on every
/// successful read, so a long but active transfer never trips it.
async fn pump(
    rd: &mut (impl tokio::io::AsyncRead + Unpin),
    wr: &mut (impl tokio::io::AsyncWrite + Unpin),
    counter: &AtomicU64,
) -> io::Result<()> {
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let n = match tokio::time::timeout(IDLE_TIMEOUT, rd.read(&mut buf)).await {
            Ok(result) => result?,
            Err(_) => {
                debug!("relay idle timeout elapsed");
                let _ = wr.shutdown().await;
                return Ok(());
            }
        };
        if n == 0 {
            let _ = wr.shutdown().await;
            return Ok(());
        }
        wr.write_all(&buf[..n]).await?;
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}
